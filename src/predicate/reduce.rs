//! Constant folding for engine expressions
//!
//! [`reduce`] simplifies an [`Expr`] without changing which series it
//! matches:
//!
//! - comparisons between two literals fold to a boolean
//! - `AND`/`OR` with a boolean literal operand collapse
//! - identical operands collapse (`a AND a` → `a`)
//! - complementary tag comparisons fold (`t = 'x' OR t != 'x'` → `true`,
//!   `t = 'x' AND t != 'x'` → `false`)
//! - parentheses around literals and references are dropped
//!
//! With a [`Valuer`], references it can resolve are replaced by literals
//! first, which turns reduction into evaluation.

use super::expr::{is_false_literal, is_true_literal, BinaryOp, Expr, VarKind};
use crate::types::Tags;
use std::cmp::Ordering;
use std::collections::HashMap;

/// Supplies values for variable references during reduction
pub trait Valuer {
    /// Literal for a reference, or `None` to leave it unresolved
    fn value(&self, name: &str, kind: VarKind) -> Option<Expr>;
}

/// Tags resolve tag references; a missing tag reads as the empty string
impl Valuer for Tags {
    fn value(&self, name: &str, kind: VarKind) -> Option<Expr> {
        match kind {
            VarKind::Tag => Some(Expr::String(self.get(name).unwrap_or_default().to_string())),
            VarKind::Field => None,
        }
    }
}

impl Valuer for HashMap<String, String> {
    fn value(&self, name: &str, kind: VarKind) -> Option<Expr> {
        match kind {
            VarKind::Tag => Some(Expr::String(self.get(name).cloned().unwrap_or_default())),
            VarKind::Field => None,
        }
    }
}

/// Resolves field-value references to a single point's value
#[derive(Debug, Clone, Copy)]
pub struct PointValuer(pub f64);

impl Valuer for PointValuer {
    fn value(&self, _name: &str, kind: VarKind) -> Option<Expr> {
        match kind {
            VarKind::Field => Some(Expr::Number(self.0)),
            VarKind::Tag => None,
        }
    }
}

/// Simplify an expression, optionally resolving references through `valuer`
pub fn reduce(expr: Expr, valuer: Option<&dyn Valuer>) -> Expr {
    match expr {
        Expr::Binary { op, lhs, rhs } => {
            let lhs = reduce(*lhs, valuer);
            let rhs = reduce(*rhs, valuer);
            match op {
                BinaryOp::And => reduce_and(lhs, rhs),
                BinaryOp::Or => reduce_or(lhs, rhs),
                _ => reduce_comparison(op, lhs, rhs),
            }
        }
        Expr::Paren(inner) => match reduce(*inner, valuer) {
            e @ (Expr::VarRef { .. } | Expr::Paren(_)) => e,
            e if e.is_literal() => e,
            e => Expr::Paren(Box::new(e)),
        },
        Expr::VarRef { name, kind } => match valuer.and_then(|v| v.value(&name, kind)) {
            Some(lit) => lit,
            None => Expr::VarRef { name, kind },
        },
        lit => lit,
    }
}

fn reduce_and(lhs: Expr, rhs: Expr) -> Expr {
    if is_false_literal(&lhs) || is_false_literal(&rhs) {
        return Expr::Boolean(false);
    }
    if is_true_literal(&lhs) {
        return rhs;
    }
    if is_true_literal(&rhs) {
        return lhs;
    }
    if lhs.unparen() == rhs.unparen() {
        return lhs;
    }
    if are_complementary(&lhs, &rhs) {
        return Expr::Boolean(false);
    }
    Expr::binary(BinaryOp::And, lhs, rhs)
}

fn reduce_or(lhs: Expr, rhs: Expr) -> Expr {
    if is_true_literal(&lhs) || is_true_literal(&rhs) {
        return Expr::Boolean(true);
    }
    if is_false_literal(&lhs) {
        return rhs;
    }
    if is_false_literal(&rhs) {
        return lhs;
    }
    if lhs.unparen() == rhs.unparen() {
        return lhs;
    }
    if are_complementary(&lhs, &rhs) {
        return Expr::Boolean(true);
    }
    Expr::binary(BinaryOp::Or, lhs, rhs)
}

fn reduce_comparison(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
    if !(lhs.is_literal() && rhs.is_literal()) {
        return Expr::binary(op, lhs, rhs);
    }
    // Mismatched literal types never compare equal
    let result = compare_literals(op, &lhs, &rhs)
        .unwrap_or(matches!(op, BinaryOp::Neq | BinaryOp::NeqRegex));
    Expr::Boolean(result)
}

fn compare_literals(op: BinaryOp, lhs: &Expr, rhs: &Expr) -> Option<bool> {
    match (lhs, rhs) {
        (Expr::String(s), Expr::Regex(re)) | (Expr::Regex(re), Expr::String(s)) => match op {
            BinaryOp::EqRegex => Some(re.0.is_match(s)),
            BinaryOp::NeqRegex => Some(!re.0.is_match(s)),
            _ => None,
        },
        (Expr::String(a), Expr::String(b)) => ordering_matches(op, Some(a.cmp(b))),
        (Expr::Boolean(a), Expr::Boolean(b)) => match op {
            BinaryOp::Eq => Some(a == b),
            BinaryOp::Neq => Some(a != b),
            _ => None,
        },
        (Expr::Integer(a), Expr::Integer(b)) => ordering_matches(op, Some(a.cmp(b))),
        (Expr::Unsigned(a), Expr::Unsigned(b)) => ordering_matches(op, Some(a.cmp(b))),
        _ => {
            let a = as_number(lhs)?;
            let b = as_number(rhs)?;
            ordering_matches(op, a.partial_cmp(&b))
        }
    }
}

fn as_number(expr: &Expr) -> Option<f64> {
    match expr {
        Expr::Integer(v) => Some(*v as f64),
        Expr::Unsigned(v) => Some(*v as f64),
        Expr::Number(v) => Some(*v),
        _ => None,
    }
}

fn ordering_matches(op: BinaryOp, ordering: Option<Ordering>) -> Option<bool> {
    // NaN compares unequal to everything
    let Some(ord) = ordering else {
        return match op {
            BinaryOp::Neq => Some(true),
            BinaryOp::Eq | BinaryOp::Lt | BinaryOp::Lte | BinaryOp::Gt | BinaryOp::Gte => {
                Some(false)
            }
            _ => None,
        };
    };
    match op {
        BinaryOp::Eq => Some(ord == Ordering::Equal),
        BinaryOp::Neq => Some(ord != Ordering::Equal),
        BinaryOp::Lt => Some(ord == Ordering::Less),
        BinaryOp::Lte => Some(ord != Ordering::Greater),
        BinaryOp::Gt => Some(ord == Ordering::Greater),
        BinaryOp::Gte => Some(ord != Ordering::Less),
        _ => None,
    }
}

/// `(tag key, operator, literal)` of a tag comparison, literal on the right
fn tag_comparison(expr: &Expr) -> Option<(&str, BinaryOp, &Expr)> {
    let Expr::Binary { op, lhs, rhs } = expr.unparen() else {
        return None;
    };
    if op.is_logical() {
        return None;
    }
    match (lhs.unparen(), rhs.unparen()) {
        (
            Expr::VarRef {
                name,
                kind: VarKind::Tag,
            },
            lit,
        ) if lit.is_literal() => Some((name.as_str(), *op, lit)),
        (
            lit,
            Expr::VarRef {
                name,
                kind: VarKind::Tag,
            },
        ) if lit.is_literal() => op.swapped().map(|op| (name.as_str(), op, lit)),
        _ => None,
    }
}

/// Whether exactly one of two tag comparisons holds for every series
///
/// Tag values are strings, so ordering comparisons against any other
/// literal are false both ways and only complement each other for string
/// literals.
fn are_complementary(a: &Expr, b: &Expr) -> bool {
    match (tag_comparison(a), tag_comparison(b)) {
        (Some((key_a, op_a, lit_a)), Some((key_b, op_b, lit_b))) => {
            key_a == key_b
                && lit_a == lit_b
                && op_a.negated() == Some(op_b)
                && (!is_ordering(op_a) || matches!(lit_a, Expr::String(_)))
        }
        _ => false,
    }
}

fn is_ordering(op: BinaryOp) -> bool {
    matches!(op, BinaryOp::Lt | BinaryOp::Lte | BinaryOp::Gt | BinaryOp::Gte)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predicate::expr::RegexLiteral;
    use regex::Regex;

    fn eq(key: &str, v: &str) -> Expr {
        Expr::binary(BinaryOp::Eq, Expr::tag(key), Expr::String(v.into()))
    }

    fn ne(key: &str, v: &str) -> Expr {
        Expr::binary(BinaryOp::Neq, Expr::tag(key), Expr::String(v.into()))
    }

    #[test]
    fn test_complementary_or_reduces_to_true() {
        let expr = Expr::binary(BinaryOp::Or, eq("host", "x"), ne("host", "x"));
        assert_eq!(reduce(expr, None), Expr::Boolean(true));
    }

    #[test]
    fn test_complementary_and_reduces_to_false() {
        let expr = Expr::binary(
            BinaryOp::And,
            Expr::Paren(Box::new(eq("host", "x"))),
            ne("host", "x"),
        );
        assert_eq!(reduce(expr, None), Expr::Boolean(false));
    }

    #[test]
    fn test_non_complementary_is_kept() {
        let expr = Expr::binary(BinaryOp::Or, eq("host", "x"), ne("host", "y"));
        assert_eq!(reduce(expr.clone(), None), expr);

        let expr = Expr::binary(BinaryOp::Or, eq("host", "x"), ne("dc", "x"));
        assert_eq!(reduce(expr.clone(), None), expr);
    }

    #[test]
    fn test_swapped_operands_are_recognized() {
        let flipped = Expr::binary(BinaryOp::Lte, Expr::String("m".into()), Expr::tag("host"));
        let lt = Expr::binary(BinaryOp::Lt, Expr::tag("host"), Expr::String("m".into()));
        // 'm' <= host  is  host >= 'm', the negation of host < 'm'
        let expr = Expr::binary(BinaryOp::Or, lt, flipped);
        assert_eq!(reduce(expr, None), Expr::Boolean(true));
    }

    #[test]
    fn test_ordering_against_non_string_is_not_complementary() {
        let lt = Expr::binary(BinaryOp::Lt, Expr::tag("host"), Expr::Integer(5));
        let gte = Expr::binary(BinaryOp::Gte, Expr::tag("host"), Expr::Integer(5));
        let expr = Expr::binary(BinaryOp::Or, lt, gte);
        assert_eq!(reduce(expr.clone(), None), expr);

        // Neither side holds for a string tag value
        let tags = Tags::from_pairs([("host", "a")]);
        assert_eq!(reduce(expr, Some(&tags)), Expr::Boolean(false));

        let gt = Expr::binary(BinaryOp::Gt, Expr::tag("host"), Expr::Number(1.5));
        let lte = Expr::binary(BinaryOp::Lte, Expr::Number(1.5), Expr::tag("host"));
        let expr = Expr::binary(BinaryOp::Or, gt, lte);
        assert!(matches!(reduce(expr, None), Expr::Binary { op: BinaryOp::Or, .. }));
    }

    #[test]
    fn test_equality_against_non_string_stays_complementary() {
        let eq_int = Expr::binary(BinaryOp::Eq, Expr::tag("host"), Expr::Integer(5));
        let ne_int = Expr::binary(BinaryOp::Neq, Expr::tag("host"), Expr::Integer(5));
        let expr = Expr::binary(BinaryOp::Or, eq_int, ne_int);
        assert_eq!(reduce(expr.clone(), None), Expr::Boolean(true));

        let tags = Tags::from_pairs([("host", "5")]);
        assert_eq!(reduce(expr, Some(&tags)), Expr::Boolean(true));
    }

    #[test]
    fn test_boolean_identities() {
        let x = eq("host", "a");
        let and_true = Expr::binary(BinaryOp::And, x.clone(), Expr::Boolean(true));
        assert_eq!(reduce(and_true, None), x);

        let or_false = Expr::binary(BinaryOp::Or, Expr::Boolean(false), x.clone());
        assert_eq!(reduce(or_false, None), x);

        let or_true = Expr::binary(BinaryOp::Or, x.clone(), Expr::Boolean(true));
        assert_eq!(reduce(or_true, None), Expr::Boolean(true));

        let dup = Expr::binary(BinaryOp::And, x.clone(), Expr::Paren(Box::new(x.clone())));
        assert_eq!(reduce(dup, None), x);
    }

    #[test]
    fn test_literal_comparisons_fold() {
        let cases = [
            (Expr::binary(BinaryOp::Eq, Expr::String("a".into()), Expr::String("a".into())), true),
            (Expr::binary(BinaryOp::Lt, Expr::Integer(1), Expr::Number(1.5)), true),
            (Expr::binary(BinaryOp::Gte, Expr::Unsigned(3), Expr::Unsigned(4)), false),
            (Expr::binary(BinaryOp::Neq, Expr::Boolean(true), Expr::Boolean(false)), true),
            (Expr::binary(BinaryOp::Eq, Expr::String("1".into()), Expr::Integer(1)), false),
            (Expr::binary(BinaryOp::Neq, Expr::String("1".into()), Expr::Integer(1)), true),
            (Expr::binary(BinaryOp::Eq, Expr::Number(f64::NAN), Expr::Number(f64::NAN)), false),
        ];
        for (expr, want) in cases {
            assert_eq!(reduce(expr.clone(), None), Expr::Boolean(want), "{}", expr);
        }
    }

    #[test]
    fn test_reduce_with_tag_valuer() {
        let re = Expr::Regex(RegexLiteral(Regex::new("^us-").unwrap()));
        let expr = Expr::binary(
            BinaryOp::And,
            eq("host", "a"),
            Expr::binary(BinaryOp::EqRegex, Expr::tag("dc"), re),
        );
        let tags = Tags::from_pairs([("host", "a"), ("dc", "us-east")]);
        assert_eq!(reduce(expr.clone(), Some(&tags)), Expr::Boolean(true));

        let tags = Tags::from_pairs([("host", "a"), ("dc", "eu-west")]);
        assert_eq!(reduce(expr.clone(), Some(&tags)), Expr::Boolean(false));

        // Missing tag reads as ''
        let tags = Tags::from_pairs([("dc", "us-east")]);
        assert_eq!(reduce(eq("host", ""), Some(&tags)), Expr::Boolean(true));
    }

    #[test]
    fn test_tag_valuer_leaves_field_refs() {
        let field = Expr::binary(
            BinaryOp::Gt,
            Expr::VarRef {
                name: "$".into(),
                kind: VarKind::Field,
            },
            Expr::Number(10.0),
        );
        let expr = Expr::binary(BinaryOp::And, eq("host", "a"), field.clone());
        let tags = Tags::from_pairs([("host", "a")]);
        assert_eq!(reduce(expr, Some(&tags)), field);

        assert_eq!(reduce(field.clone(), Some(&PointValuer(11.0))), Expr::Boolean(true));
        assert_eq!(reduce(field, Some(&PointValuer(9.0))), Expr::Boolean(false));
    }
}
