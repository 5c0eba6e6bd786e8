//! Translation from the request AST to engine expressions

use super::expr::{is_true_literal, BinaryOp, Expr, RegexLiteral, VarKind};
use super::node::{ComparisonOp, Literal, LogicalOp, Node, Predicate};
use super::reduce::reduce;
use crate::error::TranslateError;
use crate::types::{FIELD_KEY, FIELD_TAG_KEY, MEASUREMENT_KEY, MEASUREMENT_TAG_KEY};
use regex::Regex;
use std::collections::HashMap;

/// Reserved reference name for a point's field value
pub const FIELD_VALUE_KEY: &str = "$";

/// Maps caller-facing tag keys onto the engine's series keys
pub fn measurement_remap() -> HashMap<String, String> {
    HashMap::from([
        (MEASUREMENT_KEY.to_string(), MEASUREMENT_TAG_KEY.to_string()),
        (FIELD_KEY.to_string(), FIELD_TAG_KEY.to_string()),
    ])
}

/// Convert an AST into an engine expression
///
/// Tag references are renamed through `remap` when given. Field references
/// become the reserved [`FIELD_VALUE_KEY`] reference.
pub fn node_to_expr(
    node: &Node,
    remap: Option<&HashMap<String, String>>,
) -> Result<Expr, TranslateError> {
    match node {
        Node::Logical { op, children } => {
            if children.len() < 2 {
                return Err(TranslateError::InvalidLogical(children.len()));
            }
            let op = match op {
                LogicalOp::And => BinaryOp::And,
                LogicalOp::Or => BinaryOp::Or,
            };
            let mut iter = children.iter();
            // len checked above
            let mut expr = match iter.next() {
                Some(first) => node_to_expr(first, remap)?,
                None => return Err(TranslateError::InvalidLogical(0)),
            };
            for child in iter {
                expr = Expr::binary(op, expr, node_to_expr(child, remap)?);
            }
            Ok(expr)
        }
        Node::Comparison { op, lhs, rhs } => {
            let lhs = node_to_expr(lhs, remap)?;
            let rhs = node_to_expr(rhs, remap)?;
            comparison_to_expr(*op, lhs, rhs)
        }
        Node::Paren(inner) => Ok(Expr::Paren(Box::new(node_to_expr(inner, remap)?))),
        Node::TagRef(key) => {
            let name = remap
                .and_then(|m| m.get(key))
                .cloned()
                .unwrap_or_else(|| key.clone());
            Ok(Expr::VarRef {
                name,
                kind: VarKind::Tag,
            })
        }
        Node::FieldRef(_) => Ok(Expr::VarRef {
            name: FIELD_VALUE_KEY.to_string(),
            kind: VarKind::Field,
        }),
        Node::Literal(lit) => literal_to_expr(lit),
    }
}

fn comparison_to_expr(op: ComparisonOp, lhs: Expr, rhs: Expr) -> Result<Expr, TranslateError> {
    let op = match op {
        ComparisonOp::Equal => BinaryOp::Eq,
        ComparisonOp::NotEqual => BinaryOp::Neq,
        ComparisonOp::Regex => BinaryOp::EqRegex,
        ComparisonOp::NotRegex => BinaryOp::NeqRegex,
        ComparisonOp::Lt => BinaryOp::Lt,
        ComparisonOp::Lte => BinaryOp::Lte,
        ComparisonOp::Gt => BinaryOp::Gt,
        ComparisonOp::Gte => BinaryOp::Gte,
        ComparisonOp::StartsWith => {
            let Expr::String(prefix) = rhs else {
                return Err(TranslateError::InvalidComparison(format!(
                    "starts-with requires a string operand, got {}",
                    rhs
                )));
            };
            let pattern = format!("^{}", regex::escape(&prefix));
            let re = compile(&pattern)?;
            return Ok(Expr::binary(BinaryOp::EqRegex, lhs, Expr::Regex(re)));
        }
    };

    if matches!(op, BinaryOp::EqRegex | BinaryOp::NeqRegex) && !matches!(rhs, Expr::Regex(_)) {
        return Err(TranslateError::InvalidComparison(format!(
            "regex comparison requires a regex operand, got {}",
            rhs
        )));
    }

    Ok(Expr::binary(op, lhs, rhs))
}

fn literal_to_expr(lit: &Literal) -> Result<Expr, TranslateError> {
    Ok(match lit {
        Literal::String(s) => Expr::String(s.clone()),
        Literal::Integer(v) => Expr::Integer(*v),
        Literal::Unsigned(v) => Expr::Unsigned(*v),
        Literal::Float(v) => Expr::Number(*v),
        Literal::Boolean(v) => Expr::Boolean(*v),
        Literal::Regex(pattern) => Expr::Regex(compile(pattern)?),
    })
}

fn compile(pattern: &str) -> Result<RegexLiteral, TranslateError> {
    Regex::new(pattern)
        .map(RegexLiteral)
        .map_err(|source| TranslateError::InvalidRegex {
            pattern: pattern.to_string(),
            source,
        })
}

/// Whether the expression references the field-value key anywhere
pub fn has_field_value_key(expr: &Expr) -> bool {
    expr.references(FIELD_VALUE_KEY)
}

/// Replace every comparison involving the field value with `true`
///
/// The result selects a superset of the series the original selects, which
/// is what series-level filtering needs when values are checked later.
pub fn rewrite_remove_field_value(expr: Expr) -> Expr {
    match expr {
        Expr::Binary { op, lhs, rhs } if op.is_logical() => Expr::binary(
            op,
            rewrite_remove_field_value(*lhs),
            rewrite_remove_field_value(*rhs),
        ),
        Expr::Binary { lhs, rhs, .. }
            if has_field_value_key(&lhs) || has_field_value_key(&rhs) =>
        {
            Expr::Boolean(true)
        }
        Expr::Paren(inner) => Expr::Paren(Box::new(rewrite_remove_field_value(*inner))),
        other => other,
    }
}

/// Translate a tag-only predicate into an engine condition
///
/// - no predicate or no root → `Ok(None)`, matching everything
/// - any field-value reference → [`TranslateError::UnsupportedPredicate`]
/// - otherwise the reduced expression, or `None` when it reduces to `true`
pub fn translate(predicate: Option<&Predicate>) -> Result<Option<Expr>, TranslateError> {
    let Some(root) = predicate.and_then(Predicate::root) else {
        return Ok(None);
    };

    let expr = node_to_expr(root, None)?;
    if has_field_value_key(&expr) {
        return Err(TranslateError::UnsupportedPredicate);
    }

    let reduced = reduce(expr.clone(), None);
    if is_true_literal(&reduced) {
        return Ok(None);
    }
    Ok(Some(reduced))
}
