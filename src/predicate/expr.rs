//! Storage engine expression form
//!
//! [`Expr`] is what the engine evaluates against series tags. It is produced
//! from a [`Node`](super::node::Node) tree by translation and simplified by
//! [`reduce`](super::reduce::reduce).

use regex::Regex;
use std::fmt;

/// Engine expression
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Binary operation
    Binary {
        /// Operator
        op: BinaryOp,
        /// Left operand
        lhs: Box<Expr>,
        /// Right operand
        rhs: Box<Expr>,
    },
    /// Parenthesized expression
    Paren(Box<Expr>),
    /// Variable reference
    VarRef {
        /// Tag key or reserved field-value key
        name: String,
        /// What the reference resolves against
        kind: VarKind,
    },
    /// String literal
    String(String),
    /// Signed integer literal
    Integer(i64),
    /// Unsigned integer literal
    Unsigned(u64),
    /// Floating point literal
    Number(f64),
    /// Boolean literal
    Boolean(bool),
    /// Compiled regex literal
    Regex(RegexLiteral),
}

/// What a [`Expr::VarRef`] resolves against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarKind {
    /// Series tag
    Tag,
    /// Point value
    Field,
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    /// `AND`
    And,
    /// `OR`
    Or,
    /// `=`
    Eq,
    /// `!=`
    Neq,
    /// `=~`
    EqRegex,
    /// `!~`
    NeqRegex,
    /// `<`
    Lt,
    /// `<=`
    Lte,
    /// `>`
    Gt,
    /// `>=`
    Gte,
}

impl BinaryOp {
    /// Whether this operator combines booleans
    pub fn is_logical(&self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }

    /// Operator that holds exactly when this one does not
    pub fn negated(&self) -> Option<BinaryOp> {
        match self {
            BinaryOp::Eq => Some(BinaryOp::Neq),
            BinaryOp::Neq => Some(BinaryOp::Eq),
            BinaryOp::EqRegex => Some(BinaryOp::NeqRegex),
            BinaryOp::NeqRegex => Some(BinaryOp::EqRegex),
            BinaryOp::Lt => Some(BinaryOp::Gte),
            BinaryOp::Gte => Some(BinaryOp::Lt),
            BinaryOp::Gt => Some(BinaryOp::Lte),
            BinaryOp::Lte => Some(BinaryOp::Gt),
            BinaryOp::And | BinaryOp::Or => None,
        }
    }

    /// Operator with operands swapped, for comparisons that allow it
    pub fn swapped(&self) -> Option<BinaryOp> {
        match self {
            BinaryOp::Eq | BinaryOp::Neq => Some(*self),
            BinaryOp::Lt => Some(BinaryOp::Gt),
            BinaryOp::Gt => Some(BinaryOp::Lt),
            BinaryOp::Lte => Some(BinaryOp::Gte),
            BinaryOp::Gte => Some(BinaryOp::Lte),
            _ => None,
        }
    }

    fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::And => "AND",
            BinaryOp::Or => "OR",
            BinaryOp::Eq => "=",
            BinaryOp::Neq => "!=",
            BinaryOp::EqRegex => "=~",
            BinaryOp::NeqRegex => "!~",
            BinaryOp::Lt => "<",
            BinaryOp::Lte => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Gte => ">=",
        }
    }
}

/// Regex literal compared by pattern text
#[derive(Debug, Clone)]
pub struct RegexLiteral(pub Regex);

impl PartialEq for RegexLiteral {
    fn eq(&self, other: &Self) -> bool {
        self.0.as_str() == other.0.as_str()
    }
}

impl Expr {
    /// Tag reference
    pub fn tag(name: impl Into<String>) -> Self {
        Expr::VarRef {
            name: name.into(),
            kind: VarKind::Tag,
        }
    }

    /// Binary expression
    pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Self {
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    /// Whether this is a literal of any type
    pub fn is_literal(&self) -> bool {
        matches!(
            self,
            Expr::String(_)
                | Expr::Integer(_)
                | Expr::Unsigned(_)
                | Expr::Number(_)
                | Expr::Boolean(_)
                | Expr::Regex(_)
        )
    }

    /// Expression with any outer parentheses removed
    pub fn unparen(&self) -> &Expr {
        match self {
            Expr::Paren(inner) => inner.unparen(),
            other => other,
        }
    }

    /// Whether any variable reference named `name` appears in the tree
    pub fn references(&self, name: &str) -> bool {
        match self {
            Expr::Binary { lhs, rhs, .. } => lhs.references(name) || rhs.references(name),
            Expr::Paren(inner) => inner.references(name),
            Expr::VarRef { name: n, .. } => n == name,
            _ => false,
        }
    }
}

/// Whether the expression is the literal `true`
pub fn is_true_literal(expr: &Expr) -> bool {
    matches!(expr.unparen(), Expr::Boolean(true))
}

/// Whether the expression is the literal `false`
pub fn is_false_literal(expr: &Expr) -> bool {
    matches!(expr.unparen(), Expr::Boolean(false))
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Binary { op, lhs, rhs } => write!(f, "{} {} {}", lhs, op.symbol(), rhs),
            Expr::Paren(inner) => write!(f, "({})", inner),
            Expr::VarRef { name, .. } => write!(f, "{:?}", name),
            Expr::String(s) => write!(f, "'{}'", s.replace('\'', "\\'")),
            Expr::Integer(v) => write!(f, "{}", v),
            Expr::Unsigned(v) => write!(f, "{}", v),
            Expr::Number(v) => write!(f, "{}", v),
            Expr::Boolean(v) => write!(f, "{}", v),
            Expr::Regex(re) => write!(f, "/{}/", re.0.as_str().replace('/', "\\/")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let expr = Expr::binary(
            BinaryOp::Or,
            Expr::binary(BinaryOp::Eq, Expr::tag("host"), Expr::String("a".into())),
            Expr::Paren(Box::new(Expr::binary(
                BinaryOp::EqRegex,
                Expr::tag("dc"),
                Expr::Regex(RegexLiteral(Regex::new("^us-").unwrap())),
            ))),
        );
        assert_eq!(expr.to_string(), r#""host" = 'a' OR ("dc" =~ /^us-/)"#);
    }

    #[test]
    fn test_references_and_literals() {
        let expr = Expr::binary(BinaryOp::Gt, Expr::tag("$"), Expr::Number(1.0));
        assert!(expr.references("$"));
        assert!(!expr.references("host"));
        assert!(is_true_literal(&Expr::Paren(Box::new(Expr::Boolean(true)))));
        assert!(is_false_literal(&Expr::Boolean(false)));
    }

    #[test]
    fn test_negated_ops_are_involutions() {
        for op in [BinaryOp::Eq, BinaryOp::EqRegex, BinaryOp::Lt, BinaryOp::Gt] {
            assert_eq!(op.negated().and_then(|n| n.negated()), Some(op));
        }
        assert_eq!(BinaryOp::And.negated(), None);
    }
}
