//! Protocol-neutral predicate AST
//!
//! This is the shape callers use to describe a boolean filter over tags and
//! field values. It is never evaluated directly; [`translate`](super::translate)
//! converts it into the engine's [`Expr`](super::expr::Expr).

use serde::{Deserialize, Serialize};

/// A request predicate; an absent root matches everything
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Predicate {
    /// Root of the expression tree
    pub root: Option<Node>,
}

impl Predicate {
    /// Wrap a root node
    pub fn new(root: Node) -> Self {
        Self { root: Some(root) }
    }

    /// Root node, if any
    pub fn root(&self) -> Option<&Node> {
        self.root.as_ref()
    }
}

/// Node of the predicate tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Node {
    /// Boolean combination of two or more children
    Logical {
        /// Combinator
        op: LogicalOp,
        /// Operands, combined left to right
        children: Vec<Node>,
    },
    /// Binary comparison
    Comparison {
        /// Comparison operator
        op: ComparisonOp,
        /// Left operand
        lhs: Box<Node>,
        /// Right operand
        rhs: Box<Node>,
    },
    /// Parenthesized sub-expression
    Paren(Box<Node>),
    /// Reference to a tag by key
    TagRef(String),
    /// Reference to a field's value
    FieldRef(String),
    /// Constant
    Literal(Literal),
}

/// Boolean combinators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogicalOp {
    /// Conjunction
    And,
    /// Disjunction
    Or,
}

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonOp {
    /// `=`
    Equal,
    /// `!=`
    NotEqual,
    /// Prefix match
    StartsWith,
    /// `=~`
    Regex,
    /// `!~`
    NotRegex,
    /// `<`
    Lt,
    /// `<=`
    Lte,
    /// `>`
    Gt,
    /// `>=`
    Gte,
}

/// Literal values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Literal {
    /// String
    String(String),
    /// Signed integer
    Integer(i64),
    /// Unsigned integer
    Unsigned(u64),
    /// Floating point
    Float(f64),
    /// Boolean
    Boolean(bool),
    /// Regular expression pattern
    Regex(String),
}

// Builders used by callers and tests to assemble trees tersely.
impl Node {
    /// `key = value` on a tag
    pub fn tag_eq(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::compare(
            ComparisonOp::Equal,
            Node::TagRef(key.into()),
            Node::Literal(Literal::String(value.into())),
        )
    }

    /// `key != value` on a tag
    pub fn tag_ne(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::compare(
            ComparisonOp::NotEqual,
            Node::TagRef(key.into()),
            Node::Literal(Literal::String(value.into())),
        )
    }

    /// `key =~ /pattern/` on a tag
    pub fn tag_regex(key: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::compare(
            ComparisonOp::Regex,
            Node::TagRef(key.into()),
            Node::Literal(Literal::Regex(pattern.into())),
        )
    }

    /// Comparison between two nodes
    pub fn compare(op: ComparisonOp, lhs: Node, rhs: Node) -> Self {
        Node::Comparison {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    /// Conjunction of the given nodes
    pub fn and(children: Vec<Node>) -> Self {
        Node::Logical {
            op: LogicalOp::And,
            children,
        }
    }

    /// Disjunction of the given nodes
    pub fn or(children: Vec<Node>) -> Self {
        Node::Logical {
            op: LogicalOp::Or,
            children,
        }
    }

    /// Parenthesize a node
    pub fn paren(inner: Node) -> Self {
        Node::Paren(Box::new(inner))
    }
}
