//! Predicate translation
//!
//! Converts the protocol-neutral [`Node`] tree callers send into the engine's
//! [`Expr`], rejecting what the engine cannot evaluate and folding constants
//! so a tautology is passed on as "no predicate".
//!
//! ```text
//! Node ──node_to_expr──▶ Expr ──reduce──▶ Expr | true ──▶ Some(expr) | None
//! ```

pub mod expr;
pub mod node;
pub mod reduce;
pub mod translate;

pub use expr::{is_false_literal, is_true_literal, BinaryOp, Expr, VarKind};
pub use node::{ComparisonOp, Literal, LogicalOp, Node, Predicate};
pub use reduce::{reduce, PointValuer, Valuer};
pub use translate::{
    has_field_value_key, measurement_remap, node_to_expr, rewrite_remove_field_value, translate,
    FIELD_VALUE_KEY,
};
