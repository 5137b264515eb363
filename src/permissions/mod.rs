//! Role-based access control with field allowlists and row filters.

pub mod evaluator;
pub mod filter;
pub mod types;

pub use evaluator::{
    AccessDecision, AccessRequest, DenyReason, Grant, PermissionEvaluator, RequestContext,
};
pub use filter::{Filter, FilterVariables, Operand, Operator, Variable};
pub use types::{Action, FieldSet, Permission, Role};
