//! Module: db::plan
//! Responsibility: compile boolean query trees into document cursor trees.
//! Does not own: cursor execution or scan-range policy.
//! Boundary: a compiled plan is either a runnable cursor tree or a typed error.

mod ast;
mod builder;
mod error;
mod leaf;

#[cfg(test)]
mod tests;

pub use ast::QueryNode;
pub use builder::{CompiledPlan, FieldPolicy, PlanBuilder};
pub use error::PlanError;
pub use leaf::{BuilderKind, FieldIndexLeaves, LeafStrategy, Leaves, TopLevelLeaves};
