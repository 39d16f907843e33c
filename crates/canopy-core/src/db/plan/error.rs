use thiserror::Error as ThisError;

///
/// PlanError
///
/// Plan-compilation failures. Compilation aborts on the first error and no
/// partial plan is returned.
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum PlanError {
    #[error(
        "planner consistency fault: '{field}' has no resolvable value but the query was declared fully index-satisfied"
    )]
    PlannerConsistencyFault { field: String },

    #[error("invalid plan shape: {reason}")]
    InvalidPlanShape { reason: String },

    #[error("index-only field '{field}' cannot be compared against null")]
    IndexOnlyNullComparison { field: String },
}

impl PlanError {
    pub(crate) fn shape(reason: impl Into<String>) -> Self {
        Self::InvalidPlanShape {
            reason: reason.into(),
        }
    }
}
