use crate::{config::ConfigError, db::key::KeyError, db::plan::PlanError};
use std::fmt;
use thiserror::Error as ThisError;

///
/// InternalError
///
/// Structured runtime error with a stable internal classification.
/// Every cursor, aggregator and scanner operation reports failures through
/// this type; the typed origin error (if any) is preserved in `detail`.
///

#[derive(Debug, ThisError)]
#[error("{message}")]
pub struct InternalError {
    pub class: ErrorClass,
    pub origin: ErrorOrigin,
    pub message: String,

    /// Optional structured error detail.
    /// The variant (if present) must correspond to `origin`.
    pub detail: Option<ErrorDetail>,
}

impl InternalError {
    /// Construct an InternalError without a structured detail payload.
    pub fn new(class: ErrorClass, origin: ErrorOrigin, message: impl Into<String>) -> Self {
        Self {
            class,
            origin,
            message: message.into(),
            detail: None,
        }
    }

    /// Construct a cursor-origin invariant violation.
    pub(crate) fn cursor_invariant(message: impl Into<String>) -> Self {
        Self::new(
            ErrorClass::InvariantViolation,
            ErrorOrigin::Cursor,
            message.into(),
        )
    }

    /// Construct a store-origin invariant violation.
    pub(crate) fn store_invariant(message: impl Into<String>) -> Self {
        Self::new(
            ErrorClass::InvariantViolation,
            ErrorOrigin::Store,
            message.into(),
        )
    }

    /// Construct an aggregate-origin invariant violation.
    pub(crate) fn aggregate_invariant(message: impl Into<String>) -> Self {
        Self::new(
            ErrorClass::InvariantViolation,
            ErrorOrigin::Aggregate,
            message.into(),
        )
    }

    /// Construct a scan-origin invariant violation.
    pub(crate) fn scan_invariant(message: impl Into<String>) -> Self {
        Self::new(
            ErrorClass::InvariantViolation,
            ErrorOrigin::Scan,
            message.into(),
        )
    }

    /// Construct a serialize-origin corruption error.
    pub(crate) fn serialize_corruption(message: impl Into<String>) -> Self {
        Self::new(
            ErrorClass::Corruption,
            ErrorOrigin::Serialize,
            message.into(),
        )
    }

    /// Construct a serialize-origin internal error.
    pub(crate) fn serialize_internal(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Internal, ErrorOrigin::Serialize, message.into())
    }

    #[must_use]
    pub const fn is_malformed_key(&self) -> bool {
        matches!(
            self.detail,
            Some(ErrorDetail::Key(KeyError::MalformedKey { .. }))
        )
    }

    #[must_use]
    pub const fn is_planner_fault(&self) -> bool {
        matches!(
            self.detail,
            Some(ErrorDetail::Plan(PlanError::PlannerConsistencyFault { .. }))
        )
    }

    #[must_use]
    pub fn display_with_class(&self) -> String {
        format!("{}:{}: {}", self.origin, self.class, self.message)
    }
}

///
/// ErrorDetail
///
/// Structured, origin-specific error detail carried by [`InternalError`].
///

#[derive(Debug, ThisError)]
pub enum ErrorDetail {
    #[error("{0}")]
    Key(KeyError),
    #[error("{0}")]
    Plan(PlanError),
    #[error("{0}")]
    Config(ConfigError),
}

impl From<KeyError> for InternalError {
    fn from(err: KeyError) -> Self {
        Self {
            class: ErrorClass::Corruption,
            origin: ErrorOrigin::Key,
            message: err.to_string(),
            detail: Some(ErrorDetail::Key(err)),
        }
    }
}

impl From<PlanError> for InternalError {
    fn from(err: PlanError) -> Self {
        let class = match err {
            PlanError::PlannerConsistencyFault { .. } => ErrorClass::InvariantViolation,
            PlanError::InvalidPlanShape { .. } | PlanError::IndexOnlyNullComparison { .. } => {
                ErrorClass::Unsupported
            }
        };

        Self {
            class,
            origin: ErrorOrigin::Plan,
            message: err.to_string(),
            detail: Some(ErrorDetail::Plan(err)),
        }
    }
}

impl From<ConfigError> for InternalError {
    fn from(err: ConfigError) -> Self {
        Self {
            class: ErrorClass::Unsupported,
            origin: ErrorOrigin::Config,
            message: err.to_string(),
            detail: Some(ErrorDetail::Config(err)),
        }
    }
}

///
/// ErrorClass
/// Internal error taxonomy for runtime classification.
/// Not a stable API; may change without notice.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorClass {
    Corruption,
    Internal,
    Unsupported,
    InvariantViolation,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Corruption => "corruption",
            Self::Internal => "internal",
            Self::Unsupported => "unsupported",
            Self::InvariantViolation => "invariant_violation",
        };
        write!(f, "{label}")
    }
}

///
/// ErrorOrigin
/// Internal origin taxonomy for runtime classification.
/// Not a stable API; may change without notice.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorOrigin {
    Key,
    Store,
    Aggregate,
    Cursor,
    Plan,
    Scan,
    Serialize,
    Config,
}

impl fmt::Display for ErrorOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Key => "key",
            Self::Store => "store",
            Self::Aggregate => "aggregate",
            Self::Cursor => "cursor",
            Self::Plan => "plan",
            Self::Scan => "scan",
            Self::Serialize => "serialize",
            Self::Config => "config",
        };
        write!(f, "{label}")
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_key_maps_to_key_corruption() {
        let err = InternalError::from(KeyError::malformed("missing field separator", b"fi"));

        assert_eq!(err.class, ErrorClass::Corruption);
        assert_eq!(err.origin, ErrorOrigin::Key);
        assert!(err.is_malformed_key());
        assert!(err.display_with_class().starts_with("key:corruption:"));
    }

    #[test]
    fn planner_fault_maps_to_plan_invariant() {
        let err = InternalError::from(PlanError::PlannerConsistencyFault {
            field: "NAME".to_string(),
        });

        assert_eq!(err.class, ErrorClass::InvariantViolation);
        assert_eq!(err.origin, ErrorOrigin::Plan);
        assert!(err.is_planner_fault());
        assert!(!err.is_malformed_key());
    }

    #[test]
    fn invalid_plan_shape_is_unsupported() {
        let err = InternalError::from(PlanError::InvalidPlanShape {
            reason: "negation at root".to_string(),
        });

        assert_eq!(err.class, ErrorClass::Unsupported);
        assert_eq!(err.display_with_class(), format!("plan:unsupported: {err}"));
    }
}
