use crate::db::key::printable;
use thiserror::Error as ThisError;

///
/// KeyError
///
/// Key-format failures raised by the key algebra.
/// A malformed key is a data-integrity failure and is never retried.
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum KeyError {
    #[error("malformed key ({reason}): '{bytes}'")]
    MalformedKey { reason: &'static str, bytes: String },
}

impl KeyError {
    pub(crate) fn malformed(reason: &'static str, bytes: &[u8]) -> Self {
        Self::MalformedKey {
            reason,
            bytes: printable(bytes),
        }
    }
}
