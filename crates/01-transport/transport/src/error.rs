//! Error handling helpers for the transport crate.
//!
//! The transport layer keeps its error surface small: capacity validation and
//! a closed queue. Budget exhaustion is not an error; callers get `false`/`None`.

use std::fmt;

/// Convenience result alias for fallible transport operations.
pub type TransportResult<T, E = TransportError> = Result<T, E>;

#[derive(Debug, Clone, PartialEq, Eq)]
/// Errors surfaced by low-level transport helpers.
pub enum TransportError {
    /// Requested budget is below the minimum usable size.
    InvalidCapacity { requested: usize, minimum: usize },
    /// The consuming side of a queue has been dropped.
    Closed,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::InvalidCapacity { requested, minimum } => {
                write!(
                    f,
                    "budget capacity {requested} must be at least {minimum} bytes"
                )
            }
            TransportError::Closed => write!(f, "queue consumer has been dropped"),
        }
    }
}

impl std::error::Error for TransportError {}
