use thiserror::Error;

pub type AdapterResult<T> = Result<T, AdapterError>;

/// Rejected group URI.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid group uri {0:?}")]
pub struct InvalidGroup(pub String);

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("{technology} adapter failed to initialize: {reason}")]
    InitFailed {
        technology: &'static str,
        reason: String,
    },

    #[error("adapter i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unsupported adapter operation: {0}")]
    Unsupported(&'static str),

    #[error(transparent)]
    InvalidGroup(#[from] InvalidGroup),
}

impl AdapterError {
    pub fn init_failed(technology: &'static str, reason: impl Into<String>) -> Self {
        AdapterError::InitFailed {
            technology,
            reason: reason.into(),
        }
    }
}
