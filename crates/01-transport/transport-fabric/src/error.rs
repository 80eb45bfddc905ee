use thiserror::Error;

pub type FabricResult<T> = Result<T, FabricError>;

#[derive(Debug, Error)]
pub enum FabricError {
    #[error("codec error: {0}")]
    Codec(String),

    #[error("result slot abandoned before completion")]
    Closed,
}

impl FabricError {
    pub fn codec(msg: impl Into<String>) -> Self {
        FabricError::Codec(msg.into())
    }
}
