use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum StreamError {
    #[error("Stream cancelled")]
    Cancelled,

    #[error("Stream closed")]
    Closed,

    #[error("Upstream failure: {0}")]
    Failed(Arc<anyhow::Error>),
}

impl StreamError {
    /// Wrap a caller error as a terminal stream failure
    pub fn failed(error: impl Into<anyhow::Error>) -> Self {
        StreamError::Failed(Arc::new(error.into()))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, StreamError::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, StreamError>;
