use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BatchError {
    #[error("Submission cancelled")]
    Cancelled,

    #[error("Batcher is closed")]
    Closed,

    #[error("Batch processing failed: {0}")]
    Processing(Arc<anyhow::Error>),

    #[error("Item failed: {0}")]
    Item(anyhow::Error),

    #[error("Missing result for item {index}: processor returned {returned} results")]
    MissingResult { index: usize, returned: usize },

    #[error("Batch dispatch ended without delivering a result")]
    Abandoned,

    #[error("Fallback processing failed: {0}")]
    Fallback(anyhow::Error),

    #[error("Invalid batcher config: {0}")]
    InvalidConfig(String),
}

impl BatchError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, BatchError::Cancelled)
    }

    /// The shared batch-wide failure, if this item failed with its whole batch
    pub fn batch_failure(&self) -> Option<&Arc<anyhow::Error>> {
        match self {
            BatchError::Processing(error) => Some(error),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, BatchError>;
