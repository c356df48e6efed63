use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{BatchError, Result};

pub const DEFAULT_MAX_BATCH_SIZE: usize = 10;
pub const DEFAULT_MAX_WAIT_MS: u64 = 100;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BatcherConfig {
    /// Dispatch as soon as the open batch holds this many items
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
    /// Dispatch a partial batch this long after its first item arrived
    #[serde(default = "default_max_wait_ms")]
    pub max_wait_ms: u64,
}

fn default_max_batch_size() -> usize {
    DEFAULT_MAX_BATCH_SIZE
}

fn default_max_wait_ms() -> u64 {
    DEFAULT_MAX_WAIT_MS
}

impl Default for BatcherConfig {
    fn default() -> Self {
        Self {
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            max_wait_ms: DEFAULT_MAX_WAIT_MS,
        }
    }
}

impl BatcherConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_batch_size(mut self, size: usize) -> Self {
        self.max_batch_size = size;
        self
    }

    /// Stored in whole milliseconds, rounded up so a positive wait stays positive
    pub fn with_max_wait(mut self, wait: Duration) -> Self {
        self.max_wait_ms = u64::try_from(wait.as_nanos().div_ceil(1_000_000)).unwrap_or(u64::MAX);
        self
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_batch_size == 0 {
            return Err(BatchError::InvalidConfig(
                "max_batch_size must be at least 1".to_string(),
            ));
        }
        if self.max_wait_ms == 0 {
            return Err(BatchError::InvalidConfig(
                "max_wait_ms must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}
