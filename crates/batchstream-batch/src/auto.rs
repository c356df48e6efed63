use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::batcher::Batcher;
use crate::error::{BatchError, Result};
use crate::processor::ItemProcessor;

/// A [`Batcher`] that can be switched off at runtime.
///
/// Enabled, [`AutoBatcher::process`] submits to the batcher. Disabled, it calls
/// the single-item fallback directly and nothing is batched.
pub struct AutoBatcher<T, R> {
    batcher: Batcher<T, R>,
    fallback: Arc<dyn ItemProcessor<T, R>>,
    enabled: Arc<AtomicBool>,
}

impl<T, R> Clone for AutoBatcher<T, R> {
    fn clone(&self) -> Self {
        Self {
            batcher: self.batcher.clone(),
            fallback: Arc::clone(&self.fallback),
            enabled: Arc::clone(&self.enabled),
        }
    }
}

impl<T, R> AutoBatcher<T, R>
where
    T: Send + 'static,
    R: Send + 'static,
{
    /// Starts enabled
    pub fn new<F>(batcher: Batcher<T, R>, fallback: F) -> Self
    where
        F: ItemProcessor<T, R> + 'static,
    {
        Self {
            batcher,
            fallback: Arc::new(fallback),
            enabled: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn with_enabled(self, enabled: bool) -> Self {
        self.set_enabled(enabled);
        self
    }

    pub async fn process(&self, cancel: &CancellationToken, payload: T) -> Result<R> {
        if self.is_enabled() {
            return self.batcher.submit(cancel, payload).await;
        }

        if cancel.is_cancelled() {
            return Err(BatchError::Cancelled);
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(BatchError::Cancelled),
            result = self.fallback.process_one(cancel.clone(), payload) => {
                result.map_err(BatchError::Fallback)
            }
        }
    }

    pub fn enable(&self) {
        self.set_enabled(true);
    }

    pub fn disable(&self) {
        self.set_enabled(false);
    }

    pub fn set_enabled(&self, enabled: bool) {
        let previous = self.enabled.swap(enabled, Ordering::AcqRel);
        if previous != enabled {
            tracing::debug!(enabled, "batching toggled");
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub fn batcher(&self) -> &Batcher<T, R> {
        &self.batcher
    }

    /// Close the underlying batcher; the fallback path stays usable
    pub async fn close(&self) {
        self.batcher.close().await;
    }
}
