use async_trait::async_trait;
use std::future::Future;
use tokio_util::sync::CancellationToken;

/// Outcome of one batch call: per-item results, or one batch-wide failure
pub type BatchResults<R> = anyhow::Result<Vec<anyhow::Result<R>>>;

/// Bulk processing function a [`Batcher`](crate::Batcher) dispatches to.
///
/// Results are matched to items by index. Several batches may be in flight at
/// once, so implementations must tolerate concurrent calls. Retries belong
/// here, not in the batcher.
#[async_trait]
pub trait BatchProcessor<T, R>: Send + Sync {
    async fn process(&self, cancel: CancellationToken, batch: Vec<T>) -> BatchResults<R>;
}

#[async_trait]
impl<T, R, F, Fut> BatchProcessor<T, R> for F
where
    F: Fn(CancellationToken, Vec<T>) -> Fut + Send + Sync,
    Fut: Future<Output = BatchResults<R>> + Send + 'static,
    T: Send + 'static,
    R: Send + 'static,
{
    async fn process(&self, cancel: CancellationToken, batch: Vec<T>) -> BatchResults<R> {
        self(cancel, batch).await
    }
}

/// Single-item path used by [`AutoBatcher`](crate::AutoBatcher) when batching is off
#[async_trait]
pub trait ItemProcessor<T, R>: Send + Sync {
    async fn process_one(&self, cancel: CancellationToken, item: T) -> anyhow::Result<R>;
}

#[async_trait]
impl<T, R, F, Fut> ItemProcessor<T, R> for F
where
    F: Fn(CancellationToken, T) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
    T: Send + 'static,
    R: Send + 'static,
{
    async fn process_one(&self, cancel: CancellationToken, item: T) -> anyhow::Result<R> {
        self(cancel, item).await
    }
}
