use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::DEFAULT_STREAM_CAPACITY;
use crate::error::StreamError;
use crate::stream::{Stream, StreamWriter};

/// Turns a batch function `payload -> Vec<item>` into one that streams its items.
///
/// A failed call reaches the reader as the stream's terminal error.
pub struct Streamify<F> {
    batch_fn: Arc<F>,
    scope: CancellationToken,
    capacity: usize,
}

impl<F> Streamify<F> {
    pub fn new(scope: &CancellationToken, batch_fn: F) -> Self {
        Self {
            batch_fn: Arc::new(batch_fn),
            scope: scope.clone(),
            capacity: DEFAULT_STREAM_CAPACITY,
        }
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Emit slices of at most `chunk_size` items instead of single items
    pub fn chunked(self, chunk_size: usize) -> StreamifyChunked<F> {
        StreamifyChunked {
            inner: self,
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn call<P, I, Fut>(&self, payload: P) -> Stream<I>
    where
        F: Fn(P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Vec<I>>> + Send + 'static,
        P: Send + 'static,
        I: Send + 'static,
    {
        let batch_fn = Arc::clone(&self.batch_fn);
        Stream::generate(&self.scope, self.capacity, move |writer| async move {
            match batch_fn(payload).await {
                Ok(items) => {
                    for item in items {
                        if writer.send(item).await.is_err() {
                            return;
                        }
                    }
                    writer.close();
                }
                Err(error) => fail(writer, error).await,
            }
        })
    }
}

pub struct StreamifyChunked<F> {
    inner: Streamify<F>,
    chunk_size: usize,
}

impl<F> StreamifyChunked<F> {
    pub fn new(scope: &CancellationToken, batch_fn: F, chunk_size: usize) -> Self {
        Streamify::new(scope, batch_fn).chunked(chunk_size)
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn call<P, I, Fut>(&self, payload: P) -> Stream<Vec<I>>
    where
        F: Fn(P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Vec<I>>> + Send + 'static,
        P: Send + 'static,
        I: Send + 'static,
    {
        let batch_fn = Arc::clone(&self.inner.batch_fn);
        let chunk_size = self.chunk_size;
        Stream::generate(&self.inner.scope, self.inner.capacity, move |writer| async move {
            match batch_fn(payload).await {
                Ok(items) => {
                    let mut items = items.into_iter().peekable();
                    while items.peek().is_some() {
                        let chunk: Vec<I> = items.by_ref().take(chunk_size).collect();
                        if writer.send(chunk).await.is_err() {
                            return;
                        }
                    }
                    writer.close();
                }
                Err(error) => fail(writer, error).await,
            }
        })
    }
}

async fn fail<T>(writer: StreamWriter<T>, error: anyhow::Error) {
    tracing::debug!(error = %error, "batch function failed, failing stream");
    let _ = writer.fail(StreamError::failed(error)).await;
}
