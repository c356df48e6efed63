use std::future::Future;
use std::pin::Pin;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::channel::{self, CancellableReceiver, CancellableSender};
use crate::error::{Result, StreamError};

/// Boxed `futures` view of a [`Stream`], terminal failures arrive as the last item
pub type BoxedStream<T> = Pin<Box<dyn futures::Stream<Item = Result<T>> + Send>>;

/// Reading half of a single-writer, single-reader conduit.
///
/// A stream is `Open` until its writer closes it (buffered values remain
/// drainable) or its scope fires (buffered values are discarded). Both are
/// terminal. After [`Stream::recv`] returns `None`, [`Stream::error`] tells the
/// two apart.
pub struct Stream<T> {
    rx: CancellableReceiver<Result<T>>,
    capacity: usize,
    error: Option<StreamError>,
    finished: bool,
}

/// Writing half of a [`Stream`]. Consumed by `close`/`fail`, closes on drop.
pub struct StreamWriter<T> {
    tx: CancellableSender<Result<T>>,
}

impl<T> Stream<T> {
    /// Create a writer/reader pair whose scope is derived from `parent`
    pub fn channel(parent: &CancellationToken, capacity: usize) -> (StreamWriter<T>, Stream<T>) {
        Self::with_scope(parent.child_token(), capacity)
    }

    /// Create a writer/reader pair bound to exactly `scope`
    pub(crate) fn with_scope(
        scope: CancellationToken,
        capacity: usize,
    ) -> (StreamWriter<T>, Stream<T>) {
        let capacity = capacity.max(1);
        let (tx, rx) = channel::bounded(capacity, scope);
        (
            StreamWriter { tx },
            Stream {
                rx,
                capacity,
                error: None,
                finished: false,
            },
        )
    }

    /// Output pair for a stage fed by this stream: same scope, same capacity
    pub(crate) fn derive<U>(&self) -> (StreamWriter<U>, Stream<U>) {
        Stream::with_scope(self.scope().clone(), self.capacity)
    }

    /// Wait for the next value.
    ///
    /// `None` once the writer has closed and everything buffered was drained,
    /// once the writer failed, or as soon as the scope fires.
    pub async fn recv(&mut self) -> Option<T> {
        if self.finished {
            return None;
        }

        match self.rx.recv().await {
            Ok(Ok(value)) => Some(value),
            Ok(Err(error)) | Err(error @ StreamError::Cancelled) => {
                self.finished = true;
                self.error = Some(error);
                None
            }
            Err(_) => {
                self.finished = true;
                None
            }
        }
    }

    /// Why the stream ended: `None` for a normal close
    pub fn error(&self) -> Option<&StreamError> {
        self.error.as_ref()
    }

    pub fn take_error(&mut self) -> Option<StreamError> {
        self.error.take()
    }

    /// `Err` if the stream ended because of cancellation or an upstream failure
    pub fn check(&self) -> Result<()> {
        match &self.error {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn scope(&self) -> &CancellationToken {
        self.rx.scope()
    }

    /// Fire this stream's scope, and with it every stage sharing the scope
    pub fn cancel(&self) {
        self.rx.scope().cancel();
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<T: Send + 'static> Stream<T> {
    /// Spawn `producer` with the writer half and return the reader
    pub fn generate<F, Fut>(parent: &CancellationToken, capacity: usize, producer: F) -> Stream<T>
    where
        F: FnOnce(StreamWriter<T>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (writer, stream) = Stream::channel(parent, capacity);
        tokio::spawn(producer(writer));
        stream
    }

    /// Stream every value of `values`, then close
    pub fn from_iter<I>(parent: &CancellationToken, capacity: usize, values: I) -> Stream<T>
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: Send + 'static,
    {
        let values = values.into_iter();
        Self::generate(parent, capacity, move |writer| async move {
            for value in values {
                if writer.send(value).await.is_err() {
                    return;
                }
            }
            writer.close();
        })
    }

    /// Bridge a `futures::Stream` into a cancellation-aware stream
    pub fn from_stream<S>(parent: &CancellationToken, capacity: usize, source: S) -> Stream<T>
    where
        S: futures::Stream<Item = T> + Send + 'static,
    {
        Self::generate(parent, capacity, move |writer| async move {
            let mut source = Box::pin(source);
            while let Some(value) = source.next().await {
                if writer.send(value).await.is_err() {
                    return;
                }
            }
            writer.close();
        })
    }

    /// Consume the reader as a `futures::Stream`.
    ///
    /// A cancelled or failed stream yields its error as the final item.
    pub fn into_stream(mut self) -> BoxedStream<T> {
        Box::pin(async_stream::stream! {
            while let Some(value) = self.recv().await {
                yield Ok(value);
            }
            if let Some(error) = self.take_error() {
                yield Err(error);
            }
        })
    }
}

impl<T> StreamWriter<T> {
    /// Blocks while the stream is full. Fails with `Cancelled` when the scope
    /// fires, `Closed` when the reader is gone.
    pub async fn send(&self, value: T) -> Result<()> {
        self.tx.send(Ok(value)).await
    }

    /// No more values. Buffered values remain drainable by the reader.
    pub fn close(self) {
        self.tx.close();
    }

    /// Deliver a terminal error to the reader, then close
    pub async fn fail(self, error: StreamError) -> Result<()> {
        let delivered = self.tx.send(Err(error)).await;
        self.tx.close();
        delivered
    }

    /// Close normally, or forward `outcome` first when the input ended badly
    pub async fn finish(self, outcome: Option<StreamError>) {
        match outcome {
            Some(error) => {
                let _ = self.fail(error).await;
            }
            None => self.close(),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    pub fn scope(&self) -> &CancellationToken {
        self.tx.scope()
    }
}

impl<T> Drop for StreamWriter<T> {
    fn drop(&mut self) {
        self.tx.close();
    }
}
