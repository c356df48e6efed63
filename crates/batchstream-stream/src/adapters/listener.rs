use tokio::task::JoinHandle;

use crate::error::StreamError;
use crate::stream::Stream;

type ItemCallback<T> = Box<dyn FnMut(T) + Send>;
type ErrorCallback = Box<dyn FnMut(StreamError) + Send>;
type DoneCallback = Box<dyn FnOnce() + Send>;

/// Terminal consumer driving callbacks as values arrive.
///
/// `on_done` runs exactly once, after the last item and any error.
pub struct Listener<T> {
    on_item: Option<ItemCallback<T>>,
    on_error: Option<ErrorCallback>,
    on_done: Option<DoneCallback>,
}

impl<T> Default for Listener<T> {
    fn default() -> Self {
        Self {
            on_item: None,
            on_error: None,
            on_done: None,
        }
    }
}

impl<T: Send + 'static> Listener<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_item(mut self, callback: impl FnMut(T) + Send + 'static) -> Self {
        self.on_item = Some(Box::new(callback));
        self
    }

    pub fn on_error(mut self, callback: impl FnMut(StreamError) + Send + 'static) -> Self {
        self.on_error = Some(Box::new(callback));
        self
    }

    pub fn on_done(mut self, callback: impl FnOnce() + Send + 'static) -> Self {
        self.on_done = Some(Box::new(callback));
        self
    }

    pub async fn run(mut self, mut stream: Stream<T>) {
        while let Some(item) = stream.recv().await {
            if let Some(on_item) = self.on_item.as_mut() {
                on_item(item);
            }
        }

        if let Some(error) = stream.take_error() {
            match self.on_error.as_mut() {
                Some(on_error) => on_error(error),
                None => tracing::debug!(error = %error, "listener stream ended with unhandled error"),
            }
        }

        if let Some(on_done) = self.on_done.take() {
            on_done();
        }
    }

    /// Fire-and-forget variant of [`Listener::run`]
    pub fn spawn(self, stream: Stream<T>) -> JoinHandle<()> {
        tokio::spawn(self.run(stream))
    }
}
