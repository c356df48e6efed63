//! Composable stages over [`Stream`].
//!
//! Every stage runs on its own task, stops when its input ends or the shared
//! scope fires, and always closes its output on exit. A failed input is
//! forwarded downstream as the output's terminal error.

use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::config::DEFAULT_STREAM_CAPACITY;
use crate::error::{Result, StreamError};
use crate::stream::Stream;

impl<T: Send + 'static> Stream<T> {
    /// Forward only the values for which `predicate` holds
    pub fn filter<P>(mut self, mut predicate: P) -> Stream<T>
    where
        P: FnMut(&T) -> bool + Send + 'static,
    {
        let (writer, output) = self.derive();

        tokio::spawn(async move {
            tracing::trace!(stage = "filter", "stage started");
            while let Some(value) = self.recv().await {
                if predicate(&value) && writer.send(value).await.is_err() {
                    tracing::trace!(stage = "filter", "output gone, stopping");
                    return;
                }
            }
            writer.finish(self.take_error()).await;
        });

        output
    }

    /// Forward `transform(value)` for every value, in order
    pub fn map<U, F>(mut self, mut transform: F) -> Stream<U>
    where
        U: Send + 'static,
        F: FnMut(T) -> U + Send + 'static,
    {
        let (writer, output) = self.derive();

        tokio::spawn(async move {
            tracing::trace!(stage = "map", "stage started");
            while let Some(value) = self.recv().await {
                if writer.send(transform(value)).await.is_err() {
                    tracing::trace!(stage = "map", "output gone, stopping");
                    return;
                }
            }
            writer.finish(self.take_error()).await;
        });

        output
    }

    /// Group values into vectors of `max_size` (at least 1).
    ///
    /// A non-empty trailing group is emitted when the input closes or fails.
    /// Cancellation discards it.
    pub fn buffer(mut self, max_size: usize) -> Stream<Vec<T>> {
        let max_size = max_size.max(1);
        let (writer, output) = self.derive();

        tokio::spawn(async move {
            tracing::trace!(stage = "buffer", max_size, "stage started");
            let mut group = Vec::with_capacity(max_size);

            while let Some(value) = self.recv().await {
                group.push(value);
                if group.len() == max_size {
                    let full = std::mem::replace(&mut group, Vec::with_capacity(max_size));
                    if writer.send(full).await.is_err() {
                        tracing::trace!(stage = "buffer", "output gone, stopping");
                        return;
                    }
                }
            }

            let outcome = self.take_error();
            let cancelled = outcome.as_ref().is_some_and(StreamError::is_cancelled);
            if !group.is_empty() && !cancelled && writer.send(group).await.is_err() {
                return;
            }
            writer.finish(outcome).await;
        });

        output
    }

    /// Drain the stream into a vector.
    ///
    /// Fails with the stream's terminal error, if it had one.
    pub async fn aggregate(mut self) -> Result<Vec<T>> {
        let mut values = Vec::new();
        while let Some(value) = self.recv().await {
            values.push(value);
        }

        match self.take_error() {
            Some(error) => Err(error),
            None => Ok(values),
        }
    }

    /// Fan several streams into one.
    ///
    /// Values from different inputs interleave in arrival order. The output
    /// closes once every input has closed, or when `scope` fires.
    pub fn merge(scope: &CancellationToken, inputs: Vec<Stream<T>>) -> Stream<T> {
        let capacity = inputs
            .first()
            .map(Stream::capacity)
            .unwrap_or(DEFAULT_STREAM_CAPACITY);
        let (writer, output) = Stream::with_scope(scope.clone(), capacity);
        let scope = scope.clone();

        tokio::spawn(async move {
            tracing::trace!(stage = "merge", inputs = inputs.len(), "stage started");
            let mut merged = futures::stream::select_all(inputs.into_iter().map(Stream::into_stream));

            loop {
                let next = tokio::select! {
                    biased;
                    _ = scope.cancelled() => return,
                    next = merged.next() => next,
                };

                match next {
                    Some(Ok(value)) => {
                        if writer.send(value).await.is_err() {
                            tracing::trace!(stage = "merge", "output gone, stopping");
                            return;
                        }
                    }
                    Some(Err(error)) => {
                        writer.finish(Some(error)).await;
                        return;
                    }
                    None => break,
                }
            }

            writer.close();
        });

        output
    }
}

impl<T: Clone + Send + 'static> Stream<T> {
    /// Duplicate every value onto two outputs sharing this stream's scope.
    ///
    /// Each value reaches both branches before the next one is read, so a
    /// slow branch throttles the other. A branch whose reader is dropped is
    /// detached and the other keeps receiving.
    pub fn tee(mut self) -> (Stream<T>, Stream<T>) {
        let (left_writer, left) = self.derive();
        let (right_writer, right) = self.derive();

        tokio::spawn(async move {
            tracing::trace!(stage = "tee", "stage started");
            let mut branches = [Some(left_writer), Some(right_writer)];

            while let Some(value) = self.recv().await {
                for branch in branches.iter_mut() {
                    let sent = match branch {
                        Some(writer) => writer.send(value.clone()).await,
                        None => continue,
                    };

                    match sent {
                        Ok(()) => {}
                        Err(StreamError::Cancelled) => return,
                        Err(_) => {
                            tracing::debug!(stage = "tee", "branch reader dropped, detaching");
                            *branch = None;
                        }
                    }
                }

                if branches.iter().all(Option::is_none) {
                    return;
                }
            }

            let outcome = self.take_error();
            for writer in branches.into_iter().flatten() {
                writer.finish(outcome.clone()).await;
            }
        });

        (left, right)
    }
}
