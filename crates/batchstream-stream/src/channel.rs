//! Bounded FIFO channel bound to a cancellation scope.
//!
//! Both halves race their operation against the scope. A fired scope always
//! wins, even when a value is ready, so nothing buffered is observed after
//! cancellation.

use async_channel::{bounded as raw_bounded, Receiver, Sender};
use tokio_util::sync::CancellationToken;

use crate::error::{Result, StreamError};

/// Create a cancellable channel holding at most `capacity` values (minimum 1)
pub fn bounded<T>(
    capacity: usize,
    scope: CancellationToken,
) -> (CancellableSender<T>, CancellableReceiver<T>) {
    let (tx, rx) = raw_bounded(capacity.max(1));
    (
        CancellableSender {
            tx,
            scope: scope.clone(),
        },
        CancellableReceiver { rx, scope },
    )
}

#[derive(Debug)]
pub struct CancellableSender<T> {
    tx: Sender<T>,
    scope: CancellationToken,
}

impl<T> Clone for CancellableSender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            scope: self.scope.clone(),
        }
    }
}

impl<T> CancellableSender<T> {
    /// Wait for room in the queue (backpressure) or for the scope to fire
    pub async fn send(&self, value: T) -> Result<()> {
        if self.scope.is_cancelled() {
            return Err(StreamError::Cancelled);
        }

        tokio::select! {
            biased;
            _ = self.scope.cancelled() => Err(StreamError::Cancelled),
            sent = self.tx.send(value) => sent.map_err(|_| StreamError::Closed),
        }
    }

    /// Mark the channel as finished; buffered values stay drainable
    pub fn close(&self) -> bool {
        self.tx.close()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    pub fn scope(&self) -> &CancellationToken {
        &self.scope
    }
}

#[derive(Debug)]
pub struct CancellableReceiver<T> {
    rx: Receiver<T>,
    scope: CancellationToken,
}

impl<T> CancellableReceiver<T> {
    /// Next value in FIFO order.
    ///
    /// Returns `Err(Closed)` once the sender closed and the queue is drained,
    /// `Err(Cancelled)` as soon as the scope fires.
    pub async fn recv(&self) -> Result<T> {
        if self.scope.is_cancelled() {
            return Err(StreamError::Cancelled);
        }

        tokio::select! {
            biased;
            _ = self.scope.cancelled() => Err(StreamError::Cancelled),
            received = self.rx.recv() => received.map_err(|_| StreamError::Closed),
        }
    }

    /// Number of values currently buffered
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.rx.capacity().unwrap_or(1)
    }

    pub fn scope(&self) -> &CancellationToken {
        &self.scope
    }
}
