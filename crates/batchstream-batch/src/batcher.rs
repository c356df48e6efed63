use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::config::BatcherConfig;
use crate::error::{BatchError, Result};
use crate::processor::BatchProcessor;
use crate::stats::{BatcherStats, Counters, DispatchTrigger};

/// Coalesces concurrently submitted items into size- or time-triggered batches.
///
/// Every [`Batcher::submit`] call gets back exactly the result its own item was
/// given by the processor. Handles are cheap to clone and share one open batch.
///
/// The open batch sits behind a single lock held only for an append, a size
/// check and arming or disarming the dispatch timer. The processor always runs
/// on its own task after the lock is released, one task per batch.
pub struct Batcher<T, R> {
    inner: Arc<Inner<T, R>>,
}

impl<T, R> Clone for Batcher<T, R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Inner<T, R> {
    config: BatcherConfig,
    processor: Arc<dyn BatchProcessor<T, R>>,
    open: Mutex<OpenBatch<T, R>>,
    tasks: TaskTracker,
    scope: CancellationToken,
    counters: Counters,
}

struct WorkItem<T, R> {
    payload: T,
    respond_to: oneshot::Sender<Result<R>>,
    cancel: CancellationToken,
}

/// The batch currently accepting items
struct OpenBatch<T, R> {
    id: u64,
    items: Vec<WorkItem<T, R>>,
    timer: Option<JoinHandle<()>>,
    closed: bool,
}

/// A detached batch, owned by exactly one dispatch
struct Batch<T, R> {
    id: u64,
    items: Vec<WorkItem<T, R>>,
    trigger: DispatchTrigger,
}

struct Responder<R> {
    respond_to: oneshot::Sender<Result<R>>,
    cancel: CancellationToken,
}

impl<T, R> OpenBatch<T, R> {
    /// Hand the accumulated items off and start a fresh batch under a new id.
    ///
    /// The timer is aborted unless it is the caller.
    fn detach(&mut self, trigger: DispatchTrigger) -> Batch<T, R> {
        if let Some(timer) = self.timer.take() {
            if trigger != DispatchTrigger::Timer {
                timer.abort();
            }
        }

        let batch = Batch {
            id: self.id,
            items: std::mem::take(&mut self.items),
            trigger,
        };
        self.id += 1;
        batch
    }
}

impl<R> Responder<R> {
    fn deliver(self, batch_id: u64, result: Result<R>) {
        if self.cancel.is_cancelled() {
            tracing::trace!(batch_id, "submitter cancelled, dropping result");
            return;
        }
        if self.respond_to.send(result).is_err() {
            tracing::trace!(batch_id, "submitter gone, dropping result");
        }
    }
}

impl<T, R> Batcher<T, R>
where
    T: Send + 'static,
    R: Send + 'static,
{
    pub fn new<P>(config: BatcherConfig, processor: P) -> Result<Self>
    where
        P: BatchProcessor<T, R> + 'static,
    {
        Self::with_scope(config, processor, CancellationToken::new())
    }

    /// Like [`Batcher::new`]; the processor receives child tokens of `scope`
    pub fn with_scope<P>(config: BatcherConfig, processor: P, scope: CancellationToken) -> Result<Self>
    where
        P: BatchProcessor<T, R> + 'static,
    {
        config.validate()?;

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                processor: Arc::new(processor),
                open: Mutex::new(OpenBatch {
                    id: 0,
                    items: Vec::new(),
                    timer: None,
                    closed: false,
                }),
                tasks: TaskTracker::new(),
                scope,
                counters: Counters::default(),
            }),
        })
    }

    /// Add `payload` to the open batch and wait for its result.
    ///
    /// Cancelling `cancel` returns [`BatchError::Cancelled`] right away. The
    /// item stays in its batch and is still processed; its result is dropped.
    pub async fn submit(&self, cancel: &CancellationToken, payload: T) -> Result<R> {
        if cancel.is_cancelled() {
            return Err(BatchError::Cancelled);
        }

        let (respond_to, response) = oneshot::channel();
        Inner::enqueue(
            &self.inner,
            WorkItem {
                payload,
                respond_to,
                cancel: cancel.clone(),
            },
        )?;

        tokio::select! {
            biased;
            result = response => result.unwrap_or_else(|_| Err(BatchError::Abandoned)),
            _ = cancel.cancelled() => Err(BatchError::Cancelled),
        }
    }

    /// Dispatch whatever is still open, then wait for every in-flight batch.
    ///
    /// Later submissions fail with [`BatchError::Closed`].
    pub async fn close(&self) {
        {
            let mut open = self.inner.lock_open();
            open.closed = true;
            if open.items.is_empty() {
                if let Some(timer) = open.timer.take() {
                    timer.abort();
                }
            } else {
                let batch = open.detach(DispatchTrigger::Close);
                Inner::dispatch(&self.inner, batch);
            }
        }

        self.inner.tasks.close();
        self.inner.tasks.wait().await;
        tracing::debug!("batcher closed");
    }

    /// Items waiting in the open batch
    pub fn pending(&self) -> usize {
        self.inner.lock_open().items.len()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock_open().closed
    }

    pub fn stats(&self) -> BatcherStats {
        self.inner.counters.snapshot()
    }

    pub fn config(&self) -> &BatcherConfig {
        &self.inner.config
    }

    pub fn scope(&self) -> &CancellationToken {
        &self.inner.scope
    }
}

impl<T, R> Inner<T, R>
where
    T: Send + 'static,
    R: Send + 'static,
{
    fn lock_open(&self) -> MutexGuard<'_, OpenBatch<T, R>> {
        self.open.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn enqueue(inner: &Arc<Self>, item: WorkItem<T, R>) -> Result<()> {
        let mut open = inner.lock_open();
        if open.closed {
            return Err(BatchError::Closed);
        }

        open.items.push(item);
        inner.counters.record_submit();
        if open.items.len() >= inner.config.max_batch_size {
            let batch = open.detach(DispatchTrigger::Size);
            Self::dispatch(inner, batch);
        } else if open.timer.is_none() {
            open.timer = Some(Self::arm_timer(inner, open.id));
        }
        Ok(())
    }

    fn arm_timer(inner: &Arc<Self>, batch_id: u64) -> JoinHandle<()> {
        let inner = Arc::clone(inner);
        let wait = inner.config.max_wait();

        tokio::spawn(async move {
            tokio::time::sleep(wait).await;
            Self::expire(&inner, batch_id);
        })
    }

    /// Timer path: detach only if `batch_id` is still the open, non-empty batch
    fn expire(inner: &Arc<Self>, batch_id: u64) {
        let mut open = inner.lock_open();
        if open.id != batch_id || open.items.is_empty() {
            tracing::trace!(batch_id, "timer fired after batch was dispatched");
            return;
        }

        let batch = open.detach(DispatchTrigger::Timer);
        Self::dispatch(inner, batch);
    }

    /// Spawn the batch on the tracker. Callers hold the open-batch lock, so a
    /// concurrent `close` never waits on a tracker the batch has not joined yet.
    fn dispatch(inner: &Arc<Self>, batch: Batch<T, R>) {
        inner.counters.record_dispatch(batch.trigger);
        tracing::debug!(
            batch_id = batch.id,
            size = batch.items.len(),
            trigger = ?batch.trigger,
            "dispatching batch"
        );

        let task_inner = Arc::clone(inner);
        inner.tasks.spawn(async move {
            task_inner.process(batch).await;
        });
    }

    async fn process(&self, batch: Batch<T, R>) {
        let Batch { id, items, .. } = batch;
        let size = items.len();

        let mut payloads = Vec::with_capacity(size);
        let mut responders = Vec::with_capacity(size);
        for item in items {
            payloads.push(item.payload);
            responders.push(Responder {
                respond_to: item.respond_to,
                cancel: item.cancel,
            });
        }

        let started = Instant::now();
        let outcome = self
            .processor
            .process(self.scope.child_token(), payloads)
            .await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(results) => {
                let returned = results.len();
                let missing = size.saturating_sub(returned);
                if missing > 0 {
                    tracing::warn!(
                        batch_id = id,
                        size,
                        returned,
                        "processor returned fewer results than items"
                    );
                }

                let mut results = results.into_iter();
                for (index, responder) in responders.into_iter().enumerate() {
                    let result = match results.next() {
                        Some(Ok(value)) => Ok(value),
                        Some(Err(error)) => Err(BatchError::Item(error)),
                        None => Err(BatchError::MissingResult { index, returned }),
                    };
                    responder.deliver(id, result);
                }
                self.counters.record_completion(false, missing);
            }
            Err(error) => {
                tracing::warn!(batch_id = id, size, error = %error, "batch processing failed");
                let shared = Arc::new(error);
                for responder in responders {
                    responder.deliver(id, Err(BatchError::Processing(Arc::clone(&shared))));
                }
                self.counters.record_completion(true, 0);
            }
        }

        tracing::debug!(batch_id = id, size, elapsed_ms, "batch complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::BatchResults;
    use async_trait::async_trait;
    use futures::future::join_all;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio_test::{assert_err, assert_ok};

    /// Doubles every item and records each batch it sees
    #[derive(Clone, Default)]
    struct Recorder {
        batches: Arc<Mutex<Vec<Vec<u32>>>>,
        delay: Option<Duration>,
        active: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    impl Recorder {
        fn with_delay(delay: Duration) -> Self {
            Self {
                delay: Some(delay),
                ..Self::default()
            }
        }

        fn batches(&self) -> Vec<Vec<u32>> {
            let mut batches = self.batches.lock().unwrap().clone();
            batches.sort();
            batches
        }
    }

    #[async_trait]
    impl BatchProcessor<u32, u32> for Recorder {
        async fn process(&self, _cancel: CancellationToken, batch: Vec<u32>) -> BatchResults<u32> {
            self.batches.lock().unwrap().push(batch.clone());
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);

            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }

            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(batch.into_iter().map(|n| Ok(n * 2)).collect())
        }
    }

    fn config(max_batch_size: usize, max_wait_ms: u64) -> BatcherConfig {
        BatcherConfig::new()
            .with_max_batch_size(max_batch_size)
            .with_max_wait(Duration::from_millis(max_wait_ms))
    }

    #[tokio::test]
    async fn test_rejects_invalid_config() {
        let result = Batcher::<u32, u32>::new(config(0, 100), Recorder::default());
        assert!(matches!(result, Err(BatchError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_every_submit_gets_its_own_result() {
        let recorder = Recorder::default();
        let batcher = Batcher::<u32, u32>::new(config(4, 20), recorder.clone()).unwrap();
        let token = CancellationToken::new();

        let results = join_all((0..25).map(|n| batcher.submit(&token, n))).await;

        for (n, result) in results.into_iter().enumerate() {
            assert_eq!(result.unwrap(), n as u32 * 2);
        }
        let seen: usize = recorder.batches().iter().map(Vec::len).sum();
        assert_eq!(seen, 25);
        assert_eq!(batcher.stats().items_submitted, 25);
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_batch_dispatches_before_wait() {
        let recorder = Recorder::default();
        let batcher = Batcher::<u32, u32>::new(config(3, 60_000), recorder.clone()).unwrap();
        let token = CancellationToken::new();
        let started = tokio::time::Instant::now();

        let results = join_all((0..3).map(|n| batcher.submit(&token, n))).await;

        assert!(results.iter().all(|r| r.is_ok()));
        assert!(started.elapsed() < Duration::from_secs(60));
        let stats = batcher.stats();
        assert_eq!(stats.size_triggered, 1);
        assert_eq!(stats.time_triggered, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_batch_waits_for_timer() {
        let recorder = Recorder::default();
        let batcher = Batcher::<u32, u32>::new(config(10, 50), recorder.clone()).unwrap();
        let token = CancellationToken::new();
        let started = tokio::time::Instant::now();

        let results = join_all((0..2).map(|n| batcher.submit(&token, n))).await;

        assert!(results.iter().all(|r| r.is_ok()));
        assert!(started.elapsed() >= Duration::from_millis(50));
        assert_eq!(recorder.batches(), vec![vec![0, 1]]);
        assert_eq!(batcher.stats().time_triggered, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_seven_items_split_three_three_one() {
        let recorder = Recorder::default();
        let batcher = Batcher::<u32, u32>::new(config(3, 50), recorder.clone()).unwrap();
        let token = CancellationToken::new();

        let results = join_all((0..7).map(|n| batcher.submit(&token, n))).await;

        let values: Vec<u32> = results.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(values, vec![0, 2, 4, 6, 8, 10, 12]);
        assert_eq!(
            recorder.batches(),
            vec![vec![0, 1, 2], vec![3, 4, 5], vec![6]]
        );

        let stats = batcher.stats();
        assert_eq!(stats.batches_dispatched, 3);
        assert_eq!(stats.size_triggered, 2);
        assert_eq!(stats.time_triggered, 1);
    }

    #[tokio::test]
    async fn test_batch_failure_shared_by_all_items() {
        async fn failing(_cancel: CancellationToken, _batch: Vec<u32>) -> BatchResults<u32> {
            Err(anyhow::anyhow!("backend unavailable"))
        }

        let batcher = Batcher::<u32, u32>::new(config(3, 20), failing).unwrap();
        let token = CancellationToken::new();
        let results = join_all((0..3).map(|n| batcher.submit(&token, n))).await;

        let failures: Vec<Arc<anyhow::Error>> = results
            .into_iter()
            .map(|r| match r {
                Err(BatchError::Processing(e)) => e,
                other => panic!("Expected Processing error, got {:?}", other),
            })
            .collect();
        assert!(Arc::ptr_eq(&failures[0], &failures[1]));
        assert!(Arc::ptr_eq(&failures[1], &failures[2]));
        assert_eq!(failures[0].to_string(), "backend unavailable");
        assert_eq!(batcher.stats().failed_batches, 1);

        // the batcher keeps working after a failed batch
        assert_err!(batcher.submit(&token, 9).await);
        assert_eq!(batcher.stats().batches_dispatched, 2);
    }

    #[tokio::test]
    async fn test_short_results_become_missing() {
        async fn first_only(_cancel: CancellationToken, batch: Vec<u32>) -> BatchResults<u32> {
            Ok(batch.into_iter().take(1).map(Ok).collect())
        }

        let batcher = Batcher::<u32, u32>::new(config(3, 20), first_only).unwrap();
        let token = CancellationToken::new();
        let mut results = join_all((10..13).map(|n| batcher.submit(&token, n))).await;

        assert_eq!(assert_ok!(results.remove(0)), 10);
        assert!(matches!(
            results[0],
            Err(BatchError::MissingResult { index: 1, returned: 1 })
        ));
        assert!(matches!(
            results[1],
            Err(BatchError::MissingResult { index: 2, returned: 1 })
        ));
        assert_eq!(batcher.stats().missing_results, 2);
    }

    #[tokio::test]
    async fn test_extra_results_are_ignored() {
        async fn padded(_cancel: CancellationToken, batch: Vec<u32>) -> BatchResults<u32> {
            let mut results: Vec<anyhow::Result<u32>> = batch.into_iter().map(Ok).collect();
            results.push(Ok(999));
            Ok(results)
        }

        let batcher = Batcher::<u32, u32>::new(config(2, 20), padded).unwrap();
        let token = CancellationToken::new();
        let results = join_all((0..2).map(|n| batcher.submit(&token, n))).await;

        let values: Vec<u32> = results.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(values, vec![0, 1]);
    }

    #[tokio::test]
    async fn test_item_errors_stay_with_their_item() {
        async fn odd_fails(_cancel: CancellationToken, batch: Vec<u32>) -> BatchResults<u32> {
            Ok(batch
                .into_iter()
                .map(|n| {
                    if n % 2 == 1 {
                        Err(anyhow::anyhow!("odd input {}", n))
                    } else {
                        Ok(n)
                    }
                })
                .collect())
        }

        let batcher = Batcher::<u32, u32>::new(config(4, 20), odd_fails).unwrap();
        let token = CancellationToken::new();
        let results = join_all((0..4).map(|n| batcher.submit(&token, n))).await;

        assert_eq!(results[0].as_ref().unwrap(), &0);
        match &results[1] {
            Err(BatchError::Item(e)) => assert_eq!(e.to_string(), "odd input 1"),
            other => panic!("Expected Item error, got {:?}", other),
        }
        assert_eq!(results[2].as_ref().unwrap(), &2);
        assert!(matches!(results[3], Err(BatchError::Item(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_submit_still_processed() {
        let recorder = Recorder::default();
        let batcher = Batcher::<u32, u32>::new(config(10, 60_000), recorder.clone()).unwrap();
        let token = CancellationToken::new();

        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            canceller.cancel();
        });

        let result = batcher.submit(&token, 5).await;
        assert!(matches!(result, Err(BatchError::Cancelled)));
        assert_eq!(batcher.pending(), 1);

        batcher.close().await;
        assert_eq!(recorder.batches(), vec![vec![5]]);
    }

    #[tokio::test]
    async fn test_already_cancelled_token_is_rejected() {
        let batcher = Batcher::<u32, u32>::new(config(2, 20), Recorder::default()).unwrap();
        let token = CancellationToken::new();
        token.cancel();

        assert!(matches!(batcher.submit(&token, 1).await, Err(BatchError::Cancelled)));
        assert_eq!(batcher.pending(), 0);
    }

    #[tokio::test]
    async fn test_close_drains_open_batch() {
        let recorder = Recorder::default();
        let batcher = Batcher::<u32, u32>::new(config(10, 60_000), recorder.clone()).unwrap();

        let handles: Vec<_> = (0..2)
            .map(|n| {
                let batcher = batcher.clone();
                tokio::spawn(async move { batcher.submit(&CancellationToken::new(), n).await })
            })
            .collect();

        while batcher.pending() < 2 {
            tokio::task::yield_now().await;
        }
        batcher.close().await;

        assert_eq!(recorder.batches(), vec![vec![0, 1]]);
        for (n, handle) in handles.into_iter().enumerate() {
            assert_eq!(handle.await.unwrap().unwrap(), n as u32 * 2);
        }
        assert_eq!(batcher.stats().close_triggered, 1);
        assert_eq!(batcher.stats().in_flight, 0);
    }

    #[tokio::test]
    async fn test_submit_after_close_is_rejected() {
        let batcher = Batcher::<u32, u32>::new(config(2, 20), Recorder::default()).unwrap();
        batcher.close().await;

        assert!(batcher.is_closed());
        let result = batcher.submit(&CancellationToken::new(), 1).await;
        assert!(matches!(result, Err(BatchError::Closed)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_batches_run_concurrently() {
        let recorder = Recorder::with_delay(Duration::from_millis(100));
        let batcher = Batcher::<u32, u32>::new(config(2, 10), recorder.clone()).unwrap();
        let token = CancellationToken::new();

        let results = join_all((0..6).map(|n| batcher.submit(&token, n))).await;

        assert!(results.iter().all(|r| r.is_ok()));
        assert_eq!(recorder.peak.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_close_waits_for_in_flight_batches() {
        let recorder = Recorder::with_delay(Duration::from_millis(30));
        let batcher = Batcher::<u32, u32>::new(config(1, 10), recorder.clone()).unwrap();

        let submitter = batcher.clone();
        let handle = tokio::spawn(async move { submitter.submit(&CancellationToken::new(), 4).await });
        while batcher.stats().batches_dispatched == 0 {
            tokio::task::yield_now().await;
        }

        batcher.close().await;
        assert_eq!(batcher.stats().in_flight, 0);
        assert_eq!(handle.await.unwrap().unwrap(), 8);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_close_racing_submitters_waits_for_every_accepted_item() {
        for _ in 0..50 {
            let processed = Arc::new(AtomicUsize::new(0));
            let counter = Arc::clone(&processed);
            let batcher = Batcher::<u32, u32>::new(
                config(1, 5),
                move |_cancel: CancellationToken, batch: Vec<u32>| {
                    let counter = Arc::clone(&counter);
                    async move {
                        tokio::task::yield_now().await;
                        counter.fetch_add(batch.len(), Ordering::SeqCst);
                        let results: BatchResults<u32> = Ok(batch.into_iter().map(Ok).collect());
                        results
                    }
                },
            )
            .unwrap();

            let submitters: Vec<_> = (0..32)
                .map(|n| {
                    let batcher = batcher.clone();
                    tokio::spawn(async move {
                        let token = CancellationToken::new();
                        let mut accepted = 0usize;
                        while let Ok(value) = batcher.submit(&token, n).await {
                            assert_eq!(value, n);
                            accepted += 1;
                        }
                        accepted
                    })
                })
                .collect();

            tokio::time::sleep(Duration::from_micros(300)).await;
            batcher.close().await;
            let processed_at_close = processed.load(Ordering::SeqCst);

            let mut accepted = 0;
            for handle in submitters {
                accepted += handle.await.unwrap();
            }
            assert_eq!(processed_at_close, accepted);
            assert_eq!(batcher.stats().in_flight, 0);
        }
    }
}
