use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// What detached a batch from the open slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchTrigger {
    Size,
    Timer,
    Close,
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    items_submitted: AtomicU64,
    batches_dispatched: AtomicU64,
    size_triggered: AtomicU64,
    time_triggered: AtomicU64,
    close_triggered: AtomicU64,
    failed_batches: AtomicU64,
    missing_results: AtomicU64,
    in_flight: AtomicU64,
}

impl Counters {
    pub(crate) fn record_submit(&self) {
        self.items_submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dispatch(&self, trigger: DispatchTrigger) {
        self.batches_dispatched.fetch_add(1, Ordering::Relaxed);
        self.in_flight.fetch_add(1, Ordering::Relaxed);
        let counter = match trigger {
            DispatchTrigger::Size => &self.size_triggered,
            DispatchTrigger::Timer => &self.time_triggered,
            DispatchTrigger::Close => &self.close_triggered,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_completion(&self, failed: bool, missing: usize) {
        self.in_flight.fetch_sub(1, Ordering::Relaxed);
        if failed {
            self.failed_batches.fetch_add(1, Ordering::Relaxed);
        }
        self.missing_results
            .fetch_add(missing as u64, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> BatcherStats {
        let total_items = self.items_submitted.load(Ordering::Relaxed);
        let total_batches = self.batches_dispatched.load(Ordering::Relaxed);

        BatcherStats {
            items_submitted: total_items,
            batches_dispatched: total_batches,
            size_triggered: self.size_triggered.load(Ordering::Relaxed),
            time_triggered: self.time_triggered.load(Ordering::Relaxed),
            close_triggered: self.close_triggered.load(Ordering::Relaxed),
            failed_batches: self.failed_batches.load(Ordering::Relaxed),
            missing_results: self.missing_results.load(Ordering::Relaxed),
            in_flight: self.in_flight.load(Ordering::Relaxed),
        }
    }
}

/// Statistics for a batcher
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatcherStats {
    pub items_submitted: u64,
    pub batches_dispatched: u64,
    pub size_triggered: u64,
    pub time_triggered: u64,
    pub close_triggered: u64,
    pub failed_batches: u64,
    pub missing_results: u64,
    pub in_flight: u64,
}

impl BatcherStats {
    pub fn avg_items_per_batch(&self) -> f64 {
        if self.batches_dispatched > 0 {
            self.items_submitted as f64 / self.batches_dispatched as f64
        } else {
            0.0
        }
    }
}
