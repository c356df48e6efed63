//! Request batching.
//!
//! A [`Batcher`] collects items submitted concurrently by many callers and
//! hands them to a [`BatchProcessor`] in bulk, either when the open batch is
//! full or when its wait time runs out. Each caller is woken with the result
//! belonging to its own item.

pub mod auto;
pub mod batcher;
pub mod config;
pub mod error;
pub mod processor;
pub mod stage;
pub mod stats;

pub use auto::AutoBatcher;
pub use batcher::Batcher;
pub use config::{BatcherConfig, DEFAULT_MAX_BATCH_SIZE, DEFAULT_MAX_WAIT_MS};
pub use error::{BatchError, Result};
pub use processor::{BatchProcessor, BatchResults, ItemProcessor};
pub use stage::batch_map;
pub use stats::{BatcherStats, DispatchTrigger};
