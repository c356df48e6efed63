//! # Batchstream
//!
//! Request batching and cancellation-aware stream pipelines on Tokio.
//!
//! ## Overview
//!
//! - **Batch** many concurrent requests into bulk calls with [`Batcher`],
//!   dispatching on size or after a maximum wait
//! - **Toggle** batching at runtime with [`AutoBatcher`]
//! - **Compose** bounded pipelines with [`Stream`]: `filter`, `map`, `buffer`,
//!   `merge`, `tee`, `aggregate`
//! - **Adapt** batch-returning functions, callbacks and token streams with
//!   [`Streamify`], [`Listener`], [`Collector`] and [`TokenStream`]
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use batchstream::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let batcher = Batcher::new(
//!         BatcherConfig::new().with_max_batch_size(3),
//!         |_cancel: CancellationToken, prompts: Vec<String>| async move {
//!             let lengths: BatchResults<usize> =
//!                 Ok(prompts.into_iter().map(|p| Ok(p.len())).collect());
//!             lengths
//!         },
//!     )?;
//!
//!     let scope = CancellationToken::new();
//!     let lengths = batch_map(
//!         Stream::from_iter(&scope, 8, vec!["a".to_string(), "bb".to_string()]),
//!         batcher.clone(),
//!         4,
//!     )
//!     .aggregate()
//!     .await?;
//!
//!     println!("{:?}", lengths);
//!     batcher.close().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - **`batchstream-stream`**: the stream primitive, its operators and adapters
//! - **`batchstream-batch`**: the batcher, its processors and the `batch_map` stage
//! - **`batchstream`**: re-exports plus layered [`Settings`]

pub mod prelude;
pub mod settings;

pub use settings::{LoggingConfig, Settings};

pub use batchstream_stream::{
    BoxedStream, CancellationToken, Collector, Listener, Stream, StreamBuffer, StreamConfig,
    StreamError, StreamWriter, Streamify, StreamifyChunked, TokenStream, DEFAULT_STREAM_CAPACITY,
};

pub use batchstream_batch::{
    batch_map, AutoBatcher, BatchError, BatchProcessor, BatchResults, Batcher, BatcherConfig,
    BatcherStats, DispatchTrigger, ItemProcessor, DEFAULT_MAX_BATCH_SIZE, DEFAULT_MAX_WAIT_MS,
};
