//! Prelude module for convenient imports
//!
//! ```rust
//! use batchstream::prelude::*;
//! ```

pub use crate::{
    batch_map, AutoBatcher, BatchError, BatchProcessor, BatchResults, Batcher, BatcherConfig,
    CancellationToken, Collector, Listener, Stream, StreamBuffer, StreamConfig, StreamError,
    StreamWriter, Streamify, TokenStream,
};
