//! Cancellation-aware, single-writer/single-reader streams.
//!
//! A [`Stream`] is fed by exactly one [`StreamWriter`] and read by exactly one
//! consumer. Stages (`filter`, `map`, `buffer`, `merge`, `tee`) each run on
//! their own task and share the cancellation scope of their input, so firing
//! the scope anywhere in a pipeline unblocks every stage promptly.

pub mod channel;
pub mod config;
pub mod error;
pub mod stream;
mod operators;
pub mod adapters;

pub use config::{StreamConfig, DEFAULT_STREAM_CAPACITY};
pub use error::{Result, StreamError};
pub use stream::{BoxedStream, Stream, StreamWriter};
pub use adapters::{Collector, Listener, StreamBuffer, Streamify, StreamifyChunked, TokenStream};

pub use tokio_util::sync::CancellationToken;
