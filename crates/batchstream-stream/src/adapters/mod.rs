mod streamify;
mod stream_buffer;
mod collector;
mod listener;
mod token_stream;

pub use streamify::{Streamify, StreamifyChunked};
pub use stream_buffer::StreamBuffer;
pub use collector::Collector;
pub use listener::Listener;
pub use token_stream::TokenStream;
