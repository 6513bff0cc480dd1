mod stream;
mod streams;

pub use stream::{QueuedStream, StreamLifecycle, StreamLinks};
pub use streams::QueuedStreams;
