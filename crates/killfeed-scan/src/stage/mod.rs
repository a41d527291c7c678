use std::pin::Pin;

pub mod detection;
pub mod progress;
pub mod sampler;

use futures_util::Stream;

/// A stage's output stream together with the source's expected frame count.
pub struct StreamBundle<T> {
    pub stream: Pin<Box<dyn Stream<Item = T> + Send>>,
    pub total_frames: Option<u64>,
}

impl<T> StreamBundle<T> {
    pub fn new(stream: Pin<Box<dyn Stream<Item = T> + Send>>, total_frames: Option<u64>) -> Self {
        Self {
            stream,
            total_frames,
        }
    }
}
