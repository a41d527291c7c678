mod components;
pub mod config;
mod detector;
pub mod geometry;
mod morphology;

use thiserror::Error;

pub use config::{DetectionOptions, StackAnchor};
pub use detector::BoxDetector;
pub use killfeed_types::{BoxDetection, ConfigurationError, LumaFrame, PixelRect, RoiConfig};

#[derive(Debug, Error)]
pub enum DetectionError {
    #[error("region {roi:?} does not fit inside a {frame_width}x{frame_height} frame")]
    RoiOutsideFrame {
        roi: PixelRect,
        frame_width: u32,
        frame_height: u32,
    },
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
}
