//! Shared domain models for the killfeed-scan workspace.
//!
//! This crate holds the lightweight values passed between the decoder,
//! detector, indexer and CLI crates. Keep it free of heavy dependencies so
//! every crate in the workspace can depend on it.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

mod clip;
mod event;

pub use clip::{ClipWindow, TagSummary};
pub use event::{BoxDetection, Event, EventTag};

pub type FrameResult<T> = Result<T, FrameError>;

/// A single decoded frame reduced to its luma plane.
#[derive(Clone)]
pub struct LumaFrame {
    width: u32,
    height: u32,
    stride: usize,
    frame_index: Option<u64>,
    timestamp: Option<Duration>,
    data: Arc<[u8]>,
}

impl fmt::Debug for LumaFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LumaFrame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("stride", &self.stride)
            .field("timestamp", &self.timestamp)
            .field("bytes", &self.data.len())
            .field("frame_index", &self.frame_index)
            .finish()
    }
}

impl LumaFrame {
    pub fn from_owned(
        width: u32,
        height: u32,
        stride: usize,
        timestamp: Option<Duration>,
        data: Vec<u8>,
    ) -> FrameResult<Self> {
        if stride < width as usize {
            return Err(FrameError::InvalidFrame {
                reason: format!("stride {stride} is smaller than width {width}"),
            });
        }
        let required =
            stride
                .checked_mul(height as usize)
                .ok_or_else(|| FrameError::InvalidFrame {
                    reason: "calculated luma plane length overflowed".into(),
                })?;
        if data.len() < required {
            return Err(FrameError::InvalidFrame {
                reason: format!(
                    "insufficient luma bytes: got {} expected at least {}",
                    data.len(),
                    required
                ),
            });
        }
        Ok(Self {
            width,
            height,
            stride,
            timestamp,
            data: Arc::from(data.into_boxed_slice()),
            frame_index: None,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn timestamp(&self) -> Option<Duration> {
        self.timestamp
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Visible pixels of row `y`, without stride padding.
    pub fn row(&self, y: u32) -> &[u8] {
        let start = y as usize * self.stride;
        &self.data[start..start + self.width as usize]
    }

    pub fn frame_index(&self) -> Option<u64> {
        self.frame_index
    }

    pub fn with_frame_index(mut self, index: Option<u64>) -> Self {
        self.frame_index = index;
        self
    }

    pub fn set_frame_index(&mut self, index: Option<u64>) {
        self.frame_index = index;
    }
}

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("backend {backend} is not supported in this build")]
    Unsupported { backend: &'static str },

    #[error("{backend} backend failed: {message}")]
    BackendFailure {
        backend: &'static str,
        message: String,
    },

    #[error("configuration error: {message}")]
    Configuration { message: String },

    #[error("invalid frame: {reason}")]
    InvalidFrame { reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FrameError {
    pub fn unsupported(backend: &'static str) -> Self {
        Self::Unsupported { backend }
    }

    pub fn backend_failure(backend: &'static str, message: impl Into<String>) -> Self {
        Self::BackendFailure {
            backend,
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }
}

/// Invalid run parameters. Raised before any frame is processed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigurationError {
    #[error("{field} must lie within [0, 1], got {value}")]
    OutOfRange { field: &'static str, value: f64 },

    #[error("{field} must be greater than zero, got {value}")]
    NonPositive { field: &'static str, value: f64 },

    #[error("region of interest resolves to an empty {width}x{height} pixel rectangle")]
    DegenerateRoi { width: u32, height: u32 },

    #[error("{message}")]
    Invalid { message: String },
}

impl ConfigurationError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }
}

/// Region of interest expressed as fractions of the frame size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RoiConfig {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Default for RoiConfig {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.65,
            width: 0.35,
            height: 0.25,
        }
    }
}

impl RoiConfig {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let fields = [
            ("roi_x_percent", self.x),
            ("roi_y_percent", self.y),
            ("roi_width_percent", self.width),
            ("roi_height_percent", self.height),
        ];
        for (field, value) in fields {
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                return Err(ConfigurationError::OutOfRange { field, value });
            }
        }
        if self.width <= 0.0 {
            return Err(ConfigurationError::NonPositive {
                field: "roi_width_percent",
                value: self.width,
            });
        }
        if self.height <= 0.0 {
            return Err(ConfigurationError::NonPositive {
                field: "roi_height_percent",
                value: self.height,
            });
        }
        Ok(())
    }
}

/// Axis-aligned rectangle in absolute pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn contains(&self, other: &PixelRect) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_accessors_report_geometry() {
        let frame = LumaFrame::from_owned(
            4,
            2,
            6,
            Some(Duration::from_millis(10)),
            (0u8..12).collect(),
        )
        .unwrap()
        .with_frame_index(Some(7));
        assert_eq!(frame.width(), 4);
        assert_eq!(frame.height(), 2);
        assert_eq!(frame.stride(), 6);
        assert_eq!(frame.timestamp(), Some(Duration::from_millis(10)));
        assert_eq!(frame.frame_index(), Some(7));
        assert_eq!(frame.row(1), &[6, 7, 8, 9]);
    }

    #[test]
    fn frame_rejects_short_buffers() {
        let err = LumaFrame::from_owned(4, 4, 4, None, vec![0; 15]).unwrap_err();
        assert!(matches!(err, FrameError::InvalidFrame { .. }));
    }

    #[test]
    fn frame_rejects_stride_below_width() {
        let err = LumaFrame::from_owned(8, 1, 4, None, vec![0; 8]).unwrap_err();
        assert!(matches!(err, FrameError::InvalidFrame { .. }));
    }

    #[test]
    fn default_roi_is_valid() {
        RoiConfig::default().validate().unwrap();
    }

    #[test]
    fn roi_outside_unit_interval_is_rejected() {
        let err = RoiConfig::new(0.0, 1.2, 0.3, 0.2).validate().unwrap_err();
        assert_eq!(
            err,
            ConfigurationError::OutOfRange {
                field: "roi_y_percent",
                value: 1.2
            }
        );
        assert!(RoiConfig::new(f64::NAN, 0.0, 0.3, 0.2).validate().is_err());
    }

    #[test]
    fn roi_with_zero_extent_is_rejected() {
        let err = RoiConfig::new(0.1, 0.1, 0.0, 0.2).validate().unwrap_err();
        assert!(matches!(
            err,
            ConfigurationError::NonPositive {
                field: "roi_width_percent",
                ..
            }
        ));
    }

    #[test]
    fn pixel_rect_containment() {
        let outer = PixelRect::new(10, 10, 100, 50);
        assert!(outer.contains(&PixelRect::new(10, 10, 100, 50)));
        assert!(outer.contains(&PixelRect::new(20, 30, 5, 5)));
        assert!(!outer.contains(&PixelRect::new(105, 30, 10, 5)));
        assert_eq!(outer.area(), 5000);
    }
}
