use std::cmp::Ordering;

use killfeed_types::{BoxDetection, ConfigurationError, LumaFrame, PixelRect};

use crate::DetectionError;
use crate::components::{Component, connected_components};
use crate::config::{DetectionOptions, StackAnchor};
use crate::geometry;
use crate::morphology;

const FOREGROUND: u8 = u8::MAX;

/// Finds bright rectangular entries inside the region of interest of a frame.
#[derive(Debug, Clone)]
pub struct BoxDetector {
    options: DetectionOptions,
}

impl BoxDetector {
    pub fn new(options: DetectionOptions) -> Result<Self, ConfigurationError> {
        options.validate()?;
        tracing::debug!(
            threshold = options.brightness_threshold,
            min_area = options.min_area,
            max_area = options.max_area,
            kernel = ?options.morphology_kernel,
            anchor = %options.anchor,
            "box detector configured"
        );
        Ok(Self { options })
    }

    pub fn options(&self) -> &DetectionOptions {
        &self.options
    }

    pub fn resolve_roi(
        &self,
        frame_width: u32,
        frame_height: u32,
    ) -> Result<PixelRect, ConfigurationError> {
        geometry::resolve(frame_width, frame_height, &self.options.roi)
    }

    /// Resolves the configured region for this frame's size, then detects within it.
    pub fn detect(
        &self,
        frame: &LumaFrame,
        frame_index: u64,
        timestamp_seconds: f64,
    ) -> Result<Vec<BoxDetection>, DetectionError> {
        let roi = self.resolve_roi(frame.width(), frame.height())?;
        self.detect_in(frame, roi, frame_index, timestamp_seconds)
    }

    /// Detects boxes inside an already resolved `roi`. Output is ordered by
    /// stack slot and carries frame coordinates.
    pub fn detect_in(
        &self,
        frame: &LumaFrame,
        roi: PixelRect,
        frame_index: u64,
        timestamp_seconds: f64,
    ) -> Result<Vec<BoxDetection>, DetectionError> {
        if roi.is_empty() || !geometry::fits_frame(&roi, frame.width(), frame.height()) {
            return Err(DetectionError::RoiOutsideFrame {
                roi,
                frame_width: frame.width(),
                frame_height: frame.height(),
            });
        }

        let width = roi.width as usize;
        let height = roi.height as usize;
        let luma = geometry::crop_luma(frame, roi);
        let threshold = self.options.brightness_threshold;
        let mut mask: Vec<u8> = luma
            .iter()
            .map(|&value| if value > threshold { FOREGROUND } else { 0 })
            .collect();

        if let Some(kernel) = self.options.morphology_kernel {
            morphology::close_then_open(&mut mask, width, height, kernel);
        }

        let mut candidates: Vec<(PixelRect, u64, f64)> =
            connected_components(&mask, &luma, width, height)
                .into_iter()
                .filter_map(|component| self.accept(&component, roi))
                .collect();

        let anchor = self.options.anchor;
        candidates.sort_by(|a, b| slot_order(anchor, roi, &a.0, &b.0));

        Ok(candidates
            .into_iter()
            .enumerate()
            .map(|(slot, (bbox, area, confidence))| BoxDetection {
                frame_index,
                timestamp_seconds,
                bbox,
                area,
                stack_slot: slot as u32,
                confidence,
            })
            .collect())
    }

    fn accept(&self, component: &Component, roi: PixelRect) -> Option<(PixelRect, u64, f64)> {
        let bbox = PixelRect::new(
            roi.x + component.x as u32,
            roi.y + component.y as u32,
            component.width as u32,
            component.height as u32,
        );
        let area = bbox.area();
        if area < self.options.min_area || area > self.options.max_area {
            return None;
        }

        let aspect = f64::from(bbox.width) / f64::from(bbox.height);
        if let Some(min) = self.options.aspect_ratio_min
            && aspect < min
        {
            return None;
        }
        if let Some(max) = self.options.aspect_ratio_max
            && aspect > max
        {
            return None;
        }

        Some((bbox, area, self.confidence(component.mean_luma())))
    }

    /// Mean brightness excess over the threshold, scaled to the available headroom.
    fn confidence(&self, mean_luma: f64) -> f64 {
        let threshold = f64::from(self.options.brightness_threshold);
        let headroom = (f64::from(u8::MAX) - threshold).max(1.0);
        ((mean_luma - threshold) / headroom).clamp(0.0, 1.0)
    }
}

fn anchor_distance(anchor: StackAnchor, roi: PixelRect, bbox: &PixelRect) -> u32 {
    match anchor {
        StackAnchor::Right => roi.right() - bbox.right(),
        StackAnchor::Left => bbox.x - roi.x,
    }
}

fn slot_order(anchor: StackAnchor, roi: PixelRect, a: &PixelRect, b: &PixelRect) -> Ordering {
    anchor_distance(anchor, roi, a)
        .cmp(&anchor_distance(anchor, roi, b))
        .then(a.y.cmp(&b.y))
        .then(a.x.cmp(&b.x))
}
