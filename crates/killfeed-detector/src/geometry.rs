use killfeed_types::{ConfigurationError, LumaFrame, PixelRect, RoiConfig};

// Absorbs float noise such as 0.9 * 360 = 324.00000000000006.
const EDGE_EPSILON: f64 = 1e-6;

/// Resolves fractional ROI coordinates into a pixel rectangle clamped to the frame.
///
/// The start edge is floored and the end edge ceiled, so the rectangle always
/// covers the requested area.
pub fn resolve(
    frame_width: u32,
    frame_height: u32,
    roi: &RoiConfig,
) -> Result<PixelRect, ConfigurationError> {
    roi.validate()?;

    let (x, width) = resolve_axis(roi.x, roi.width, frame_width);
    let (y, height) = resolve_axis(roi.y, roi.height, frame_height);
    if width == 0 || height == 0 {
        return Err(ConfigurationError::DegenerateRoi { width, height });
    }
    Ok(PixelRect::new(x, y, width, height))
}

fn resolve_axis(offset: f64, extent: f64, size: u32) -> (u32, u32) {
    let size_f = f64::from(size);
    let start = (offset * size_f + EDGE_EPSILON).floor().clamp(0.0, size_f);
    let end = ((offset + extent) * size_f - EDGE_EPSILON)
        .ceil()
        .clamp(start, size_f);
    (start as u32, (end - start) as u32)
}

/// Copies the luma samples under `rect` into a tightly packed buffer.
/// `rect` must lie inside the frame.
pub fn crop_luma(frame: &LumaFrame, rect: PixelRect) -> Vec<u8> {
    let x0 = rect.x as usize;
    let x1 = rect.right() as usize;
    let mut out = Vec::with_capacity(rect.area() as usize);
    for row in rect.y..rect.bottom() {
        out.extend_from_slice(&frame.row(row)[x0..x1]);
    }
    out
}

pub fn fits_frame(rect: &PixelRect, frame_width: u32, frame_height: u32) -> bool {
    PixelRect::new(0, 0, frame_width, frame_height).contains(rect)
}
