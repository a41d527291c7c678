use std::path::PathBuf;
use std::sync::Arc;

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{ColorType, ImageEncoder};
use killfeed_detector::geometry::crop_luma;
use killfeed_types::{BoxDetection, LumaFrame, PixelRect};
use tokio::task;

use crate::cli::DumpFormat;
use crate::output::error::OutputError;
use crate::settings::ImageDumpSettings;

const OUTLINE_COLOR: [u8; 3] = [255, 64, 64];

/// Writes the region of interest of frames with detections, boxes outlined.
#[derive(Debug, Clone)]
pub struct RoiDumper {
    directory: PathBuf,
    format: DumpFormat,
}

impl RoiDumper {
    pub fn new(settings: ImageDumpSettings) -> Self {
        Self {
            directory: settings.dir,
            format: settings.format,
        }
    }

    pub async fn write(
        &self,
        frame: Arc<LumaFrame>,
        roi: PixelRect,
        detections: &[BoxDetection],
        frame_index: u64,
    ) -> Result<PathBuf, OutputError> {
        let outlines = outlines_in_roi(roi, detections);
        let format = self.format;
        let path = self
            .directory
            .join(format!("frame_{frame_index:06}.{}", format.extension()));
        let target = path.clone();
        task::spawn_blocking(move || {
            let encoded = encode_crop(&frame, roi, &outlines, format)?;
            std::fs::write(&target, encoded).map_err(|err| OutputError::io(&target, err))?;
            Ok::<(), OutputError>(())
        })
        .await
        .map_err(|err| OutputError::Worker(err.to_string()))??;
        Ok(path)
    }
}

/// Inclusive pixel bounds relative to the crop.
#[derive(Clone, Copy, Debug, PartialEq)]
struct Rect {
    x0: usize,
    y0: usize,
    x1: usize,
    y1: usize,
}

fn outlines_in_roi(roi: PixelRect, detections: &[BoxDetection]) -> Vec<Rect> {
    detections
        .iter()
        .filter(|detection| !detection.bbox.is_empty() && roi.contains(&detection.bbox))
        .map(|detection| {
            let bbox = detection.bbox;
            let x0 = (bbox.x - roi.x) as usize;
            let y0 = (bbox.y - roi.y) as usize;
            Rect {
                x0,
                y0,
                x1: x0 + bbox.width as usize - 1,
                y1: y0 + bbox.height as usize - 1,
            }
        })
        .collect()
}

fn render_crop(frame: &LumaFrame, roi: PixelRect, outlines: &[Rect]) -> Vec<u8> {
    let luma = crop_luma(frame, roi);
    let mut rgb = Vec::with_capacity(luma.len() * 3);
    for &value in &luma {
        rgb.extend_from_slice(&[value, value, value]);
    }
    draw_outlines(&mut rgb, roi.width as usize, roi.height as usize, outlines);
    rgb
}

fn encode_crop(
    frame: &LumaFrame,
    roi: PixelRect,
    outlines: &[Rect],
    format: DumpFormat,
) -> Result<Vec<u8>, OutputError> {
    let rgb = render_crop(frame, roi, outlines);
    let mut encoded = Vec::new();
    match format {
        DumpFormat::Png => {
            PngEncoder::new(&mut encoded).write_image(
                &rgb,
                roi.width,
                roi.height,
                ColorType::Rgb8,
            )?;
        }
        DumpFormat::Jpeg => {
            JpegEncoder::new_with_quality(&mut encoded, 90).encode(
                &rgb,
                roi.width,
                roi.height,
                ColorType::Rgb8,
            )?;
        }
    }
    Ok(encoded)
}

fn draw_outlines(rgb: &mut [u8], width: usize, height: usize, outlines: &[Rect]) {
    for rect in outlines {
        for offset in 0..outline_thickness(rect) {
            let x0 = rect.x0 + offset;
            let y0 = rect.y0 + offset;
            if x0 > rect.x1.saturating_sub(offset) || y0 > rect.y1.saturating_sub(offset) {
                break;
            }
            let x1 = rect.x1 - offset;
            let y1 = rect.y1 - offset;
            for x in x0..=x1 {
                tint_pixel(rgb, width, height, x, y0);
                tint_pixel(rgb, width, height, x, y1);
            }
            for y in y0..=y1 {
                tint_pixel(rgb, width, height, x0, y);
                tint_pixel(rgb, width, height, x1, y);
            }
        }
    }
}

fn tint_pixel(rgb: &mut [u8], width: usize, height: usize, x: usize, y: usize) {
    if x >= width || y >= height {
        return;
    }
    let idx = (y * width + x) * 3;
    rgb[idx..idx + 3].copy_from_slice(&OUTLINE_COLOR);
}

fn outline_thickness(rect: &Rect) -> usize {
    let span = (rect.x1 - rect.x0).min(rect.y1 - rect.y0);
    if span >= 4 { 2 } else { 1 }
}
