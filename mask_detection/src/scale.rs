//! Mapping between display resolution and inference resolution.
//!
//! The detector runs on a downscaled copy whose longer side is at most the
//! inference size; boxes it returns are mapped back to the original frame before
//! drawing. Scale factors are derived from the integer target dimensions, so the
//! round trip stays within one pixel.

use crate::detection::{BoundingBox, Detection, DetectionBatch};
use crate::frame::Frame;
use image::imageops::{self, FilterType};

/// Per-axis factor from original to inference resolution. Never above 1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scale {
    pub x: f32,
    pub y: f32,
    pub width: u32,
    pub height: u32,
}

impl Scale {
    pub fn identity(original: (u32, u32)) -> Self {
        Self {
            x: 1.0,
            y: 1.0,
            width: original.0,
            height: original.1,
        }
    }

    pub fn is_identity(&self) -> bool {
        self.x == 1.0 && self.y == 1.0
    }
}

/// Computes the scale that fits `original` into `inference_size` on its longer
/// side, preserving aspect ratio. Frames already small enough are left alone.
pub fn scale_factor(original: (u32, u32), inference_size: u32) -> Scale {
    let (width, height) = original;
    let longest = width.max(height);
    if longest == 0 || inference_size == 0 || longest <= inference_size {
        return Scale::identity(original);
    }

    let ratio = inference_size as f32 / longest as f32;
    let target_width = ((width as f32 * ratio) as u32).max(1);
    let target_height = ((height as f32 * ratio) as u32).max(1);

    Scale {
        x: target_width as f32 / width as f32,
        y: target_height as f32 / height as f32,
        width: target_width,
        height: target_height,
    }
}

pub fn downscale(frame: &Frame, scale: &Scale) -> Frame {
    if scale.is_identity() {
        return frame.clone();
    }
    let resized = imageops::resize(
        frame.image(),
        scale.width,
        scale.height,
        FilterType::Triangle,
    );
    Frame::new(resized)
}

/// Maps a box computed at inference resolution back to the original frame.
pub fn rescale_box(bbox: &BoundingBox, scale: &Scale) -> BoundingBox {
    BoundingBox {
        x1: bbox.x1 / scale.x,
        y1: bbox.y1 / scale.y,
        x2: bbox.x2 / scale.x,
        y2: bbox.y2 / scale.y,
    }
}

pub fn rescale_batch(batch: &DetectionBatch, scale: &Scale) -> DetectionBatch {
    batch
        .iter()
        .map(|detection| Detection {
            class_name: detection.class_name.clone(),
            confidence: detection.confidence,
            bbox: rescale_box(&detection.bbox, scale),
        })
        .collect()
}
