use crate::config::AnnotatorConfig;
use crate::detection::{Detection, DetectionBatch};
use crate::frame::Frame;
use crate::labels::LabelTable;
use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::{
    drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size},
    rect::Rect,
};
use std::path::PathBuf;
use thiserror::Error;

const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
// Gap between the label background and the top edge of the box.
const LABEL_GAP: i32 = 2;

#[derive(Error, Debug)]
pub enum AnnotateError {
    #[error("Failed to read font {path}: {source}")]
    FontRead {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid font file {0}")]
    InvalidFont(PathBuf),
    #[error("Failed to load label table {path}: {source}")]
    Labels {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Draws boxes and `<short name> <percent>%` labels onto a copy of a frame.
#[derive(Clone)]
pub struct Annotator {
    labels: LabelTable,
    font: Option<FontArc>,
    text_scale: f32,
    box_thickness: u32,
    label_padding: u32,
}

impl Annotator {
    pub fn new(labels: LabelTable) -> Self {
        Self {
            labels,
            font: None,
            text_scale: 12.0,
            box_thickness: 2,
            label_padding: 4,
        }
    }

    pub fn from_config(config: &AnnotatorConfig) -> Result<Self, AnnotateError> {
        let labels = match &config.labels_path {
            Some(path) => LabelTable::from_file(path).map_err(|source| AnnotateError::Labels {
                path: path.clone(),
                source,
            })?,
            None => LabelTable::default(),
        };

        let font = match &config.font_path {
            Some(path) => {
                let bytes = std::fs::read(path).map_err(|source| AnnotateError::FontRead {
                    path: path.clone(),
                    source,
                })?;
                let font = FontArc::try_from_vec(bytes)
                    .map_err(|_| AnnotateError::InvalidFont(path.clone()))?;
                Some(font)
            }
            None => {
                tracing::warn!("No font configured, labels are drawn without text");
                None
            }
        };

        Ok(Self {
            labels,
            font,
            text_scale: config.text_scale,
            box_thickness: config.box_thickness.max(1),
            label_padding: config.label_padding,
        })
    }

    /// Returns an annotated copy. `frame` and `batch` are left untouched.
    pub fn annotate(&self, frame: &Frame, batch: &DetectionBatch) -> Frame {
        let mut canvas = frame.image().clone();
        for detection in batch {
            self.draw_detection(&mut canvas, detection);
        }
        Frame::new(canvas)
    }

    pub fn label_text(&self, detection: &Detection) -> String {
        // `{:.0}` rounds ties to even: 12.5 prints as 12.
        format!(
            "{} {:.0}%",
            self.labels.short_name(&detection.class_name),
            detection.confidence * 100.0
        )
    }

    fn draw_detection(&self, canvas: &mut RgbImage, detection: &Detection) {
        let (width, height) = canvas.dimensions();
        let Some((x1, y1, x2, y2)) = clamp_box(detection, width, height) else {
            tracing::debug!(
                "Skipping degenerate box for {}: {:?}",
                detection.class_name,
                detection.bbox
            );
            return;
        };

        let color = self.labels.color(&detection.class_name);
        for inset in 0..self.box_thickness as i32 {
            let w = x2 - x1 + 1 - 2 * inset;
            let h = y2 - y1 + 1 - 2 * inset;
            if w <= 0 || h <= 0 {
                break;
            }
            let rect = Rect::at(x1 + inset, y1 + inset).of_size(w as u32, h as u32);
            draw_hollow_rect_mut(canvas, rect, color);
        }

        let label = self.label_text(detection);
        let (text_width, text_height) = self.measure(&label);
        let background_width = (text_width + self.label_padding).clamp(1, width);
        let background_height = (text_height + self.label_padding + 2).clamp(1, height);

        let (left, top) = label_origin(
            x1,
            y1,
            (background_width, background_height),
            (width, height),
        );
        draw_filled_rect_mut(
            canvas,
            Rect::at(left, top).of_size(background_width, background_height),
            color,
        );

        if let Some(font) = &self.font {
            let inset = (self.label_padding / 2) as i32;
            draw_text_mut(
                canvas,
                TEXT_COLOR,
                left + inset,
                top + inset,
                PxScale::from(self.text_scale),
                font,
                &label,
            );
        }
    }

    fn measure(&self, text: &str) -> (u32, u32) {
        match &self.font {
            Some(font) => text_size(PxScale::from(self.text_scale), font, text),
            None => {
                let glyph_width = (self.text_scale * 0.55).ceil() as u32;
                (
                    glyph_width * text.chars().count() as u32,
                    self.text_scale.ceil() as u32,
                )
            }
        }
    }
}

impl Default for Annotator {
    fn default() -> Self {
        Self::new(LabelTable::default())
    }
}

/// Integer pixel corners clamped to the canvas, or `None` when nothing is left.
fn clamp_box(detection: &Detection, width: u32, height: u32) -> Option<(i32, i32, i32, i32)> {
    if width == 0 || height == 0 {
        return None;
    }
    let max_x = width as f32 - 1.0;
    let max_y = height as f32 - 1.0;
    let bbox = &detection.bbox;

    let x1 = bbox.x1.round().clamp(0.0, max_x) as i32;
    let y1 = bbox.y1.round().clamp(0.0, max_y) as i32;
    let x2 = bbox.x2.round().clamp(0.0, max_x) as i32;
    let y2 = bbox.y2.round().clamp(0.0, max_y) as i32;

    if x2 <= x1 || y2 <= y1 {
        return None;
    }
    Some((x1, y1, x2, y2))
}

/// Places the label background right above the box, pinned inside the canvas.
fn label_origin(x1: i32, y1: i32, size: (u32, u32), canvas: (u32, u32)) -> (i32, i32) {
    let max_left = (canvas.0 - size.0) as i32;
    let max_top = (canvas.1 - size.1) as i32;

    let left = x1.clamp(0, max_left);
    let top = (y1 - LABEL_GAP - size.1 as i32).clamp(0, max_top);
    (left, top)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::BoundingBox;
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};
    use std::path::Path;

    fn blank_frame(width: u32, height: u32) -> Frame {
        Frame::new(RgbImage::from_pixel(width, height, Rgb([0, 0, 0])))
    }

    fn content_hash(frame: &Frame) -> u64 {
        let mut hasher = DefaultHasher::new();
        frame.image().as_raw().hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn test_annotate_does_not_mutate_input() {
        let frame = blank_frame(120, 90);
        let before = content_hash(&frame);
        let batch = vec![Detection::new(
            "without_mask",
            0.77,
            BoundingBox::new(10.0, 30.0, 60.0, 80.0),
        )];

        let annotated = Annotator::default().annotate(&frame, &batch);

        assert_eq!(content_hash(&frame), before);
        assert_ne!(content_hash(&annotated), before);
        assert_eq!(batch[0].bbox, BoundingBox::new(10.0, 30.0, 60.0, 80.0));
        assert_eq!(batch[0].confidence, 0.77);
    }

    #[test]
    fn test_box_uses_class_color() {
        let frame = blank_frame(100, 100);
        let batch = vec![Detection::new(
            "with_mask",
            0.92,
            BoundingBox::new(20.0, 40.0, 80.0, 90.0),
        )];

        let annotated = Annotator::default().annotate(&frame, &batch);
        let image = annotated.image();

        assert_eq!(*image.get_pixel(20, 65), Rgb([0, 180, 0]));
        assert_eq!(*image.get_pixel(21, 65), Rgb([0, 180, 0]));
        assert_eq!(*image.get_pixel(80, 65), Rgb([0, 180, 0]));
        assert_eq!(*image.get_pixel(50, 65), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_unknown_class_uses_default_color() {
        let frame = blank_frame(100, 100);
        let batch = vec![Detection::new(
            "helmet",
            0.5,
            BoundingBox::new(20.0, 40.0, 80.0, 90.0),
        )];

        let annotated = Annotator::default().annotate(&frame, &batch);

        assert_eq!(
            *annotated.image().get_pixel(20, 65),
            crate::labels::DEFAULT_COLOR
        );
    }

    #[test]
    fn test_empty_batch_leaves_frame_identical() {
        let frame = Frame::new(RgbImage::from_fn(64, 48, |x, y| {
            Rgb([x as u8, y as u8, (x + y) as u8])
        }));

        let annotated = Annotator::default().annotate(&frame, &vec![]);

        assert_eq!(annotated, frame);
    }

    #[test]
    fn test_label_sits_above_box() {
        let frame = blank_frame(200, 200);
        let batch = vec![Detection::new(
            "with_mask",
            0.92,
            BoundingBox::new(50.0, 100.0, 150.0, 180.0),
        )];

        let annotated = Annotator::default().annotate(&frame, &batch);
        let image = annotated.image();

        // 18px background ends two rows above the box's top edge
        assert_eq!(*image.get_pixel(52, 90), Rgb([0, 180, 0]));
        assert_eq!(*image.get_pixel(52, 99), Rgb([0, 0, 0]));
        assert_eq!(*image.get_pixel(52, 75), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_label_is_pinned_inside_frame_near_top_edge() {
        let frame = blank_frame(100, 100);
        let batch = vec![Detection::new(
            "with_mask",
            0.92,
            BoundingBox::new(90.0, 0.0, 99.0, 40.0),
        )];

        let annotated = Annotator::default().annotate(&frame, &batch);

        assert_eq!(label_origin(90, 0, (48, 18), (100, 100)), (52, 0));
        assert_eq!(*annotated.image().get_pixel(60, 5), Rgb([0, 180, 0]));
    }

    #[test]
    fn test_degenerate_boxes_are_skipped() {
        let frame = blank_frame(50, 50);
        let batch = vec![
            Detection::new("with_mask", 0.9, BoundingBox::new(30.0, 30.0, 10.0, 10.0)),
            Detection::new("with_mask", 0.9, BoundingBox::new(60.0, 60.0, 90.0, 90.0)),
        ];

        let annotated = Annotator::default().annotate(&frame, &batch);

        assert_eq!(annotated, frame);
    }

    #[test]
    fn test_label_text_uses_short_name_and_integer_percent() {
        let annotator = Annotator::default();
        let detection = Detection::new(
            "mask_weared_incorrect",
            0.876,
            BoundingBox::new(0.0, 0.0, 1.0, 1.0),
        );
        assert_eq!(annotator.label_text(&detection), "incorrect 88%");
    }

    #[test]
    fn test_label_percent_rounds_ties_to_even() {
        let annotator = Annotator::default();
        let label = |confidence| {
            annotator.label_text(&Detection::new(
                "with_mask",
                confidence,
                BoundingBox::new(0.0, 0.0, 1.0, 1.0),
            ))
        };

        assert_eq!(label(0.125), "mask 12%");
        assert_eq!(label(0.875), "mask 88%");
        assert_eq!(label(0.92), "mask 92%");
    }

    #[test]
    fn test_label_text_is_rendered_with_shipped_font() {
        let configuration = Path::new(env!("CARGO_MANIFEST_DIR")).join("configuration");
        let annotator = Annotator::from_config(&AnnotatorConfig {
            font_path: Some(configuration.join("fonts/DejaVuSans.ttf")),
            labels_path: Some(configuration.join("labels.csv")),
            ..AnnotatorConfig::default()
        })
        .unwrap();
        let frame = blank_frame(200, 200);
        let batch = vec![Detection::new(
            "with_mask",
            0.92,
            BoundingBox::new(50.0, 100.0, 150.0, 180.0),
        )];

        let annotated = annotator.annotate(&frame, &batch);

        // Background is black and the label fill is (0, 180, 0); only text is bright red.
        let text_pixels: Vec<(u32, u32)> = annotated
            .image()
            .enumerate_pixels()
            .filter(|(_, _, pixel)| pixel[0] > 200)
            .map(|(x, y, _)| (x, y))
            .collect();
        assert!(!text_pixels.is_empty());
        assert!(text_pixels.iter().all(|&(x, y)| y < 100 && x >= 50));
        let (width, _) = annotator.measure("mask 92%");
        assert!(text_pixels.iter().all(|&(x, _)| x < 50 + width + 4));
    }
}
