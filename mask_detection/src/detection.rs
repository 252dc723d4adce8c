use crate::frame::{Frame, FrameError};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }
}

/// One predicted object, in pixel coordinates of the frame it was computed on.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Detection {
    pub class_name: String,
    pub confidence: f32,
    #[serde(rename = "box")]
    pub bbox: BoundingBox,
}

impl Detection {
    pub fn new(class_name: impl Into<String>, confidence: f32, bbox: BoundingBox) -> Self {
        Self {
            class_name: class_name.into(),
            confidence,
            bbox,
        }
    }
}

/// Detections for a single frame, in detector order. May be empty.
pub type DetectionBatch = Vec<Detection>;

/// Parameters forwarded untouched to the detector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionParams {
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    /// `None` runs the detector at the frame's native size.
    pub inference_size: Option<u32>,
}

impl DetectionParams {
    pub fn with_inference_size(self, inference_size: Option<u32>) -> Self {
        Self {
            inference_size,
            ..self
        }
    }
}

impl Default for DetectionParams {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.4,
            iou_threshold: 0.45,
            inference_size: None,
        }
    }
}

#[derive(Error, Debug)]
pub enum DetectionError {
    #[error("Maximum connection retries exceeded.")]
    MaxRetriesExceeded,
    #[error("gRPC request failed: {0}")]
    GrpcRequestFailed(#[from] tonic::Status),
    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),
    #[error("Model error: {0}")]
    Model(String),
}

/// Blocking inference boundary. Detections below `confidence_threshold` are
/// expected to be filtered out by the implementation.
pub trait DetectionService: Send + Sync + 'static {
    fn infer(
        &self,
        frame: &Frame,
        params: &DetectionParams,
    ) -> Result<DetectionBatch, DetectionError>;
}
