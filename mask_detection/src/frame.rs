use crate::detection::DetectionBatch;
use image::{ImageFormat, RgbImage};
use std::io::Cursor;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FrameError {
    #[error("Failed to encode frame: {0}")]
    EncodeFrameFailed(image::ImageError),
    #[error("Failed to decode image: {0}")]
    DecodeFailed(image::ImageError),
}

/// Channel layout of a [`Frame`] buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelOrder {
    Rgb,
}

/// An 8-bit RGB pixel buffer. Camera frames are converted from BGR on capture.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    image: RgbImage,
}

impl Frame {
    pub fn new(image: RgbImage) -> Self {
        Self { image }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, FrameError> {
        let image = image::load_from_memory(bytes).map_err(FrameError::DecodeFailed)?;
        Ok(Self {
            image: image.to_rgb8(),
        })
    }

    pub fn to_jpg(&self) -> Result<Vec<u8>, FrameError> {
        let mut buf = Vec::new();
        self.image
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Jpeg)
            .map_err(FrameError::EncodeFrameFailed)?;
        Ok(buf)
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    pub fn channel_order(&self) -> ChannelOrder {
        ChannelOrder::Rgb
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }
}

/// A frame with overlays drawn, together with the detections that produced them.
#[derive(Debug, Clone)]
pub struct AnnotatedFrame {
    pub frame: Frame,
    pub detections: DetectionBatch,
}
