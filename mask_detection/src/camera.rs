use crate::config::CameraConfig;
use crate::frame::Frame;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FrameSourceError {
    #[error("Cannot access camera {device_index}: {reason}")]
    DeviceUnavailable { device_index: i32, reason: String },
    #[error("End of stream")]
    EndOfStream,
    #[error("Failed to load image {path}: {source}")]
    ImageLoadFailed {
        path: PathBuf,
        source: image::ImageError,
    },
    #[cfg(feature = "camera")]
    #[error("OpenCV error: {0}")]
    OpenCvError(#[from] opencv::Error),
}

/// Produces frames on demand from a camera or a decoded image.
pub trait FrameSource: Send {
    /// Fails with [`FrameSourceError::EndOfStream`] once no further frame is available.
    fn read(&mut self) -> Result<Frame, FrameSourceError>;

    /// Releases the underlying device. Safe to call more than once.
    fn close(&mut self);
}

/// Opens camera devices by index for a capture session.
pub trait SourceOpener: Send + Sync + 'static {
    fn open_camera(&self, device_index: i32) -> Result<Box<dyn FrameSource>, FrameSourceError>;
}

/// A single still image. Yields its frame once, then reports end of stream.
#[derive(Debug)]
pub struct ImageSource {
    frame: Option<Frame>,
}

impl ImageSource {
    pub fn open(path: &Path) -> Result<Self, FrameSourceError> {
        let image = image::open(path).map_err(|source| FrameSourceError::ImageLoadFailed {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::from_frame(Frame::new(image.to_rgb8())))
    }

    pub fn from_frame(frame: Frame) -> Self {
        Self { frame: Some(frame) }
    }
}

impl FrameSource for ImageSource {
    fn read(&mut self) -> Result<Frame, FrameSourceError> {
        self.frame.take().ok_or(FrameSourceError::EndOfStream)
    }

    fn close(&mut self) {
        self.frame = None;
    }
}

/// Opens cameras with the configured capture resolution.
#[derive(Debug, Clone)]
pub struct CameraOpener {
    frame_width: u32,
    frame_height: u32,
}

impl CameraOpener {
    pub fn new(config: &CameraConfig) -> Self {
        Self {
            frame_width: config.frame_width,
            frame_height: config.frame_height,
        }
    }
}

impl SourceOpener for CameraOpener {
    #[cfg(feature = "camera")]
    fn open_camera(&self, device_index: i32) -> Result<Box<dyn FrameSource>, FrameSourceError> {
        let camera =
            opencv_camera::Camera::open(device_index, self.frame_width, self.frame_height)?;
        Ok(Box::new(camera))
    }

    #[cfg(not(feature = "camera"))]
    fn open_camera(&self, device_index: i32) -> Result<Box<dyn FrameSource>, FrameSourceError> {
        tracing::debug!(
            "Requested {}x{} capture without camera support",
            self.frame_width,
            self.frame_height
        );
        Err(FrameSourceError::DeviceUnavailable {
            device_index,
            reason: "camera support not compiled in (enable the `camera` feature)".into(),
        })
    }
}

#[cfg(feature = "camera")]
mod opencv_camera {
    use super::{FrameSource, FrameSourceError};
    use crate::frame::Frame;
    use image::RgbImage;
    use opencv::{core::Mat, imgproc, prelude::*, videoio};

    pub struct Camera {
        capture: videoio::VideoCapture,
        device_index: i32,
        released: bool,
    }

    impl Camera {
        pub fn open(
            device_index: i32,
            frame_width: u32,
            frame_height: u32,
        ) -> Result<Self, FrameSourceError> {
            let unavailable = |reason: String| FrameSourceError::DeviceUnavailable {
                device_index,
                reason,
            };

            let mut capture = videoio::VideoCapture::new(device_index, videoio::CAP_ANY)
                .map_err(|e| unavailable(e.to_string()))?;
            if !capture.is_opened().map_err(|e| unavailable(e.to_string()))? {
                return Err(unavailable("device could not be opened".into()));
            }

            // Lower capture resolution keeps inference cheap.
            capture.set(videoio::CAP_PROP_FRAME_WIDTH, frame_width as f64)?;
            capture.set(videoio::CAP_PROP_FRAME_HEIGHT, frame_height as f64)?;

            tracing::info!("Opened camera {}", device_index);
            Ok(Self {
                capture,
                device_index,
                released: false,
            })
        }
    }

    impl FrameSource for Camera {
        fn read(&mut self) -> Result<Frame, FrameSourceError> {
            if self.released {
                return Err(FrameSourceError::EndOfStream);
            }

            let mut frame = Mat::default();
            let grabbed = self.capture.read(&mut frame).map_err(|e| {
                tracing::warn!("Failed to read frame from camera {}: {}", self.device_index, e);
                FrameSourceError::EndOfStream
            })?;
            if !grabbed || frame.empty() {
                return Err(FrameSourceError::EndOfStream);
            }

            let mut rgb = Mat::default();
            imgproc::cvt_color_def(&frame, &mut rgb, imgproc::COLOR_BGR2RGB)?;
            let size = rgb.size()?;
            let data = rgb.data_bytes()?.to_vec();

            RgbImage::from_raw(size.width as u32, size.height as u32, data)
                .map(Frame::new)
                .ok_or(FrameSourceError::EndOfStream)
        }

        fn close(&mut self) {
            if self.released {
                return;
            }
            if let Err(e) = self.capture.release() {
                tracing::warn!("Failed to release camera {}: {}", self.device_index, e);
            }
            self.released = true;
            tracing::info!("Released camera {}", self.device_index);
        }
    }

    impl Drop for Camera {
        fn drop(&mut self) {
            self.close();
        }
    }
}
