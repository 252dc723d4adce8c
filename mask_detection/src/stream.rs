use crate::frame::{Frame, FrameError};
use crate::presenter::DetectionReport;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::{sync::Arc, time::Duration};
use thiserror::Error;
use tokio::{sync::watch, time::sleep};
use tokio_stream::wrappers::WatchStream;
use tracing::instrument;

pub const FRAME_BOUNDARY: &str = "frame";

/// MJPEG parts built from the newest annotated frame, at most one per delay.
pub struct VideoStream {
    reports: watch::Receiver<Option<Arc<DetectionReport>>>,
    video_stream_delay: u64,
}

#[derive(Error, Debug)]
pub enum VideoStreamError {
    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),
    #[error("Http builder error: {0}")]
    HttpBuilderError(String),
}

impl VideoStream {
    pub fn new(
        reports: watch::Receiver<Option<Arc<DetectionReport>>>,
        video_stream_delay: u64,
    ) -> Self {
        Self {
            reports,
            video_stream_delay,
        }
    }

    #[instrument(skip(self))]
    pub fn generate_stream(self) -> impl Stream<Item = Result<Bytes, VideoStreamError>> {
        let delay = Duration::from_millis(self.video_stream_delay);

        WatchStream::new(self.reports)
            .filter_map(|report| async move { report })
            .then(move |report| async move {
                sleep(delay).await;
                encode_part(&report.annotated.frame).inspect_err(|e| {
                    tracing::error!("Error encoding frame {}: {:?}", report.sequence, e);
                })
            })
    }
}

fn encode_part(frame: &Frame) -> Result<Bytes, VideoStreamError> {
    let jpg = frame.to_jpg()?;
    let part_header = format!(
        "--{}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
        FRAME_BOUNDARY,
        jpg.len()
    );
    let mut body = part_header.into_bytes();
    body.extend_from_slice(&jpg);
    body.extend_from_slice(b"\r\n");
    Ok(Bytes::from(body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::AnnotatedFrame;
    use crate::presenter::{Presenter, WatchPresenter};
    use image::{Rgb, RgbImage};

    fn report(sequence: u64) -> Arc<DetectionReport> {
        Arc::new(DetectionReport {
            sequence,
            annotated: AnnotatedFrame {
                frame: Frame::new(RgbImage::from_pixel(8, 8, Rgb([5, 5, 5]))),
                detections: vec![],
            },
            summary: vec![],
        })
    }

    #[tokio::test]
    async fn test_stream_emits_multipart_jpeg_parts() {
        let presenter = WatchPresenter::new();
        let stream = VideoStream::new(presenter.subscribe(), 0).generate_stream();
        tokio::pin!(stream);

        presenter.present(report(1));
        let part = stream.next().await.unwrap().unwrap();

        let header = b"--frame\r\nContent-Type: image/jpeg\r\nContent-Length: ";
        assert!(part.starts_with(header));
        assert!(part.ends_with(b"\r\n"));
    }
}
