use crate::frame::AnnotatedFrame;
use crate::session::SessionError;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::watch;

/// What the pipeline hands to the display side after each processed frame.
#[derive(Debug, Clone)]
pub struct DetectionReport {
    pub sequence: u64,
    pub annotated: AnnotatedFrame,
    pub summary: Vec<String>,
}

/// Receives finished results. Implementations must return without waiting on
/// the display, the capture loop calls them inline.
pub trait Presenter: Send + Sync + 'static {
    fn present(&self, report: Arc<DetectionReport>);

    fn present_error(&self, error: &SessionError);
}

/// Keeps only the newest report; a slow reader skips intermediate ones.
#[derive(Debug)]
pub struct WatchPresenter {
    reports: watch::Sender<Option<Arc<DetectionReport>>>,
    last_error: Mutex<Option<String>>,
}

impl WatchPresenter {
    pub fn new() -> Self {
        let (reports, _) = watch::channel(None);
        Self {
            reports,
            last_error: Mutex::new(None),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<DetectionReport>>> {
        self.reports.subscribe()
    }

    pub fn latest(&self) -> Option<Arc<DetectionReport>> {
        self.reports.borrow().clone()
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().clone()
    }
}

impl Default for WatchPresenter {
    fn default() -> Self {
        Self::new()
    }
}

impl Presenter for WatchPresenter {
    fn present(&self, report: Arc<DetectionReport>) {
        tracing::debug!(
            "Presenting report {} with {} detections",
            report.sequence,
            report.annotated.detections.len()
        );
        self.reports.send_replace(Some(report));
        *self.last_error.lock() = None;
    }

    fn present_error(&self, error: &SessionError) {
        *self.last_error.lock() = Some(error.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Frame;
    use image::{Rgb, RgbImage};

    fn report(sequence: u64) -> Arc<DetectionReport> {
        Arc::new(DetectionReport {
            sequence,
            annotated: AnnotatedFrame {
                frame: Frame::new(RgbImage::from_pixel(2, 2, Rgb([0, 0, 0]))),
                detections: vec![],
            },
            summary: vec![],
        })
    }

    #[test]
    fn test_latest_report_wins_without_readers() {
        let presenter = WatchPresenter::new();
        assert!(presenter.latest().is_none());

        for sequence in 1..=5 {
            presenter.present(report(sequence));
        }

        assert_eq!(presenter.latest().unwrap().sequence, 5);
    }

    #[tokio::test]
    async fn test_slow_subscriber_sees_only_newest() {
        let presenter = WatchPresenter::new();
        let mut receiver = presenter.subscribe();

        presenter.present(report(1));
        presenter.present(report(2));

        receiver.changed().await.unwrap();
        let seen = receiver.borrow_and_update().clone().unwrap();
        assert_eq!(seen.sequence, 2);
        assert!(!receiver.has_changed().unwrap());
    }

    #[test]
    fn test_error_is_cleared_by_next_report() {
        let presenter = WatchPresenter::new();
        presenter.present_error(&SessionError::AlreadyRunning(1));
        assert_eq!(
            presenter.last_error().as_deref(),
            Some("Camera session already running on device 1")
        );

        presenter.present(report(1));
        assert!(presenter.last_error().is_none());
    }
}
