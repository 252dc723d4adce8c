//! Capture session lifecycle.
//!
//! A [`SessionController`] owns at most one capture loop at a time. The loop runs
//! on its own thread: read a frame, run the detector on every `frame_skip`-th
//! frame (downscaled to the inference size), map the boxes back, annotate the
//! full-resolution frame and hand the result to the [`Presenter`]. Stopping is
//! cooperative through the shared `running` flag, checked once per iteration.

use crate::annotator::Annotator;
use crate::camera::{FrameSource, FrameSourceError, ImageSource, SourceOpener};
use crate::config::{Config, SessionConfig};
use crate::detection::{DetectionBatch, DetectionError, DetectionParams, DetectionService};
use crate::formatter::format_results;
use crate::frame::{AnnotatedFrame, Frame};
use crate::presenter::{DetectionReport, Presenter};
use crate::scale::{downscale, rescale_batch, scale_factor};
use crate::telemetry::Metrics;
use parking_lot::Mutex;
use std::path::Path;
use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};
use std::thread::JoinHandle;
use std::time::Instant;
use thiserror::Error;
use tracing::instrument;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Camera session already running on device {0}")]
    AlreadyRunning(i32),
    #[error(transparent)]
    Source(#[from] FrameSourceError),
    #[error("Inference failed: {0}")]
    Inference(#[from] DetectionError),
    #[error("Failed to spawn capture thread: {0}")]
    Spawn(std::io::Error),
}

impl SessionError {
    pub fn is_device_unavailable(&self) -> bool {
        matches!(
            self,
            SessionError::Source(FrameSourceError::DeviceUnavailable { .. })
        )
    }
}

/// Why a capture loop finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    Stopped,
    EndOfStream,
    TooManyFailures,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Idle,
    Running { device_index: i32 },
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub params: DetectionParams,
    pub inference_size: u32,
    pub frame_skip: u64,
    pub max_consecutive_failures: u32,
}

impl SessionSettings {
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.detector.detection_params(),
            config.detector.live_inference_size,
            &config.session,
        )
    }

    pub fn new(params: DetectionParams, inference_size: u32, session: &SessionConfig) -> Self {
        Self {
            params,
            inference_size,
            frame_skip: session.frame_skip.max(1),
            max_consecutive_failures: session.max_consecutive_failures.max(1),
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::new(DetectionParams::default(), 320, &SessionConfig::default())
    }
}

/// Shared view of one camera session: its device and running flag.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    running: Arc<AtomicBool>,
    device_index: i32,
}

impl SessionHandle {
    fn new(device_index: i32) -> Self {
        Self {
            running: Arc::new(AtomicBool::new(true)),
            device_index,
        }
    }

    pub fn device_index(&self) -> i32 {
        self.device_index
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Asks the loop to exit at its next iteration. Does not wait.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }
}

struct ActiveSession {
    handle: SessionHandle,
    thread: JoinHandle<SessionEnd>,
}

/// Everything the capture loop and the one-shot path share.
#[derive(Clone)]
struct Pipeline {
    detector: Arc<dyn DetectionService>,
    annotator: Arc<Annotator>,
    presenter: Arc<dyn Presenter>,
    metrics: Option<Arc<Metrics>>,
    settings: SessionSettings,
    sequence: Arc<AtomicU64>,
}

impl Pipeline {
    fn live(&self, frame: Frame) -> Result<Arc<DetectionReport>, DetectionError> {
        let scale = scale_factor(frame.dimensions(), self.settings.inference_size);
        let small = downscale(&frame, &scale);
        let params = self
            .settings
            .params
            .with_inference_size(Some(self.settings.inference_size));

        let batch = self.detector.infer(&small, &params)?;
        let batch = rescale_batch(&batch, &scale);
        Ok(self.report(&frame, batch))
    }

    fn still(&self, frame: Frame) -> Result<Arc<DetectionReport>, DetectionError> {
        let params = self.settings.params.with_inference_size(None);
        let batch = self.detector.infer(&frame, &params)?;
        Ok(self.report(&frame, batch))
    }

    fn report(&self, frame: &Frame, batch: DetectionBatch) -> Arc<DetectionReport> {
        for detection in &batch {
            tracing::debug!(
                "Detection: class={}, confidence={:.3}, bbox=({:.1}, {:.1}, {:.1}, {:.1})",
                detection.class_name,
                detection.confidence,
                detection.bbox.x1,
                detection.bbox.y1,
                detection.bbox.x2,
                detection.bbox.y2
            );
        }
        let annotated = self.annotator.annotate(frame, &batch);
        let summary = format_results(&batch);
        Arc::new(DetectionReport {
            sequence: self.sequence.fetch_add(1, Ordering::Relaxed) + 1,
            annotated: AnnotatedFrame {
                frame: annotated,
                detections: batch,
            },
            summary,
        })
    }

    fn record_duration(&self, started: Instant, source: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.record_prediction_duration(started.elapsed().as_millis() as u64, source);
        }
    }

    fn run_loop(&self, mut source: Box<dyn FrameSource>, handle: SessionHandle) -> SessionEnd {
        let device_index = handle.device_index();
        let mut frame_count: u64 = 0;
        let mut consecutive_failures: u32 = 0;
        let mut last_frame: Option<Instant> = None;
        let mut last_cycle: Option<Instant> = None;

        let end = loop {
            if !handle.is_running() {
                tracing::info!("Capture loop on camera {} received stop", device_index);
                break SessionEnd::Stopped;
            }

            let frame = match source.read() {
                Ok(frame) => frame,
                Err(FrameSourceError::EndOfStream) => {
                    tracing::info!("Camera {} has no more frames", device_index);
                    break SessionEnd::EndOfStream;
                }
                Err(e) => {
                    tracing::warn!("Failed to read from camera {}: {}", device_index, e);
                    break SessionEnd::EndOfStream;
                }
            };

            let now = Instant::now();
            if let (Some(metrics), Some(previous)) = (&self.metrics, last_frame) {
                metrics.record_camera_fps(fps_since(previous, now), device_index);
            }
            last_frame = Some(now);

            frame_count += 1;
            if frame_count % self.settings.frame_skip != 0 {
                continue;
            }

            let started = Instant::now();
            match self.live(frame) {
                Ok(report) => {
                    consecutive_failures = 0;
                    self.record_duration(started, "camera");
                    if let (Some(metrics), Some(previous)) = (&self.metrics, last_cycle) {
                        let fps = fps_since(previous, started);
                        metrics.record_prediction_fps(fps, device_index);
                    }
                    last_cycle = Some(started);
                    self.presenter.present(report);
                }
                Err(e) => {
                    consecutive_failures += 1;
                    tracing::warn!(
                        "Skipping frame {} after inference failure ({}/{}): {}",
                        frame_count,
                        consecutive_failures,
                        self.settings.max_consecutive_failures,
                        e
                    );
                    if consecutive_failures >= self.settings.max_consecutive_failures {
                        tracing::error!("Persistent inference failure. Ending capture session");
                        self.presenter.present_error(&SessionError::Inference(e));
                        break SessionEnd::TooManyFailures;
                    }
                }
            }
        };

        source.close();
        handle.stop();
        tracing::info!("Capture session on camera {} ended: {:?}", device_index, end);
        end
    }
}

fn fps_since(previous: Instant, now: Instant) -> f64 {
    let elapsed = now.duration_since(previous).as_secs_f64();
    if elapsed > 0.0 {
        1.0 / elapsed
    } else {
        0.0
    }
}

pub struct SessionController {
    pipeline: Pipeline,
    opener: Arc<dyn SourceOpener>,
    active: Mutex<Option<ActiveSession>>,
    // Serializes `start`; `active` is only locked for short reads and swaps.
    starting: Mutex<()>,
}

impl SessionController {
    pub fn new(
        detector: Arc<dyn DetectionService>,
        opener: Arc<dyn SourceOpener>,
        annotator: Arc<Annotator>,
        presenter: Arc<dyn Presenter>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            pipeline: Pipeline {
                detector,
                annotator,
                presenter,
                metrics: None,
                settings,
                sequence: Arc::new(AtomicU64::new(0)),
            },
            opener,
            active: Mutex::new(None),
            starting: Mutex::new(()),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.pipeline.metrics = Some(metrics);
        self
    }

    /// Opens the camera and launches the capture loop on a new thread.
    ///
    /// Fails with [`SessionError::AlreadyRunning`] while another session is
    /// active. A previous loop that was told to stop is joined first, which can
    /// take up to one inference call. Neither the join nor the device open holds
    /// the lock that [`status`](Self::status) and [`stop`](Self::stop) take.
    pub fn start(&self, device_index: i32) -> Result<SessionHandle, SessionError> {
        let _starting = self.starting.lock();

        let previous = {
            let mut active = self.active.lock();
            if let Some(current) = active.as_ref() {
                if current.handle.is_running() {
                    tracing::warn!(
                        "Rejecting start on camera {}: camera {} is running",
                        device_index,
                        current.handle.device_index()
                    );
                    return Err(SessionError::AlreadyRunning(current.handle.device_index()));
                }
            }
            active.take()
        };
        if let Some(previous) = previous {
            join_session(previous);
        }

        let source = match self.opener.open_camera(device_index) {
            Ok(source) => source,
            Err(e) => {
                tracing::error!("Failed to open camera {}: {}", device_index, e);
                let error = SessionError::from(e);
                self.pipeline.presenter.present_error(&error);
                return Err(error);
            }
        };

        let handle = SessionHandle::new(device_index);
        let pipeline = self.pipeline.clone();
        let loop_handle = handle.clone();
        let thread = std::thread::Builder::new()
            .name(format!("capture-{}", device_index))
            .spawn(move || pipeline.run_loop(source, loop_handle))
            .map_err(SessionError::Spawn)?;

        tracing::info!("Camera session started on device {}", device_index);
        *self.active.lock() = Some(ActiveSession {
            handle: handle.clone(),
            thread,
        });
        Ok(handle)
    }

    /// Signals the running loop to exit and returns immediately.
    pub fn stop(&self) {
        if let Some(current) = self.active.lock().as_ref() {
            tracing::info!(
                "Stopping camera session on device {}",
                current.handle.device_index()
            );
            current.handle.stop();
        }
    }

    /// Waits for the current loop to finish. Returns `None` when no session was started.
    pub fn wait(&self) -> Option<SessionEnd> {
        let previous = self.active.lock().take()?;
        Some(join_session(previous))
    }

    pub fn stop_and_wait(&self) -> Option<SessionEnd> {
        self.stop();
        self.wait()
    }

    pub fn status(&self) -> SessionStatus {
        match self.active.lock().as_ref() {
            Some(current) if current.handle.is_running() => SessionStatus::Running {
                device_index: current.handle.device_index(),
            },
            _ => SessionStatus::Idle,
        }
    }

    /// One-shot detection on an image file, at native resolution.
    #[instrument(skip(self))]
    pub fn run(&self, path: &Path) -> Result<Arc<DetectionReport>, SessionError> {
        let frame = ImageSource::open(path)
            .and_then(|mut source| source.read())
            .map_err(|e| {
                let error = SessionError::from(e);
                self.pipeline.presenter.present_error(&error);
                error
            })?;
        self.run_frame(frame)
    }

    /// One-shot detection on an already decoded frame.
    #[instrument(skip(self, frame), fields(width = frame.width(), height = frame.height()))]
    pub fn run_frame(&self, frame: Frame) -> Result<Arc<DetectionReport>, SessionError> {
        let started = Instant::now();
        match self.pipeline.still(frame) {
            Ok(report) => {
                self.pipeline.record_duration(started, "image");
                self.pipeline.presenter.present(report.clone());
                Ok(report)
            }
            Err(e) => {
                tracing::error!("Still image detection failed: {}", e);
                let error = SessionError::from(e);
                self.pipeline.presenter.present_error(&error);
                Err(error)
            }
        }
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        if let Some(current) = self.active.get_mut().as_ref() {
            current.handle.stop();
        }
    }
}

fn join_session(session: ActiveSession) -> SessionEnd {
    match session.thread.join() {
        Ok(end) => end,
        Err(_) => {
            tracing::error!(
                "Capture thread for camera {} panicked",
                session.handle.device_index()
            );
            SessionEnd::Stopped
        }
    }
}
