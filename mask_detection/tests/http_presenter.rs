use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use image::{ImageFormat, Rgb, RgbImage};
use mask_detection::{
    annotator::Annotator,
    camera::{FrameSource, FrameSourceError, SourceOpener},
    config::CameraConfig,
    detection::{
        BoundingBox, Detection, DetectionBatch, DetectionError, DetectionParams, DetectionService,
    },
    frame::Frame,
    presenter::WatchPresenter,
    server::{build_router, SharedState},
    session::{SessionController, SessionSettings},
    telemetry::Metrics,
};
use serde_json::Value;
use std::{io::Cursor, sync::Arc, thread, time::Duration};
use tower::ServiceExt;

struct FixedDetector;

impl DetectionService for FixedDetector {
    fn infer(&self, _: &Frame, _: &DetectionParams) -> Result<DetectionBatch, DetectionError> {
        Ok(vec![Detection::new(
            "with_mask",
            0.92,
            BoundingBox::new(4.0, 20.0, 30.0, 44.0),
        )])
    }
}

struct BlankCamera;

impl FrameSource for BlankCamera {
    fn read(&mut self) -> Result<Frame, FrameSourceError> {
        thread::sleep(Duration::from_millis(5));
        Ok(Frame::new(RgbImage::from_pixel(64, 48, Rgb([40, 40, 40]))))
    }

    fn close(&mut self) {}
}

enum TestOpener {
    Available,
    Unavailable,
}

impl SourceOpener for TestOpener {
    fn open_camera(&self, device_index: i32) -> Result<Box<dyn FrameSource>, FrameSourceError> {
        match self {
            TestOpener::Available => Ok(Box::new(BlankCamera)),
            TestOpener::Unavailable => Err(FrameSourceError::DeviceUnavailable {
                device_index,
                reason: "no such device".to_string(),
            }),
        }
    }
}

fn router(opener: TestOpener) -> Router {
    let presenter = Arc::new(WatchPresenter::new());
    let metrics = Arc::new(Metrics::new().unwrap());
    let controller = SessionController::new(
        Arc::new(FixedDetector),
        Arc::new(opener),
        Arc::new(Annotator::default()),
        presenter.clone(),
        SessionSettings::default(),
    )
    .with_metrics(metrics.clone());

    build_router(SharedState {
        controller: Arc::new(controller),
        presenter,
        camera_config: CameraConfig::default(),
        metrics,
    })
}

fn png(width: u32, height: u32) -> Vec<u8> {
    let mut bytes = Vec::new();
    RgbImage::from_pixel(width, height, Rgb([90, 120, 150]))
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, body.to_vec())
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post(uri: &str, body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .body(body.into())
        .unwrap()
}

#[tokio::test]
async fn health_reports_idle_camera() {
    let router = router(TestOpener::Unavailable);

    let (status, body) = send(&router, get("/health")).await;

    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "Available");
    assert_eq!(json["camera"], "idle");
}

#[tokio::test]
async fn detections_are_empty_before_first_report() {
    let router = router(TestOpener::Unavailable);

    let (status, _) = send(&router, get("/detections")).await;

    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn unavailable_camera_is_reported_and_session_stays_idle() {
    let router = router(TestOpener::Unavailable);

    let (status, body) = send(&router, post("/camera/start", r#"{"device_index": 3}"#)).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert!(json["error"].as_str().unwrap().contains("camera 3"));

    let (status, body) = send(&router, get("/camera")).await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["state"], "idle");
}

#[tokio::test]
async fn second_start_is_rejected_until_stopped() {
    let router = router(TestOpener::Available);

    let (status, body) = send(&router, post("/camera/start", Body::empty())).await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["state"], "running");
    assert_eq!(json["device_index"], 0);

    let (status, _) = send(&router, post("/camera/start", r#"{"device_index": 1}"#)).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = send(&router, post("/camera/stop", Body::empty())).await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["state"], "idle");

    let (status, _) = send(&router, post("/camera/start", r#"{"device_index": 1}"#)).await;
    assert_eq!(status, StatusCode::OK);
    send(&router, post("/camera/stop", Body::empty())).await;
}

#[tokio::test]
async fn malformed_start_body_is_a_bad_request() {
    let router = router(TestOpener::Available);

    let (status, _) = send(&router, post("/camera/start", "{not json")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn predict_image_returns_annotated_jpeg_and_summary() {
    let router = router(TestOpener::Unavailable);

    let response = router
        .clone()
        .oneshot(post("/predict_image", png(64, 48)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "image/jpeg");
    let summary: Vec<String> =
        serde_json::from_slice(response.headers()["x-detections"].as_bytes()).unwrap();
    assert_eq!(summary, vec!["• with_mask (92.00%)".to_string()]);

    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let annotated = image::load_from_memory(&body).unwrap();
    assert_eq!((annotated.width(), annotated.height()), (64, 48));

    let (status, body) = send(&router, get("/detections")).await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["sequence"], 1);
    assert_eq!(json["width"], 64);
    assert_eq!(json["detections"][0]["class_name"], "with_mask");
    assert_eq!(json["detections"][0]["box"]["x1"], 4.0);
    assert!(json["error"].is_null());
}

#[tokio::test]
async fn predict_image_rejects_undecodable_upload() {
    let router = router(TestOpener::Unavailable);

    let (status, _) = send(&router, post("/predict_image", "not an image")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn metrics_are_exposed() {
    let router = router(TestOpener::Unavailable);
    send(&router, get("/health")).await;

    let (status, _) = send(&router, get("/metrics")).await;

    assert_eq!(status, StatusCode::OK);
}
