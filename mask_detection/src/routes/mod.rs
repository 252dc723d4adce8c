mod camera;
mod detections;
mod health;
mod metrics;
mod predict_image;
mod video_feed;

use crate::server::SharedState;
use axum::{
    routing::{get, post},
    Router,
};

pub fn api_routes() -> Router<SharedState> {
    Router::new()
        .route("/health", get(health::healthcheck))
        .route("/metrics", get(metrics::metrics_handler))
        .route("/video_feed", get(video_feed::video_feed))
        .route("/detections", get(detections::latest_detections))
        .route("/predict_image", post(predict_image::predict_image))
        .route("/camera", get(camera::camera_status))
        .route("/camera/start", post(camera::start_camera))
        .route("/camera/stop", post(camera::stop_camera))
}
