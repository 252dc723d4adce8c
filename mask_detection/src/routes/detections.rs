use crate::{detection::Detection, server::SharedState};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;

#[derive(Serialize)]
pub struct LatestDetections {
    sequence: u64,
    width: u32,
    height: u32,
    summary: Vec<String>,
    detections: Vec<Detection>,
    error: Option<String>,
}

/// The newest report the pipeline published, or 204 before the first one.
pub async fn latest_detections(State(state): State<SharedState>) -> Response {
    let Some(report) = state.presenter.latest() else {
        return StatusCode::NO_CONTENT.into_response();
    };

    let (width, height) = report.annotated.frame.dimensions();
    Json(LatestDetections {
        sequence: report.sequence,
        width,
        height,
        summary: report.summary.clone(),
        detections: report.annotated.detections.clone(),
        error: state.presenter.last_error(),
    })
    .into_response()
}
