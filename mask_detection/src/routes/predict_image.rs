use crate::{
    frame::{Frame, FrameError},
    server::SharedState,
    session::SessionError,
};
use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::instrument;

pub const DETECTIONS_HEADER: &str = "x-detections";

#[derive(Error, Debug)]
pub enum PredictImageError {
    #[error("Image decode failed: {0}")]
    Decode(FrameError),
    #[error("Detection failed: {0}")]
    Detection(SessionError),
    #[error("Image encoding failed: {0}")]
    Encode(FrameError),
    #[error("Detection task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
    #[error("Summary serialization failed: {0}")]
    Summary(#[from] serde_json::Error),
    #[error("HTTP builder failed: {0}")]
    HttpBuilder(String),
}

impl IntoResponse for PredictImageError {
    fn into_response(self) -> Response {
        let status = match self {
            PredictImageError::Decode(_) => StatusCode::BAD_REQUEST,
            PredictImageError::Detection(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, format!("Something went wrong: {}", self)).into_response()
    }
}

/// Runs the one-shot path on an uploaded image and returns it annotated as JPEG.
/// The summary lines travel as a JSON array in the `x-detections` header.
#[instrument(skip(state, image_data))]
pub async fn predict_image(
    State(state): State<SharedState>,
    image_data: Bytes,
) -> Result<Response, PredictImageError> {
    state.metrics.record_request("predict_image");

    let frame = Frame::from_bytes(&image_data).map_err(PredictImageError::Decode)?;

    let controller = state.controller.clone();
    let report = tokio::task::spawn_blocking(move || controller.run_frame(frame))
        .await?
        .map_err(PredictImageError::Detection)?;

    let annotated_image_data = report
        .annotated
        .frame
        .to_jpg()
        .map_err(PredictImageError::Encode)?;
    let summary = serde_json::to_vec(&report.summary)?;

    let response = Response::builder()
        .header(header::CONTENT_TYPE, "image/jpeg")
        .header(DETECTIONS_HEADER, summary.as_slice())
        .body(Body::from(annotated_image_data))
        .map_err(|e| PredictImageError::HttpBuilder(e.to_string()))?;

    Ok(response)
}
