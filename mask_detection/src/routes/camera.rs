use crate::{
    server::SharedState,
    session::{SessionError, SessionStatus},
};
use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::instrument;

#[derive(Debug, Default, Deserialize)]
pub struct StartRequest {
    device_index: Option<i32>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CameraState {
    Idle,
    Running { device_index: i32 },
}

impl From<SessionStatus> for CameraState {
    fn from(status: SessionStatus) -> Self {
        match status {
            SessionStatus::Idle => CameraState::Idle,
            SessionStatus::Running { device_index } => CameraState::Running { device_index },
        }
    }
}

#[derive(Error, Debug)]
pub enum CameraRouteError {
    #[error("Invalid start request: {0}")]
    InvalidRequest(#[from] serde_json::Error),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("Camera task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl IntoResponse for CameraRouteError {
    fn into_response(self) -> Response {
        let status = match &self {
            CameraRouteError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            CameraRouteError::Session(SessionError::AlreadyRunning(_)) => StatusCode::CONFLICT,
            CameraRouteError::Session(e) if e.is_device_unavailable() => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (
            status,
            Json(serde_json::json!({ "error": self.to_string() })),
        )
            .into_response()
    }
}

pub async fn camera_status(State(state): State<SharedState>) -> Json<CameraState> {
    Json(state.controller.status().into())
}

/// Body is optional; without `device_index` the configured camera is used.
#[instrument(skip(state, body))]
pub async fn start_camera(
    State(state): State<SharedState>,
    body: Bytes,
) -> Result<Json<CameraState>, CameraRouteError> {
    state.metrics.record_request("camera_start");

    let request: StartRequest = if body.is_empty() {
        StartRequest::default()
    } else {
        serde_json::from_slice(&body)?
    };
    let device_index = request
        .device_index
        .unwrap_or(state.camera_config.device_index);

    // Opening a device and joining a finished loop both block.
    let controller = state.controller.clone();
    let handle = tokio::task::spawn_blocking(move || controller.start(device_index)).await??;

    Ok(Json(CameraState::Running {
        device_index: handle.device_index(),
    }))
}

pub async fn stop_camera(State(state): State<SharedState>) -> Json<CameraState> {
    state.metrics.record_request("camera_stop");
    state.controller.stop();
    Json(state.controller.status().into())
}
