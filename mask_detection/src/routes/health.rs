use crate::{server::SharedState, session::SessionStatus};
use axum::{extract::State, response::IntoResponse, response::Json};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize)]
pub struct Status {
    status: String,
    camera: String,
}

pub async fn healthcheck(State(state): State<SharedState>) -> impl IntoResponse {
    let camera = match state.controller.status() {
        SessionStatus::Idle => "idle",
        SessionStatus::Running { .. } => "running",
    };

    Json(Status {
        status: "Available".into(),
        camera: camera.into(),
    })
}
