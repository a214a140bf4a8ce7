use axum::{
    extract::State,
    http::header,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

use crate::metrics::{collect_dynamic_metrics, encode_metrics};
use crate::state::{AppState, TaskStatus};

#[derive(Serialize)]
pub struct PendingPass {
    pub satellite_id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Serialize)]
pub struct StatusResponse {
    pub version: &'static str,
    pub started_at: DateTime<Utc>,
    pub pending_passes: Vec<PendingPass>,
    pub tasks: Vec<TaskStatus>,
}

pub async fn health() -> &'static str {
    "ok"
}

pub async fn status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let pending_passes = state
        .planner()
        .work()
        .pending()
        .into_iter()
        .map(|(satellite_id, window)| PendingPass {
            satellite_id,
            start: window.start,
            end: window.end,
        })
        .collect();

    Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION"),
        started_at: state.started_at(),
        pending_passes,
        tasks: state.task_statuses(),
    })
}

pub async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    collect_dynamic_metrics(&state).await;
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        encode_metrics(),
    )
}
