//! `GET /api/dashboard/stream`, `GET /api/sessions/{id}/stream`, and
//! `GET /api/needs-input`.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event as SseEvent, Sse};
use axum::Json;
use tokio_stream::Stream;

use crate::sse::stream_topic;
use crate::state::AppState;

pub async fn dashboard_stream(
    State(state): State<Arc<AppState>>,
) -> Result<Sse<impl Stream<Item = Result<SseEvent, Infallible>>>, StatusCode> {
    stream_topic(&state, fleetdeck_live::GLOBAL_TOPIC.to_string()).await
}

pub async fn session_stream(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<SseEvent, Infallible>>>, StatusCode> {
    stream_topic(&state, id).await
}

pub async fn needs_input(State(state): State<Arc<AppState>>) -> Json<Vec<String>> {
    let waiting = state.waiting_sessions.read().await;
    Json(waiting.iter().cloned().collect())
}
