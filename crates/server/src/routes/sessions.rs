//! Session listing/detail/conversation and terminal lifecycle control.
//! The `status` live/idle filter is not a store column — it is
//! applied here by intersecting [`fleetdeck_db::SessionRow`]s with the
//! shared live-process snapshot, per the pointer left in
//! `fleetdeck_db::queries::sessions`.

use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Clone, Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
    pub project: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct SessionListResponse {
    pub sessions: Vec<fleetdeck_db::SessionRow>,
    pub total: i64,
}

pub async fn list_sessions(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<SessionListResponse>> {
    let filter = fleetdeck_db::SessionFilter {
        project: query.project,
        limit: query.limit.unwrap_or(0),
        offset: query.offset.unwrap_or(0),
    };
    let page = state.db.list_sessions(&filter).await?;

    let sessions = match query.status.as_deref() {
        Some(wanted @ ("live" | "idle")) => {
            let live = state.live_sessions.read().await;
            page.sessions
                .into_iter()
                .filter(|s| {
                    let is_live = live.contains(&s.session_id);
                    (wanted == "live") == is_live
                })
                .collect::<Vec<_>>()
        }
        _ => page.sessions,
    };

    Ok(Json(SessionListResponse { total: page.total, sessions }))
}

pub async fn session_detail(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<fleetdeck_db::SessionDetail>> {
    let detail = state
        .db
        .session_detail(&id)
        .await?
        .ok_or_else(|| ApiError::SessionNotFound(id.clone()))?;
    Ok(Json(detail))
}

#[derive(Debug, Deserialize)]
pub struct ConversationQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

pub async fn conversation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<ConversationQuery>,
) -> ApiResult<Json<fleetdeck_db::ConversationPage>> {
    let page = state
        .db
        .conversation(&id, query.limit.unwrap_or(0), query.offset.unwrap_or(0))
        .await?;
    Ok(Json(page))
}

#[derive(Debug, Deserialize)]
pub struct SpawnRequest {
    pub name: String,
    pub working_dir: PathBuf,
    pub resume_id: Option<String>,
    pub rows: Option<u16>,
    pub cols: Option<u16>,
}

#[derive(Debug, Serialize)]
pub struct SpawnResponse {
    pub tmux_session: String,
}

const DEFAULT_ROWS: u16 = 24;
const DEFAULT_COLS: u16 = 80;

pub async fn spawn_session(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SpawnRequest>,
) -> ApiResult<Json<SpawnResponse>> {
    state
        .mux
        .spawn(
            &req.name,
            &req.working_dir,
            req.resume_id.as_deref(),
            req.rows.unwrap_or(DEFAULT_ROWS),
            req.cols.unwrap_or(DEFAULT_COLS),
        )
        .await?;
    Ok(Json(SpawnResponse {
        tmux_session: state.mux.session_name(&req.name),
    }))
}

pub async fn terminate_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let name = state.mux.session_name(&id);
    state.mux.kill(&name).await?;
    Ok(Json(serde_json::json!({ "terminated": name })))
}

#[derive(Debug, Serialize)]
pub struct JoinResponse {
    pub action: &'static str,
    pub tmux_session: String,
    pub tmux_id: String,
}

/// Idempotent "join": attach to an existing multiplexer
/// session already running `--resume <id>`, or spawn one.
pub async fn join_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<JoinResponse>> {
    if let Some(existing) = state.mux.find_by_resume(&id).await? {
        return Ok(Json(JoinResponse {
            action: "attached",
            tmux_session: existing,
            tmux_id: id,
        }));
    }

    let detail = state
        .db
        .session_detail(&id)
        .await?
        .ok_or_else(|| ApiError::SessionNotFound(id.clone()))?;
    let working_dir = PathBuf::from(&detail.session.working_dir);

    state
        .mux
        .spawn(&id, &working_dir, Some(&id), DEFAULT_ROWS, DEFAULT_COLS)
        .await?;

    Ok(Json(JoinResponse {
        action: "created",
        tmux_session: state.mux.session_name(&id),
        tmux_id: id,
    }))
}

#[derive(Debug, Deserialize)]
pub struct InjectRequest {
    pub text: String,
}

pub async fn inject(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<InjectRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let name = state.mux.session_name(&id);
    state.mux.inject(&name, &req.text).await?;
    Ok(Json(serde_json::json!({ "injected": true })))
}
