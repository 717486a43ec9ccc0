//! `GET /api/dashboard`: active sessions, recent tool uses, rollup stats.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use fleetdeck_db::{Period, SessionFilter, SessionRow, ToolHistogramEntry};
use serde::Serialize;

use crate::error::ApiResult;
use crate::state::AppState;

const RECENT_SESSIONS_LIMIT: i64 = 20;

#[derive(Debug, Clone, Serialize)]
pub struct DashboardResponse {
    pub active_session_ids: Vec<String>,
    pub recent_sessions: Vec<SessionRow>,
    pub recent_tool_uses: Vec<ToolHistogramEntry>,
    pub token_rollup: Vec<fleetdeck_db::TokenRollupEntry>,
}

pub async fn dashboard(State(state): State<Arc<AppState>>) -> ApiResult<Json<DashboardResponse>> {
    let active_session_ids: Vec<String> = state.live_sessions.read().await.iter().cloned().collect();

    let recent_sessions = state
        .db
        .list_sessions(&SessionFilter {
            project: None,
            limit: RECENT_SESSIONS_LIMIT,
            offset: 0,
        })
        .await?
        .sessions;

    let recent_tool_uses = state.db.tool_histogram(Period::Days7).await?;
    let token_rollup = state.db.token_rollup(Period::Days7, true).await?;

    Ok(Json(DashboardResponse {
        active_session_ids,
        recent_sessions,
        recent_tool_uses,
        token_rollup,
    }))
}
