//! `POST /api/reindex`: force a full reindex bypassing the
//! mtime/size skip check.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;

use crate::error::ApiResult;
use crate::state::AppState;

pub async fn reindex(State(state): State<Arc<AppState>>) -> ApiResult<Json<fleetdeck_db::IndexSummary>> {
    let summary = state.indexer.reindex_force().await?;
    crate::metrics::set_indexed_sessions(summary.sessions_indexed as i64);
    Ok(Json(summary))
}
