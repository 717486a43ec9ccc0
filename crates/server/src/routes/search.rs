//! `GET /api/search`: FTS snippet search.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use fleetdeck_db::SearchHit;
use serde::Deserialize;

use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: String,
    pub project: Option<String>,
    pub after: Option<String>,
    pub before: Option<String>,
    pub limit: Option<i64>,
}

pub async fn search(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SearchQuery>,
) -> ApiResult<Json<Vec<SearchHit>>> {
    let hits = state
        .db
        .search(
            &query.q,
            query.project.as_deref(),
            query.after.as_deref(),
            query.before.as_deref(),
            query.limit.unwrap_or(0),
        )
        .await?;
    Ok(Json(hits))
}
