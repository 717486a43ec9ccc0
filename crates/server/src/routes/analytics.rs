//! `GET /api/analytics/{tokens,tools}`.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use fleetdeck_db::{Period, ToolHistogramEntry, TokenRollupEntry};
use serde::Deserialize;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct TokensQuery {
    pub period: Option<String>,
    pub group_by: Option<String>,
}

pub async fn tokens(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TokensQuery>,
) -> ApiResult<Json<Vec<TokenRollupEntry>>> {
    let period = parse_period(query.period.as_deref())?;
    let group_by_day = match query.group_by.as_deref() {
        None | Some("day") => true,
        Some("project") => false,
        Some(other) => return Err(ApiError::BadRequest(format!("unknown group_by: {other}"))),
    };
    let rows = state.db.token_rollup(period, group_by_day).await?;
    Ok(Json(rows))
}

#[derive(Debug, Deserialize)]
pub struct ToolsQuery {
    pub period: Option<String>,
}

pub async fn tools(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ToolsQuery>,
) -> ApiResult<Json<Vec<ToolHistogramEntry>>> {
    let period = parse_period(query.period.as_deref())?;
    let rows = state.db.tool_histogram(period).await?;
    Ok(Json(rows))
}

fn parse_period(raw: Option<&str>) -> ApiResult<Period> {
    let raw = raw.unwrap_or("7d");
    Period::parse(raw).ok_or_else(|| ApiError::BadRequest(format!("unknown period: {raw}")))
}
