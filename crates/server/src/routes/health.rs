//! `GET /api/health`.

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::state::AppState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub hostname: String,
    pub version: String,
    pub active_sessions: i64,
    pub status: String,
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let active_sessions = state.live_sessions.read().await.len() as i64;
    Json(HealthResponse {
        hostname: state.config.hostname.clone(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        active_sessions,
        status: "ok".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_response_round_trips_through_json() {
        let body = HealthResponse {
            hostname: "box".to_string(),
            version: "0.1.0".to_string(),
            active_sessions: 2,
            status: "ok".to_string(),
        };
        let json = serde_json::to_string(&body).unwrap();
        let back: HealthResponse = serde_json::from_str(&json).unwrap();
        assert_eq!(back.active_sessions, 2);
    }
}
