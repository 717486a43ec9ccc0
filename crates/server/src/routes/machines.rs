//! `GET /api/machines`: fleet roster with health-checked peers plus a
//! synthetic local entry.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::federation::{check_peers_concurrently, MachineStatus};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct MachinesResponse {
    pub coordinator: bool,
    pub machines: Vec<MachineStatus>,
}

pub async fn machines(State(state): State<Arc<AppState>>) -> Json<MachinesResponse> {
    let local = MachineStatus {
        hostname: state.config.hostname.clone(),
        url: format!("http://localhost:{}", state.config.port),
        label: "local".to_string(),
        status: "online".to_string(),
        active_sessions: state.live_sessions.read().await.len() as i64,
        version: env!("CARGO_PKG_VERSION").to_string(),
    };

    let mut machines = Vec::with_capacity(state.peers.len() + 1);
    machines.push(local);
    machines.extend(check_peers_concurrently(&state.http, &state.peers).await);

    Json(MachinesResponse {
        coordinator: state.config.coordinator,
        machines,
    })
}
