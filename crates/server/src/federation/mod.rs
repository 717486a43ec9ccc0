//! Federation: peer roster, health checks, and the aggregation/proxying
//! surface.

pub mod peer_stream;

use std::path::Path;
use std::time::Duration;

use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::warn;

const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);
const DATA_TIMEOUT: Duration = Duration::from_secs(10);

/// One peer entry, as loaded from `machines.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Peer {
    pub hostname: String,
    pub url: String,
    pub label: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct MachinesFile {
    #[serde(default)]
    machines: Vec<Peer>,
}

/// Load the peer roster from `machines.json`. A missing or malformed file
/// yields an empty roster rather than an error — federation is opt-in.
pub fn load_peers(path: &Path) -> Vec<Peer> {
    match std::fs::read(path) {
        Ok(bytes) => match serde_json::from_slice::<MachinesFile>(&bytes) {
            Ok(file) => file.machines,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "malformed machines.json, treating as no peers");
                Vec::new()
            }
        },
        Err(_) => Vec::new(),
    }
}

/// One row of the `/api/machines` response.
#[derive(Debug, Clone, Serialize)]
pub struct MachineStatus {
    pub hostname: String,
    pub url: String,
    pub label: String,
    pub status: String,
    pub active_sessions: i64,
    pub version: String,
}

/// Health-check one peer with a [`HEALTH_TIMEOUT`] budget. Never errors —
/// an unreachable peer is reported `"offline"`, not failed.
pub async fn check_peer(client: &reqwest::Client, peer: &Peer) -> MachineStatus {
    let url = format!("{}/api/health", peer.url.trim_end_matches('/'));
    let result = client.get(&url).timeout(HEALTH_TIMEOUT).send().await;

    match result {
        Ok(resp) if resp.status().is_success() => match resp.json::<crate::routes::health::HealthResponse>().await {
            Ok(body) => MachineStatus {
                hostname: peer.hostname.clone(),
                url: peer.url.clone(),
                label: peer.label.clone(),
                status: "online".to_string(),
                active_sessions: body.active_sessions,
                version: body.version,
            },
            Err(_) => offline(peer),
        },
        _ => offline(peer),
    }
}

/// Health-check every peer concurrently rather than one at a time, so the
/// wall-clock cost of `N` offline peers stays at roughly [`HEALTH_TIMEOUT`]
/// instead of `N * HEALTH_TIMEOUT`.
pub async fn check_peers_concurrently(client: &reqwest::Client, peers: &[Peer]) -> Vec<MachineStatus> {
    join_all(peers.iter().map(|peer| check_peer(client, peer))).await
}

fn offline(peer: &Peer) -> MachineStatus {
    MachineStatus {
        hostname: peer.hostname.clone(),
        url: peer.url.clone(),
        label: peer.label.clone(),
        status: "offline".to_string(),
        active_sessions: 0,
        version: String::new(),
    }
}

/// Fetch one peer's JSON endpoint within [`DATA_TIMEOUT`]. `None` on any
/// failure (timeout, connection refused, non-2xx, bad body) — unreachable
/// peers are dropped from aggregation, not surfaced as errors.
pub async fn fetch_peer_json<T: for<'de> Deserialize<'de>>(
    client: &reqwest::Client,
    peer: &Peer,
    path: &str,
) -> Option<T> {
    let url = format!("{}{}", peer.url.trim_end_matches('/'), path);
    let resp = client.get(&url).timeout(DATA_TIMEOUT).send().await.ok()?;
    if !resp.status().is_success() {
        return None;
    }
    resp.json::<T>().await.ok()
}
