//! Shared application state threaded through every Axum handler.

use std::sync::Arc;
use std::time::Instant;

use fleetdeck_db::{Database, Indexer};
use fleetdeck_live::{EventBus, WaitingSetHandle};
use fleetdeck_terminal::Multiplexer;
use tokio::sync::Semaphore;

use crate::config::Config;
use crate::federation::Peer;
use crate::live_tracker::LiveSetHandle;
use crate::push_sender::VapidKeyPair;

/// A process-wide cap on concurrent SSE connections: 5 permits,
/// acquired for the lifetime of one stream and released on disconnect.
pub const SSE_CONNECTION_CAP: usize = 5;

#[derive(Clone)]
pub struct AppState {
    pub start_time: Instant,
    pub config: Config,
    pub db: Database,
    pub indexer: Indexer,
    pub bus: EventBus,
    pub mux: Multiplexer,
    pub http: reqwest::Client,
    pub peers: Arc<Vec<Peer>>,
    pub live_sessions: LiveSetHandle,
    pub waiting_sessions: WaitingSetHandle,
    pub sse_permits: Arc<Semaphore>,
    pub vapid_keys: VapidKeyPair,
}

impl AppState {
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
