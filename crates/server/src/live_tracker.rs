//! Shared live-process snapshot. A single background task polls the
//! process detector and publishes the result; every consumer (dashboard,
//! session listing's `status` filter, the needs-input detector) reads the
//! same snapshot rather than each re-running the 5 s subprocess scan.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use fleetdeck_live::ProcessDetectorConfig;
use tokio::sync::RwLock;

pub type LiveSetHandle = Arc<RwLock<HashSet<String>>>;

const POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Spawn the polling task and return the handle it publishes into.
pub fn spawn(log_root: PathBuf) -> LiveSetHandle {
    let handle: LiveSetHandle = Arc::new(RwLock::new(HashSet::new()));
    let published = handle.clone();
    tokio::spawn(async move {
        let config = ProcessDetectorConfig::default();
        let mut interval = tokio::time::interval(POLL_INTERVAL);
        loop {
            interval.tick().await;
            let live = fleetdeck_live::detect_live_sessions(&log_root, &config).await;
            *published.write().await = live;
        }
    });
    handle
}
