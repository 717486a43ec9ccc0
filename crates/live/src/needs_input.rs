//! Waiting-for-input detection.
//!
//! Every [`POLL_INTERVAL`], each live session's last persisted message is
//! inspected: an assistant turn older than [`STALE_THRESHOLD`] marks the
//! session as waiting. A notification fires only on the *transition* into
//! the waiting set, gated by a per-session [`COOLDOWN`] so a session stuck
//! waiting for a long time is not re-announced every tick.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use fleetdeck_db::Database;
use tokio::sync::RwLock;
use tracing::warn;

use crate::event_bus::{Event, EventBus};
use crate::push::{PushSender, RateLimitedPush};

pub const POLL_INTERVAL: Duration = Duration::from_secs(15);
pub const STALE_THRESHOLD: Duration = Duration::from_secs(30);
pub const COOLDOWN: Duration = Duration::from_secs(300);

/// Read-only snapshot handle for `GET /api/needs-input`: the detector
/// task is the sole writer, the HTTP handler only ever reads.
pub type WaitingSetHandle = Arc<RwLock<HashSet<String>>>;

/// Drives the waiting-for-input poll loop. Owns its own cooldown and
/// waiting-set state — nothing
/// else touches these maps directly; [`WaitingSetHandle`] is a read-only
/// mirror published after each tick for the HTTP surface to poll.
pub struct NeedsInputDetector {
    db: Database,
    bus: EventBus,
    push: Option<RateLimitedPush<Box<dyn PushSender>>>,
    waiting: HashSet<String>,
    last_notified: HashMap<String, Instant>,
    published: Option<WaitingSetHandle>,
}

impl NeedsInputDetector {
    pub fn new(db: Database, bus: EventBus, push: Option<Box<dyn PushSender>>) -> Self {
        NeedsInputDetector {
            db,
            bus,
            push: push.map(RateLimitedPush::new),
            waiting: HashSet::new(),
            last_notified: HashMap::new(),
            published: None,
        }
    }

    /// Attach a handle that mirrors the waiting set after every tick.
    pub fn with_published_handle(mut self, handle: WaitingSetHandle) -> Self {
        self.published = Some(handle);
        self
    }

    /// Drive the poll loop forever over the set of currently-live session ids,
    /// refreshed each tick by `live_sessions`.
    pub async fn run<F, Fut>(mut self, mut live_sessions: F)
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = HashSet<String>>,
    {
        let mut interval = tokio::time::interval(POLL_INTERVAL);
        loop {
            interval.tick().await;
            let sessions = live_sessions().await;
            self.tick(&sessions).await;
        }
    }

    /// One detection pass, exposed separately from [`NeedsInputDetector::run`]
    /// so it is directly testable without waiting on the poll timer.
    pub async fn tick(&mut self, live_sessions: &HashSet<String>) {
        let mut currently_waiting = HashSet::new();

        for session_id in live_sessions {
            let last = match self.db.last_message(session_id).await {
                Ok(last) => last,
                Err(e) => {
                    warn!(session_id, error = %e, "needs-input lookup failed, skipping this tick");
                    continue;
                }
            };
            let Some(last) = last else { continue };
            if last.role != "assistant" {
                continue;
            }
            let Some(ts) = &last.timestamp else { continue };
            let Ok(parsed) = DateTime::parse_from_rfc3339(ts) else { continue };
            let age = Utc::now().signed_duration_since(parsed.with_timezone(&Utc));
            if age.to_std().unwrap_or(Duration::ZERO) < STALE_THRESHOLD {
                continue;
            }

            currently_waiting.insert(session_id.clone());
            let is_new_transition = !self.waiting.contains(session_id);
            let past_cooldown = self
                .last_notified
                .get(session_id)
                .map(|at| at.elapsed() >= COOLDOWN)
                .unwrap_or(true);

            if is_new_transition && past_cooldown {
                self.notify(session_id, ts).await;
                self.last_notified.insert(session_id.clone(), Instant::now());
            }
        }

        self.waiting = currently_waiting;
        self.last_notified
            .retain(|id, at| live_sessions.contains(id) || at.elapsed() < COOLDOWN);

        if let Some(handle) = &self.published {
            *handle.write().await = self.waiting.clone();
        }
    }

    async fn notify(&mut self, session_id: &str, timestamp: &str) {
        let event = Event::NeedsInput {
            session_id: session_id.to_string(),
            hostname: None,
            timestamp: timestamp.to_string(),
        };
        self.bus.publish_session(event).await;

        if let Some(push) = &mut self.push {
            push.try_notify(session_id).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetdeck_db::Indexer;
    use std::io::Write;

    async fn seeded_db_with_stale_assistant_tail() -> (Database, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let proj = dir.path().join("-tmp-demo");
        tokio::fs::create_dir_all(&proj).await.unwrap();
        let mut f = std::fs::File::create(proj.join("s1.jsonl")).unwrap();
        writeln!(
            f,
            r#"{{"type":"user","uuid":"u1","timestamp":"2020-01-01T00:00:00Z","message":{{"role":"user","content":"hello"}}}}"#
        )
        .unwrap();
        writeln!(
            f,
            r#"{{"type":"assistant","uuid":"u2","timestamp":"2020-01-01T00:00:01Z","message":{{"role":"assistant","content":"working on it"}}}}"#
        )
        .unwrap();
        let db = Database::new_in_memory().await.unwrap();
        let indexer = Indexer::new(db.pool().clone(), dir.path().to_path_buf());
        indexer.reindex_all().await.unwrap();
        (db, dir)
    }

    #[tokio::test]
    async fn stale_assistant_tail_publishes_once() {
        let (db, _dir) = seeded_db_with_stale_assistant_tail().await;
        let bus = EventBus::new();
        let sub = bus.subscribe("s1").await;
        let mut detector = NeedsInputDetector::new(db, bus, None);

        let live: HashSet<String> = ["s1".to_string()].into_iter().collect();
        detector.tick(&live).await;
        let event = sub.recv().await;
        assert_eq!(event.sse_event_name(), "needs_input");

        // Second tick: still waiting, but not a new transition, so no repeat.
        detector.tick(&live).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(tokio::time::timeout(Duration::from_millis(20), sub.recv())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn non_assistant_tail_never_triggers() {
        let dir = tempfile::tempdir().unwrap();
        let proj = dir.path().join("-tmp-demo");
        tokio::fs::create_dir_all(&proj).await.unwrap();
        let mut f = std::fs::File::create(proj.join("s1.jsonl")).unwrap();
        writeln!(
            f,
            r#"{{"type":"user","uuid":"u1","timestamp":"2020-01-01T00:00:00Z","message":{{"role":"user","content":"hello"}}}}"#
        )
        .unwrap();
        let db = Database::new_in_memory().await.unwrap();
        let indexer = Indexer::new(db.pool().clone(), dir.path().to_path_buf());
        indexer.reindex_all().await.unwrap();

        let bus = EventBus::new();
        let sub = bus.subscribe("s1").await;
        let mut detector = NeedsInputDetector::new(db, bus, None);
        let live: HashSet<String> = ["s1".to_string()].into_iter().collect();
        detector.tick(&live).await;

        assert!(tokio::time::timeout(Duration::from_millis(20), sub.recv())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn unknown_session_is_skipped_without_error() {
        let db = Database::new_in_memory().await.unwrap();
        let bus = EventBus::new();
        let mut detector = NeedsInputDetector::new(db, bus, None);
        let live: HashSet<String> = ["ghost".to_string()].into_iter().collect();
        detector.tick(&live).await;
        assert!(detector.waiting.is_empty());
    }
}
