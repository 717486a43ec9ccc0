//! Shared SSE plumbing for the dashboard and per-session streams.
//!
//! Each stream subscribes to one bus topic, forwards events as
//! `event: <type>\ndata: <json>`, and relies on axum's built-in keep-alive
//! to emit `: keepalive` every 30 s. The process-wide connection cap is
//! enforced by acquiring a permit before subscribing; the permit is held
//! for the stream's lifetime and released automatically when the client
//! disconnects and the stream is dropped.

use std::convert::Infallible;
use std::time::Duration;

use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::http::StatusCode;
use tokio_stream::Stream;

use crate::state::AppState;

const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// Holds the connection-cap semaphore permit for the stream's lifetime and
/// keeps the `sse_active_connections` gauge in step with actual usage.
struct ConnectionGuard {
    _permit: tokio::sync::OwnedSemaphorePermit,
}

impl ConnectionGuard {
    fn new(permit: tokio::sync::OwnedSemaphorePermit) -> Self {
        crate::metrics::bump_sse_active_connections(1);
        ConnectionGuard { _permit: permit }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        crate::metrics::bump_sse_active_connections(-1);
    }
}

/// Subscribe to `topic` and return a ready-to-serve SSE response, or
/// `429 Too Many Requests` if the connection cap is exhausted.
pub async fn stream_topic(
    state: &AppState,
    topic: String,
) -> Result<Sse<impl Stream<Item = Result<SseEvent, Infallible>>>, StatusCode> {
    let permit = state
        .sse_permits
        .clone()
        .try_acquire_owned()
        .map_err(|_| StatusCode::TOO_MANY_REQUESTS)?;
    let guard = ConnectionGuard::new(permit);

    let bus = state.bus.clone();
    let stream = async_stream::stream! {
        let _guard = guard;
        let sub = bus.subscribe(topic).await;
        loop {
            let event = sub.recv().await;
            let name = event.sse_event_name();
            let data = serde_json::to_string(&event).unwrap_or_default();
            yield Ok(SseEvent::default().event(name).data(data));
        }
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(KEEPALIVE_INTERVAL).text("keepalive")))
}
