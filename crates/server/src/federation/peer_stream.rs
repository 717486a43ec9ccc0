//! Coordinator-side peer SSE ingestion ("Live updates across peers").
//!
//! On startup, the coordinator opens one SSE client connection per peer's
//! dashboard stream, re-tags incoming events with `hostname` if absent, and
//! republishes them to the local global and session topics. Each client
//! reconnects with a fixed 5 s backoff after any failure — no exponential
//! backoff, matching the original's fixed-interval reconnect loop.

use std::time::Duration;

use futures_util::StreamExt;
use fleetdeck_live::{Event, EventBus};
use tracing::{debug, info, warn};

use super::Peer;

const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Spawn one reconnecting SSE client per peer. Each runs forever in its own
/// task; the coordinator does not wait on them.
pub fn spawn_peer_streams(client: reqwest::Client, peers: Vec<Peer>, bus: EventBus) {
    for peer in peers {
        let client = client.clone();
        let bus = bus.clone();
        tokio::spawn(async move {
            loop {
                if let Err(e) = stream_one_peer(&client, &peer, &bus).await {
                    warn!(peer = %peer.hostname, error = %e, "peer SSE stream ended, reconnecting");
                }
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        });
    }
}

async fn stream_one_peer(client: &reqwest::Client, peer: &Peer, bus: &EventBus) -> anyhow::Result<()> {
    let url = format!("{}/api/dashboard/stream", peer.url.trim_end_matches('/'));
    info!(peer = %peer.hostname, %url, "connecting to peer dashboard stream");

    let response = client.get(&url).send().await?;
    let mut byte_stream = response.bytes_stream();
    let mut buf = String::new();

    while let Some(chunk) = byte_stream.next().await {
        let chunk = chunk?;
        buf.push_str(&String::from_utf8_lossy(&chunk));

        while let Some(pos) = buf.find("\n\n") {
            let frame = buf[..pos].to_string();
            buf.drain(..pos + 2);
            if let Some(event) = parse_sse_frame(&frame) {
                let tagged = event.with_hostname_if_absent(&peer.hostname);
                bus.publish_session(tagged).await;
            }
        }
    }
    Ok(())
}

/// Parse one `event: <type>\ndata: <json>` SSE frame into an [`Event`].
/// Keepalive comment frames (`: keepalive`) carry no `data:` line and
/// naturally yield `None`.
fn parse_sse_frame(frame: &str) -> Option<Event> {
    let mut data = None;
    for line in frame.lines() {
        if let Some(payload) = line.strip_prefix("data: ") {
            data = Some(payload);
        }
    }
    let data = data?;
    match serde_json::from_str::<Event>(data) {
        Ok(event) => Some(event),
        Err(e) => {
            debug!(error = %e, "skipping unparsable peer SSE frame");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_new_message_frame() {
        let frame = "event: new_message\ndata: {\"type\":\"new_message\",\"session_id\":\"s1\",\"role\":\"assistant\",\"preview\":\"hi\",\"timestamp\":\"t\"}";
        let event = parse_sse_frame(frame).unwrap();
        assert_eq!(event.session_id(), "s1");
    }

    #[test]
    fn keepalive_comment_yields_none() {
        assert!(parse_sse_frame(": keepalive").is_none());
    }
}
