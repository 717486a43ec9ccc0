//! `WS /api/terminal/{id}?mode=interactive|spectator`: the local
//! terminal attach bridge. Two cooperating directions run inside one
//! `tokio::select!` loop; cancelling either tears down the other, and the
//! multiplexer session is never signaled — only the attach child.

use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use axum::extract::{Path, Query, State, WebSocketUpgrade};
use axum::response::Response;
use fleetdeck_terminal::Attach;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct TerminalQuery {
    #[serde(default)]
    pub mode: Option<String>,
}

/// Control message recognized on text frames from the client.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ControlMessage {
    Resize { rows: u16, cols: u16 },
}

pub async fn terminal_ws(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<TerminalQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let spectator = query.mode.as_deref() == Some("spectator");
    let name = state.mux.session_name(&id);

    if !state.mux.exists(&name).await {
        return ws.on_upgrade(move |mut socket| async move {
            let _ = socket
                .send(Message::Close(Some(CloseFrame {
                    code: 4004,
                    reason: "Session not found".into(),
                })))
                .await;
        });
    }

    ws.on_upgrade(move |socket| async move {
        bridge(socket, state, name, spectator).await;
    })
}

async fn bridge(mut socket: WebSocket, state: Arc<AppState>, name: String, spectator: bool) {
    let mut attach = match Attach::spawn(&state.mux, &name, spectator, 24, 80) {
        Ok(a) => a,
        Err(e) => {
            warn!(session = %name, error = %e, "failed to open attach bridge");
            let _ = socket
                .send(Message::Close(Some(CloseFrame {
                    code: 4500,
                    reason: e.to_string().into(),
                })))
                .await;
            return;
        }
    };

    loop {
        tokio::select! {
            output = attach.recv() => {
                match output {
                    Some(bytes) => {
                        if socket.send(Message::Binary(bytes.into())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Binary(bytes))) => {
                        if spectator {
                            continue;
                        }
                        if let Err(e) = attach.write(&bytes) {
                            warn!(session = %name, error = %e, "attach write failed");
                            break;
                        }
                    }
                    Some(Ok(Message::Text(text))) => {
                        if let Ok(ControlMessage::Resize { rows, cols }) = serde_json::from_str(&text) {
                            let _ = attach.resize(rows, cols);
                            let _ = state.mux.resize(&name, rows, cols).await;
                        } else if !spectator {
                            if let Err(e) = attach.write(text.as_bytes()) {
                                warn!(session = %name, error = %e, "attach write failed");
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        debug!(session = %name, error = %e, "websocket receive error");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    attach.close().await;
}
