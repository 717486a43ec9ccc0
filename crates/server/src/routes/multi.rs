//! `GET /api/multi/{dashboard,sessions,search}` and the host-routed control
//! proxies. Aggregation issues parallel calls to each peer's equivalent
//! non-aggregate endpoint; unreachable peers are dropped, never failed.
//! Control proxying dispatches locally when `host` matches this node's
//! hostname, otherwise forwards over HTTP (or, for the terminal
//! WebSocket, proxies frames bidirectionally).

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, Query, State, WebSocketUpgrade};
use axum::response::Response;
use axum::Json;
use futures_util::future::join_all;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio_tungstenite::tungstenite;
use tracing::warn;

use crate::error::{ApiError, ApiResult};
use crate::federation::fetch_peer_json;
use crate::routes::dashboard::DashboardResponse;
use crate::routes::search::SearchQuery;
use crate::routes::sessions::{InjectRequest, ListQuery, SessionListResponse};
use crate::state::AppState;

#[derive(Debug, Clone, Serialize)]
pub struct HostedSession {
    pub hostname: String,
    #[serde(flatten)]
    pub row: fleetdeck_db::SessionRow,
}

#[derive(Debug, Clone, Serialize)]
pub struct HostedSearchHit {
    pub hostname: String,
    #[serde(flatten)]
    pub hit: fleetdeck_db::SearchHit,
}

#[derive(Debug, Serialize)]
pub struct MultiSessionsResponse {
    pub sessions: Vec<HostedSession>,
    pub total: i64,
}

pub async fn multi_sessions(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<MultiSessionsResponse>> {
    let local = crate::routes::sessions::list_sessions(State(state.clone()), Query(query.clone()))
        .await?
        .0;
    let mut merged: Vec<HostedSession> = local
        .sessions
        .into_iter()
        .map(|row| HostedSession { hostname: state.config.hostname.clone(), row })
        .collect();

    let qs = to_query_string(&query);
    let path = format!("/api/sessions?{qs}");
    let peer_pages = join_all(
        state
            .peers
            .iter()
            .map(|peer| fetch_peer_json::<SessionListResponse>(&state.http, peer, &path)),
    )
    .await;
    for (peer, page) in state.peers.iter().zip(peer_pages) {
        if let Some(page) = page {
            merged.extend(
                page.sessions
                    .into_iter()
                    .map(|row| HostedSession { hostname: peer.hostname.clone(), row }),
            );
        }
    }

    merged.sort_by(|a, b| b.row.last_message_timestamp.cmp(&a.row.last_message_timestamp));

    let offset = query.offset.unwrap_or(0).max(0) as usize;
    let limit = query.limit.filter(|l| *l > 0).map(|l| l as usize);
    let total = merged.len() as i64;
    let sessions = match limit {
        Some(limit) => merged.into_iter().skip(offset).take(limit).collect(),
        None => merged.into_iter().skip(offset).collect(),
    };

    Ok(Json(MultiSessionsResponse { sessions, total }))
}

#[derive(Debug, Serialize)]
pub struct MultiSearchResponse {
    pub hits: Vec<HostedSearchHit>,
}

pub async fn multi_search(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SearchQuery>,
) -> ApiResult<Json<MultiSearchResponse>> {
    let local_hits = crate::routes::search::search(State(state.clone()), Query(SearchQuery {
        q: query.q.clone(),
        project: query.project.clone(),
        after: query.after.clone(),
        before: query.before.clone(),
        limit: query.limit,
    }))
    .await?
    .0;

    let mut merged: Vec<HostedSearchHit> = local_hits
        .into_iter()
        .map(|hit| HostedSearchHit { hostname: state.config.hostname.clone(), hit })
        .collect();

    let mut qs = format!("q={}", urlencoding_escape(&query.q));
    if let Some(p) = &query.project {
        qs.push_str(&format!("&project={}", urlencoding_escape(p)));
    }
    if let Some(a) = &query.after {
        qs.push_str(&format!("&after={}", urlencoding_escape(a)));
    }
    if let Some(b) = &query.before {
        qs.push_str(&format!("&before={}", urlencoding_escape(b)));
    }
    if let Some(l) = query.limit {
        qs.push_str(&format!("&limit={l}"));
    }

    let path = format!("/api/search?{qs}");
    let peer_hits = join_all(
        state
            .peers
            .iter()
            .map(|peer| fetch_peer_json::<Vec<fleetdeck_db::SearchHit>>(&state.http, peer, &path)),
    )
    .await;
    for (peer, hits) in state.peers.iter().zip(peer_hits) {
        if let Some(hits) = hits {
            merged.extend(hits.into_iter().map(|hit| HostedSearchHit { hostname: peer.hostname.clone(), hit }));
        }
    }

    merged.sort_by(|a, b| b.hit.timestamp.cmp(&a.hit.timestamp));
    Ok(Json(MultiSearchResponse { hits: merged }))
}

pub async fn multi_dashboard(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<DashboardResponse>> {
    let mut response = crate::routes::dashboard::dashboard(State(state.clone())).await?.0;

    let peer_dashboards = join_all(
        state
            .peers
            .iter()
            .map(|peer| fetch_peer_json::<DashboardResponse>(&state.http, peer, "/api/dashboard")),
    )
    .await;
    for peer_dash in peer_dashboards.into_iter().flatten() {
        response.active_session_ids.extend(peer_dash.active_session_ids);
        response.recent_sessions.extend(peer_dash.recent_sessions);
        merge_tool_histograms(&mut response.recent_tool_uses, peer_dash.recent_tool_uses);
        merge_token_rollups(&mut response.token_rollup, peer_dash.token_rollup);
    }

    response
        .recent_sessions
        .sort_by(|a, b| b.last_message_timestamp.cmp(&a.last_message_timestamp));
    response.recent_tool_uses.sort_by(|a, b| b.count.cmp(&a.count));

    Ok(Json(response))
}

fn merge_tool_histograms(local: &mut Vec<fleetdeck_db::ToolHistogramEntry>, peer: Vec<fleetdeck_db::ToolHistogramEntry>) {
    for entry in peer {
        if let Some(existing) = local.iter_mut().find(|e| e.tool_name == entry.tool_name) {
            existing.count += entry.count;
        } else {
            local.push(entry);
        }
    }
}

fn merge_token_rollups(local: &mut Vec<fleetdeck_db::TokenRollupEntry>, peer: Vec<fleetdeck_db::TokenRollupEntry>) {
    for entry in peer {
        if let Some(existing) = local.iter_mut().find(|e| e.group_key == entry.group_key) {
            existing.input_tokens += entry.input_tokens;
            existing.output_tokens += entry.output_tokens;
            existing.cache_read += entry.cache_read;
            existing.cache_create += entry.cache_create;
            existing.session_count += entry.session_count;
            existing.estimated_cost_usd =
                ((existing.estimated_cost_usd + entry.estimated_cost_usd) * 100.0).round() / 100.0;
        } else {
            local.push(entry);
        }
    }
}

fn to_query_string(query: &ListQuery) -> String {
    let mut parts = Vec::new();
    if let Some(status) = &query.status {
        parts.push(format!("status={status}"));
    }
    if let Some(project) = &query.project {
        parts.push(format!("project={}", urlencoding_escape(project)));
    }
    if let Some(limit) = query.limit {
        parts.push(format!("limit={limit}"));
    }
    if let Some(offset) = query.offset {
        parts.push(format!("offset={offset}"));
    }
    parts.join("&")
}

fn urlencoding_escape(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '~') {
            c.to_string()
        } else {
            format!("%{:02X}", c as u32)
        })
        .collect()
}

/// `POST /api/multi/sessions/{host}/{id}/join`: dispatch locally when `host`
/// matches this node, otherwise forward over HTTP. Peer errors map to 502.
pub async fn multi_join(
    State(state): State<Arc<AppState>>,
    Path((host, id)): Path<(String, String)>,
) -> ApiResult<Json<serde_json::Value>> {
    if host == state.config.hostname {
        let joined = crate::routes::sessions::join_session(State(state), Path(id)).await?;
        return Ok(Json(serde_json::to_value(joined.0).unwrap_or_default()));
    }

    let peer = find_peer(&state, &host)?;
    let url = format!("{}/api/sessions/{}/join", peer.url.trim_end_matches('/'), id);
    let resp = state
        .http
        .post(&url)
        .send()
        .await
        .map_err(|e| ApiError::Peer(e.to_string()))?;
    if !resp.status().is_success() {
        return Err(ApiError::Peer(format!("peer returned {}", resp.status())));
    }
    let body: serde_json::Value = resp.json().await.map_err(|e| ApiError::Peer(e.to_string()))?;
    Ok(Json(body))
}

/// `POST /api/multi/terminal/{host}/{id}/inject`.
pub async fn multi_inject(
    State(state): State<Arc<AppState>>,
    Path((host, id)): Path<(String, String)>,
    Json(req): Json<InjectRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    if host == state.config.hostname {
        let injected = crate::routes::sessions::inject(State(state), Path(id), Json(req)).await?;
        return Ok(Json(injected.0));
    }

    let peer = find_peer(&state, &host)?;
    let url = format!("{}/api/terminal/{}/inject", peer.url.trim_end_matches('/'), id);
    let resp = state
        .http
        .post(&url)
        .json(&req)
        .send()
        .await
        .map_err(|e| ApiError::Peer(e.to_string()))?;
    if !resp.status().is_success() {
        return Err(ApiError::Peer(format!("peer returned {}", resp.status())));
    }
    let body: serde_json::Value = resp.json().await.map_err(|e| ApiError::Peer(e.to_string()))?;
    Ok(Json(body))
}

#[derive(Debug, Deserialize)]
pub struct MultiTerminalQuery {
    #[serde(default)]
    pub mode: Option<String>,
}

/// `WS /api/multi/terminal/{host}/{id}`: local dispatch reuses the single-node
/// bridge; a non-local host opens a peer WebSocket and forwards frames both
/// ways until either side closes.
pub async fn multi_terminal_ws(
    State(state): State<Arc<AppState>>,
    Path((host, id)): Path<(String, String)>,
    Query(query): Query<MultiTerminalQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    if host == state.config.hostname {
        return crate::routes::terminal::terminal_ws(
            State(state),
            Path(id),
            Query(crate::routes::terminal::TerminalQuery { mode: query.mode }),
            ws,
        )
        .await;
    }

    let peer = match state.peers.iter().find(|p| p.hostname == host).cloned() {
        Some(p) => p,
        None => {
            return ws.on_upgrade(|mut socket| async move {
                let _ = socket
                    .send(Message::Close(Some(axum::extract::ws::CloseFrame {
                        code: 4004,
                        reason: "unknown peer".into(),
                    })))
                    .await;
            });
        }
    };

    ws.on_upgrade(move |socket| async move {
        proxy_to_peer(socket, peer, id, query.mode).await;
    })
}

async fn proxy_to_peer(client_socket: WebSocket, peer: crate::federation::Peer, id: String, mode: Option<String>) {
    let scheme = if peer.url.starts_with("https") { "wss" } else { "ws" };
    let host_part = peer
        .url
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .trim_end_matches('/');
    let mut url = format!("{scheme}://{host_part}/api/terminal/{id}");
    if let Some(mode) = mode {
        url.push_str(&format!("?mode={mode}"));
    }

    let (peer_stream, _) = match tokio_tungstenite::connect_async(&url).await {
        Ok(pair) => pair,
        Err(e) => {
            warn!(url = %url, error = %e, "failed to connect to peer terminal websocket");
            return;
        }
    };

    let (mut peer_tx, mut peer_rx) = peer_stream.split();
    let (mut client_tx, mut client_rx) = client_socket.split();

    let to_peer = async {
        while let Some(Ok(msg)) = client_rx.next().await {
            let forwarded = match msg {
                Message::Binary(b) => tungstenite::Message::Binary(b.to_vec().into()),
                Message::Text(t) => tungstenite::Message::Text(t.to_string().into()),
                Message::Close(_) => break,
                _ => continue,
            };
            if peer_tx.send(forwarded).await.is_err() {
                break;
            }
        }
    };

    let to_client = async {
        while let Some(Ok(msg)) = peer_rx.next().await {
            let forwarded = match msg {
                tungstenite::Message::Binary(b) => Message::Binary(b.to_vec().into()),
                tungstenite::Message::Text(t) => Message::Text(t.to_string().into()),
                tungstenite::Message::Close(_) => break,
                _ => continue,
            };
            if client_tx.send(forwarded).await.is_err() {
                break;
            }
        }
    };

    tokio::select! {
        _ = to_peer => {}
        _ = to_client => {}
    }
}

fn find_peer<'a>(state: &'a AppState, host: &str) -> ApiResult<&'a crate::federation::Peer> {
    state
        .peers
        .iter()
        .find(|p| p.hostname == host)
        .ok_or_else(|| ApiError::BadRequest(format!("unknown peer host: {host}")))
}
