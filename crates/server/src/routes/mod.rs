//! HTTP/WS surface assembly: every route nests under `/api`.

pub mod admin;
pub mod analytics;
pub mod dashboard;
pub mod health;
pub mod machines;
pub mod multi;
pub mod push;
pub mod search;
pub mod sessions;
pub mod stream;
pub mod terminal;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    let api = Router::new()
        .route("/health", get(health::health))
        .route("/dashboard", get(dashboard::dashboard))
        .route("/dashboard/stream", get(stream::dashboard_stream))
        .route("/needs-input", get(stream::needs_input))
        .route("/search", get(search::search))
        .route("/analytics/tokens", get(analytics::tokens))
        .route("/analytics/tools", get(analytics::tools))
        .route("/reindex", post(admin::reindex))
        .route("/machines", get(machines::machines))
        .route("/sessions", get(sessions::list_sessions).post(sessions::spawn_session))
        .route("/sessions/{id}", get(sessions::session_detail).delete(sessions::terminate_session))
        .route("/sessions/{id}/conversation", get(sessions::conversation))
        .route("/sessions/{id}/stream", get(stream::session_stream))
        .route("/sessions/{id}/join", post(sessions::join_session))
        .route("/terminal/{id}", get(terminal::terminal_ws))
        .route("/terminal/{id}/inject", post(sessions::inject))
        .route("/push/vapid-key", get(push::vapid_key))
        .route("/push/subscribe", post(push::subscribe))
        .route("/push/register", post(push::register_device).delete(push::unregister_device))
        .route("/multi/dashboard", get(multi::multi_dashboard))
        .route("/multi/sessions", get(multi::multi_sessions))
        .route("/multi/search", get(multi::multi_search))
        .route("/multi/sessions/{host}/{id}/join", post(multi::multi_join))
        .route("/multi/terminal/{host}/{id}", get(multi::multi_terminal_ws))
        .route("/multi/terminal/{host}/{id}/inject", post(multi::multi_inject));

    Router::new().nest("/api", api)
}
