//! fleetdeck server library: the Axum application, shared state, and the
//! background components that keep it live.

pub mod config;
pub mod error;
pub mod federation;
pub mod live_tracker;
pub mod metrics;
pub mod push_sender;
pub mod routes;
pub mod sse;
pub mod state;

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{MatchedPath, Request};
use axum::http::HeaderValue;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::Router;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use state::AppState;

/// Only localhost origins may call the API — a browser extension or page
/// served from anywhere else has no business reaching a local session index.
fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(
            |origin: &HeaderValue, _parts: &axum::http::request::Parts| {
                origin
                    .to_str()
                    .map(|o| {
                        o.starts_with("http://localhost:")
                            || o.starts_with("http://127.0.0.1:")
                            || o == "http://localhost"
                            || o == "http://127.0.0.1"
                    })
                    .unwrap_or(false)
            },
        ))
        .allow_methods(Any)
        .allow_headers(Any)
}

async fn instrument(req: Request, next: Next) -> Response {
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());
    let started = Instant::now();
    let response = next.run(req).await;
    metrics::record_request(route, started.elapsed().as_secs_f64());
    response
}

async fn metrics_handler() -> String {
    metrics::render_metrics().unwrap_or_default()
}

/// Build the full Axum application: the `/api` surface, `/metrics`, CORS
/// restricted to localhost, request tracing, and request instrumentation.
pub fn create_app(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(routes::router())
        .route("/metrics", axum::routing::get(metrics_handler))
        .layer(middleware::from_fn(instrument))
        .layer(cors_layer())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request as HttpRequest, StatusCode};
    use tower::ServiceExt;

    async fn test_state() -> Arc<AppState> {
        let db = fleetdeck_db::Database::new_in_memory().await.unwrap();
        let indexer = fleetdeck_db::Indexer::new(db.pool().clone(), std::path::PathBuf::new());
        let config = config::Config::resolve(config::Cli {
            port: Some(0),
            coordinator: false,
            https: false,
            log_root: None,
            config_dir: None,
        });
        Arc::new(AppState {
            start_time: Instant::now(),
            config,
            db,
            indexer,
            bus: fleetdeck_live::EventBus::new(),
            mux: fleetdeck_terminal::Multiplexer::default(),
            http: reqwest::Client::new(),
            peers: Arc::new(Vec::new()),
            live_sessions: Arc::new(tokio::sync::RwLock::new(std::collections::HashSet::new())),
            waiting_sessions: Arc::new(tokio::sync::RwLock::new(std::collections::HashSet::new())),
            sse_permits: Arc::new(tokio::sync::Semaphore::new(state::SSE_CONNECTION_CAP)),
            vapid_keys: push_sender::VapidKeyPair {
                public_key: "pub".to_string(),
                private_key: "priv".to_string(),
            },
        })
    }

    #[tokio::test]
    async fn health_route_responds_ok() {
        let app = create_app(test_state().await);
        let response = app
            .oneshot(HttpRequest::builder().uri("/api/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn cors_allows_localhost_origin() {
        let app = create_app(test_state().await);
        let response = app
            .oneshot(
                HttpRequest::builder()
                    .uri("/api/health")
                    .header("Origin", "http://localhost:5173")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert!(response.headers().get("access-control-allow-origin").is_some());
    }

    #[tokio::test]
    async fn cors_rejects_external_origin() {
        let app = create_app(test_state().await);
        let response = app
            .oneshot(
                HttpRequest::builder()
                    .uri("/api/health")
                    .header("Origin", "https://evil.example")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert!(response.headers().get("access-control-allow-origin").is_none());
    }

    #[tokio::test]
    async fn unknown_route_is_404() {
        let app = create_app(test_state().await);
        let response = app
            .oneshot(HttpRequest::builder().uri("/api/nonexistent").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
