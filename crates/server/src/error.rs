//! Server-wide error type and its HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use fleetdeck_db::DbError;
use fleetdeck_terminal::TerminalError;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub detail: String,
}

impl ErrorBody {
    fn new(detail: impl Into<String>) -> Self {
        ErrorBody { detail: detail.into() }
    }
}

/// Server-wide error, composed from each component's own error enum.
/// Ignorable-record and transient-I/O errors are handled inline by
/// background loops and never surface here.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Database(#[from] DbError),

    #[error(transparent)]
    Terminal(#[from] TerminalError),

    #[error("peer error: {0}")]
    Peer(String),

    #[error("rate limited")]
    RateLimited,

    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match &self {
            ApiError::SessionNotFound(id) => {
                tracing::debug!(session_id = %id, "session not found");
                (StatusCode::NOT_FOUND, self.to_string())
            }
            ApiError::BadRequest(msg) => {
                tracing::debug!(message = %msg, "bad request");
                (StatusCode::BAD_REQUEST, self.to_string())
            }
            ApiError::Database(e) => {
                tracing::error!(error = %e, "database error");
                (StatusCode::INTERNAL_SERVER_ERROR, "database error".to_string())
            }
            ApiError::Terminal(e) => match e {
                TerminalError::SessionNotFound(_) | TerminalError::InvalidWorkingDir(_) | TerminalError::InvalidResumeId(_) => {
                    tracing::debug!(error = %e, "terminal request error");
                    (StatusCode::BAD_REQUEST, e.to_string())
                }
                _ => {
                    tracing::error!(error = %e, "terminal error");
                    (StatusCode::INTERNAL_SERVER_ERROR, "terminal error".to_string())
                }
            },
            ApiError::Peer(msg) => {
                tracing::warn!(message = %msg, "peer request failed");
                (StatusCode::BAD_GATEWAY, self.to_string())
            }
            ApiError::RateLimited => {
                tracing::debug!("request rate limited");
                (StatusCode::TOO_MANY_REQUESTS, self.to_string())
            }
            ApiError::Internal(msg) => {
                tracing::error!(message = %msg, "internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
            }
        };
        (status, Json(ErrorBody::new(detail))).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[tokio::test]
    async fn session_not_found_maps_to_404() {
        let response = ApiError::SessionNotFound("s1".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let parsed: ErrorBody = serde_json::from_slice(&body).unwrap();
        assert!(parsed.detail.contains("s1"));
    }

    #[tokio::test]
    async fn rate_limited_maps_to_429() {
        let response = ApiError::RateLimited.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn peer_error_maps_to_502() {
        let response = ApiError::Peer("timeout".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }
}
