//! `GET /api/push/vapid-key`, `POST /api/push/subscribe`,
//! `POST`/`DELETE /api/push/register`.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct VapidKeyResponse {
    pub public_key: String,
}

pub async fn vapid_key(State(state): State<Arc<AppState>>) -> Json<VapidKeyResponse> {
    Json(VapidKeyResponse {
        public_key: state.vapid_keys.public_key.clone(),
    })
}

#[derive(Debug, Deserialize)]
pub struct SubscribeRequest {
    pub endpoint: String,
    pub p256dh: String,
    pub auth: String,
    pub user_agent: Option<String>,
}

pub async fn subscribe(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SubscribeRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    state
        .db
        .upsert_web_push_subscription(&req.endpoint, &req.p256dh, &req.auth, req.user_agent.as_deref())
        .await?;
    Ok(Json(serde_json::json!({ "subscribed": true })))
}

#[derive(Debug, Deserialize)]
pub struct RegisterDeviceRequest {
    pub device_token: String,
    pub platform: String,
}

pub async fn register_device(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterDeviceRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    state.db.register_device(&req.device_token, &req.platform).await?;
    Ok(Json(serde_json::json!({ "registered": true })))
}

#[derive(Debug, Deserialize)]
pub struct UnregisterDeviceRequest {
    pub device_token: String,
}

pub async fn unregister_device(
    State(state): State<Arc<AppState>>,
    Json(req): Json<UnregisterDeviceRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    state.db.unregister_device(&req.device_token).await?;
    Ok(Json(serde_json::json!({ "unregistered": true })))
}
