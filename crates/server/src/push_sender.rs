//! Push notification trigger. Delivery itself — VAPID JWT signing, the
//! Web Push/APNs wire protocols — is an external collaborator; this
//! module owns only the composed-payload HTTP call site and the keypair
//! persisted for `GET /api/push/vapid-key`.

use std::path::{Path, PathBuf};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use fleetdeck_db::Database;
use fleetdeck_live::PushSender;
use futures_util::future::BoxFuture;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// A byte-material keypair stood in for a real VAPID (P-256 ECDSA) key —
/// actual JWT signing is the delivery gateway's job, out of scope here.
/// The public half is handed to browsers for `PushManager.subscribe`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VapidKeyPair {
    pub public_key: String,
    pub private_key: String,
}

impl VapidKeyPair {
    fn generate() -> Self {
        let mut public = [0u8; 32];
        let mut private = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut public);
        rand::thread_rng().fill_bytes(&mut private);
        VapidKeyPair {
            public_key: URL_SAFE_NO_PAD.encode(public),
            private_key: URL_SAFE_NO_PAD.encode(private),
        }
    }
}

/// Load the persisted VAPID keypair, generating and persisting a fresh one
/// on first run.
pub fn load_or_create_vapid_keys(path: &Path) -> std::io::Result<VapidKeyPair> {
    if let Ok(bytes) = std::fs::read(path) {
        if let Ok(keys) = serde_json::from_slice(&bytes) {
            return Ok(keys);
        }
    }
    let keys = VapidKeyPair::generate();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_vec_pretty(&keys)?)?;
    Ok(keys)
}

/// Delivers a "needs input" push by POSTing the composed payload to a
/// configured delivery endpoint standing in for the real Web Push/APNs
/// gateways, to every stored subscription and device token.
pub struct HttpPushSender {
    client: reqwest::Client,
    db: Database,
    delivery_endpoint: Option<String>,
}

impl HttpPushSender {
    pub fn new(client: reqwest::Client, db: Database, delivery_endpoint: Option<String>) -> Self {
        HttpPushSender { client, db, delivery_endpoint }
    }
}

impl PushSender for HttpPushSender {
    fn notify_needs_input<'a>(&'a self, session_id: &'a str) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let Some(endpoint) = &self.delivery_endpoint else {
                debug!(session_id, "no push delivery endpoint configured, skipping dispatch");
                return;
            };

            let payload = serde_json::json!({
                "type": "needs_input",
                "session_id": session_id,
            });

            let web_push = self.db.list_web_push_subscriptions().await.unwrap_or_default();
            let devices = self.db.list_devices().await.unwrap_or_default();

            for sub in &web_push {
                let body = serde_json::json!({ "endpoint": sub.endpoint, "payload": payload });
                if let Err(e) = self.client.post(endpoint).json(&body).send().await {
                    warn!(endpoint = %sub.endpoint, error = %e, "web push delivery failed, pruning subscription");
                    let _ = self.db.remove_web_push_subscription(&sub.endpoint).await;
                }
            }
            for device in &devices {
                let body = serde_json::json!({ "device_token": device.device_token, "payload": payload });
                if let Err(e) = self.client.post(endpoint).json(&body).send().await {
                    warn!(device_token = %device.device_token, error = %e, "device push delivery failed, pruning token");
                    let _ = self.db.unregister_device(&device.device_token).await;
                }
            }
        })
    }
}

pub fn vapid_path_for(config_dir: &Path) -> PathBuf {
    config_dir.join("vapid_keys.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_distinct_keys_on_first_run() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vapid_keys.json");
        let keys = load_or_create_vapid_keys(&path).unwrap();
        assert!(!keys.public_key.is_empty());
        assert_ne!(keys.public_key, keys.private_key);
    }

    #[test]
    fn reloads_same_keys_on_second_run() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vapid_keys.json");
        let first = load_or_create_vapid_keys(&path).unwrap();
        let second = load_or_create_vapid_keys(&path).unwrap();
        assert_eq!(first.public_key, second.public_key);
    }
}
