//! Push subscription storage: Web Push endpoints and native device tokens.

use crate::{Database, DbResult};
use chrono::Utc;
use serde::Serialize;
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct WebPushSubscription {
    pub endpoint: String,
    pub p256dh: String,
    pub auth: String,
    pub user_agent: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct DeviceSubscription {
    pub device_token: String,
    pub platform: String,
    pub registered_at: String,
}

impl Database {
    pub async fn upsert_web_push_subscription(
        &self,
        endpoint: &str,
        p256dh: &str,
        auth: &str,
        user_agent: Option<&str>,
    ) -> DbResult<()> {
        sqlx::query(
            r#"INSERT INTO push_subscriptions (endpoint, p256dh, auth, user_agent, created_at)
               VALUES (?, ?, ?, ?, ?)
               ON CONFLICT(endpoint) DO UPDATE SET
                   p256dh = excluded.p256dh, auth = excluded.auth, user_agent = excluded.user_agent"#,
        )
        .bind(endpoint)
        .bind(p256dh)
        .bind(auth)
        .bind(user_agent)
        .bind(Utc::now().to_rfc3339())
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn remove_web_push_subscription(&self, endpoint: &str) -> DbResult<()> {
        sqlx::query("DELETE FROM push_subscriptions WHERE endpoint = ?")
            .bind(endpoint)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn list_web_push_subscriptions(&self) -> DbResult<Vec<WebPushSubscription>> {
        let rows = sqlx::query_as("SELECT * FROM push_subscriptions")
            .fetch_all(self.pool())
            .await?;
        Ok(rows)
    }

    pub async fn register_device(&self, device_token: &str, platform: &str) -> DbResult<()> {
        sqlx::query(
            r#"INSERT INTO push_devices (device_token, platform, registered_at)
               VALUES (?, ?, ?)
               ON CONFLICT(device_token) DO UPDATE SET platform = excluded.platform"#,
        )
        .bind(device_token)
        .bind(platform)
        .bind(Utc::now().to_rfc3339())
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn unregister_device(&self, device_token: &str) -> DbResult<()> {
        sqlx::query("DELETE FROM push_devices WHERE device_token = ?")
            .bind(device_token)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn list_devices(&self) -> DbResult<Vec<DeviceSubscription>> {
        let rows = sqlx::query_as("SELECT * FROM push_devices")
            .fetch_all(self.pool())
            .await?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upsert_then_list_web_push_subscription() {
        let db = Database::new_in_memory().await.unwrap();
        db.upsert_web_push_subscription("https://push.example/1", "key", "auth", Some("ua"))
            .await
            .unwrap();
        let subs = db.list_web_push_subscriptions().await.unwrap();
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].endpoint, "https://push.example/1");

        db.remove_web_push_subscription("https://push.example/1")
            .await
            .unwrap();
        assert!(db.list_web_push_subscriptions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn register_and_unregister_device() {
        let db = Database::new_in_memory().await.unwrap();
        db.register_device("tok123", "ios").await.unwrap();
        assert_eq!(db.list_devices().await.unwrap().len(), 1);
        db.unregister_device("tok123").await.unwrap();
        assert!(db.list_devices().await.unwrap().is_empty());
    }
}
