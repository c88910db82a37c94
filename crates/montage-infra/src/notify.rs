//! Status event publishers
//!
//! With the Postgres backend every event is sent with `pg_notify` on the project's
//! channel (`project_<uuid>`), payload being the event as JSON. Any listener on that
//! channel, such as a websocket gateway, relays it to clients.

use std::sync::Arc;

use async_trait::async_trait;
use montage_core::config::NotifyBackend;
use montage_core::models::AssetStatusEvent;
use montage_generation::{NoopPublisher, StatusPublisher};
use sqlx::PgPool;

/// Postgres refuses NOTIFY payloads of 8000 bytes or more.
const MAX_PAYLOAD_BYTES: usize = 7999;

#[cfg(feature = "notify-postgres")]
#[derive(Clone)]
pub struct PgNotifyPublisher {
    pool: PgPool,
}

#[cfg(feature = "notify-postgres")]
impl PgNotifyPublisher {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Serialize an event for NOTIFY, dropping the error text if the payload is too large.
pub fn event_payload(event: &AssetStatusEvent) -> anyhow::Result<String> {
    let payload = serde_json::to_string(event)?;
    if payload.len() <= MAX_PAYLOAD_BYTES {
        return Ok(payload);
    }

    let trimmed = AssetStatusEvent {
        error_message: event
            .error_message
            .as_ref()
            .map(|_| "error message too long, see asset".to_string()),
        ..event.clone()
    };
    Ok(serde_json::to_string(&trimmed)?)
}

#[cfg(feature = "notify-postgres")]
#[async_trait]
impl StatusPublisher for PgNotifyPublisher {
    async fn publish(&self, group: &str, event: &AssetStatusEvent) -> anyhow::Result<()> {
        let payload = event_payload(event)?;
        sqlx::query("SELECT pg_notify($1, $2)")
            .bind(group)
            .bind(&payload)
            .execute(&self.pool)
            .await?;

        tracing::debug!(group = %group, asset_id = %event.asset_id, status = %event.status, "Published asset status event");
        Ok(())
    }
}

/// Build the publisher selected by configuration.
pub fn create_publisher(backend: NotifyBackend, pool: &PgPool) -> Arc<dyn StatusPublisher> {
    match backend {
        #[cfg(feature = "notify-postgres")]
        NotifyBackend::Postgres => Arc::new(PgNotifyPublisher::new(pool.clone())),
        #[cfg(not(feature = "notify-postgres"))]
        NotifyBackend::Postgres => {
            let _ = pool;
            tracing::warn!("Postgres notifications not compiled in, events will be dropped");
            Arc::new(NoopPublisher)
        }
        NotifyBackend::Disabled => Arc::new(NoopPublisher),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use montage_core::models::AssetStatus;
    use uuid::Uuid;

    #[test]
    fn payload_is_event_json() {
        let event = AssetStatusEvent::new(
            Uuid::nil(),
            AssetStatus::Completed,
            Some("https://cdn/media/generated/a.mp4".into()),
            None,
        );
        let payload: serde_json::Value = serde_json::from_str(&event_payload(&event).unwrap()).unwrap();
        assert_eq!(payload["type"], "asset_status_changed");
        assert_eq!(payload["status"], "COMPLETED");
        assert_eq!(payload["file_url"], "https://cdn/media/generated/a.mp4");
    }

    #[test]
    fn oversized_error_is_replaced() {
        let event = AssetStatusEvent::new(
            Uuid::nil(),
            AssetStatus::Failed,
            None,
            Some("x".repeat(10_000)),
        );
        let payload = event_payload(&event).unwrap();
        assert!(payload.len() <= MAX_PAYLOAD_BYTES);
        assert!(payload.contains("error message too long"));
    }

    #[tokio::test]
    async fn disabled_backend_publishes_nothing() {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgres://localhost/montage")
            .unwrap();
        let publisher = create_publisher(NotifyBackend::Disabled, &pool);
        let event = AssetStatusEvent::new(Uuid::nil(), AssetStatus::Processing, None, None);
        publisher.publish("project_x", &event).await.unwrap();
    }
}
