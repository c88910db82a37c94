//! Status notifications
//!
//! Every applied transition is broadcast to the asset's project group. Delivery is
//! best-effort: a failing publisher is logged and never turns a successful transition
//! into a failed task.

use std::sync::Arc;

use async_trait::async_trait;
use montage_core::models::{project_group, Asset, AssetStatusEvent};
use tracing::{debug, warn};
use uuid::Uuid;

/// Transport for status events.
#[async_trait]
pub trait StatusPublisher: Send + Sync {
    async fn publish(&self, group: &str, event: &AssetStatusEvent) -> anyhow::Result<()>;
}

/// Publisher that drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPublisher;

#[async_trait]
impl StatusPublisher for NoopPublisher {
    async fn publish(&self, group: &str, event: &AssetStatusEvent) -> anyhow::Result<()> {
        debug!(group = %group, asset_id = %event.asset_id, "Notifications disabled, dropping event");
        Ok(())
    }
}

#[derive(Clone)]
pub struct Notifier {
    publisher: Arc<dyn StatusPublisher>,
}

impl Notifier {
    pub fn new(publisher: Arc<dyn StatusPublisher>) -> Self {
        Self { publisher }
    }

    pub fn noop() -> Self {
        Self::new(Arc::new(NoopPublisher))
    }

    pub async fn notify(&self, project_id: Uuid, event: AssetStatusEvent) {
        let group = project_group(project_id);
        if let Err(e) = self.publisher.publish(&group, &event).await {
            warn!(
                error = %e,
                group = %group,
                asset_id = %event.asset_id,
                status = %event.status,
                "Failed to publish asset status event"
            );
        }
    }

    /// Broadcast the asset's current status.
    pub async fn notify_asset(&self, project_id: Uuid, asset: &Asset) {
        self.notify(project_id, AssetStatusEvent::from_asset(asset))
            .await
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::noop()
    }
}
