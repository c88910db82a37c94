use std::sync::Arc;

use montage_core::config::GenerationSettings;
use montage_core::lifecycle::Transition;
use montage_core::registry::ModelRegistry;
use montage_db::{AssetStore, TaskEnqueuer, TransitionOutcome};
use montage_storage::Storage;
use tracing::{debug, error};
use uuid::Uuid;

use crate::client::ProviderClient;
use crate::error::GenerationError;
use crate::notifier::Notifier;

/// Everything the dispatcher and poller share.
#[derive(Clone)]
pub struct GenerationServices {
    pub assets: Arc<dyn AssetStore>,
    pub registry: Arc<dyn ModelRegistry>,
    pub queue: Arc<dyn TaskEnqueuer>,
    pub storage: Arc<dyn Storage>,
    pub notifier: Notifier,
    pub client: ProviderClient,
}

impl GenerationServices {
    pub fn settings(&self) -> &GenerationSettings {
        self.client.settings()
    }

    /// Apply a transition and notify the project when it took effect.
    pub(crate) async fn transition(
        &self,
        asset_id: Uuid,
        transition: Transition,
    ) -> Result<TransitionOutcome, GenerationError> {
        let outcome = self.assets.apply_transition(asset_id, &transition).await?;

        if outcome.applied {
            self.notifier
                .notify_asset(outcome.project_id, &outcome.asset)
                .await;
        } else {
            debug!(
                asset_id = %asset_id,
                status = %outcome.asset.status,
                target = %transition.target(),
                "Transition skipped"
            );
        }

        Ok(outcome)
    }

    /// Record a terminal failure. Errors are logged, never returned.
    pub(crate) async fn fail_asset(&self, asset_id: Uuid, message: &str) {
        let transition = Transition::Failed {
            error_message: message.to_string(),
        };
        if let Err(e) = self.transition(asset_id, transition).await {
            error!(
                error = %e,
                asset_id = %asset_id,
                "Failed to record generation failure"
            );
        }
    }
}
