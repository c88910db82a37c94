//! Generation dispatch
//!
//! Resolves the asset's model, fills the model's request template, submits the job and
//! moves the asset to `processing`. The first status poll is scheduled only after that
//! transition has been written.

use montage_core::lifecycle::Transition;
use montage_core::models::{CheckGenerationStatusPayload, StartGenerationPayload, Task, TaskOutcome};
use montage_core::template::{substitute, GenerationContext};
use montage_core::AppError;
use montage_db::enqueue_payload;
use serde_json::json;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::error::GenerationError;
use crate::services::GenerationServices;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Job accepted by the provider and the first poll scheduled.
    Submitted {
        external_task_id: String,
        poll_task_id: Uuid,
    },
    /// Nothing to do; the asset was already dispatched or finished.
    Skipped(&'static str),
}

#[derive(Clone)]
pub struct Dispatcher {
    services: GenerationServices,
}

impl Dispatcher {
    pub fn new(services: GenerationServices) -> Self {
        Self { services }
    }

    #[instrument(skip(self), fields(asset_id = %asset_id))]
    pub async fn dispatch(&self, asset_id: Uuid) -> Result<DispatchOutcome, GenerationError> {
        let target = self
            .services
            .assets
            .load_for_generation(asset_id)
            .await?
            .ok_or_else(|| GenerationError::NotFound(format!("asset {}", asset_id)))?;
        let asset = &target.asset;

        if !asset.is_dispatchable() {
            info!(status = %asset.status, "Asset already dispatched, skipping");
            return Ok(DispatchOutcome::Skipped("asset already dispatched"));
        }

        let model_id = asset
            .ai_model_id
            .ok_or_else(|| GenerationError::Config("No AI model attached to asset".to_string()))?;
        let resolved = self
            .services
            .registry
            .resolve(model_id)
            .await
            .map_err(|e| match e {
                AppError::NotFound(_) => {
                    GenerationError::Config(format!("AI model {} is missing or inactive", model_id))
                }
                other => GenerationError::Database(other),
            })?;

        let context = GenerationContext::for_asset(
            asset.prompt_text.as_deref().unwrap_or_default(),
            &resolved.model.name,
            &asset.generation_config,
            target.parent_file_url.as_deref(),
        );
        let body = substitute(&resolved.model.request_template, &context);

        let external_task_id = self.services.client.submit(&resolved, &body).await?;
        info!(
            provider = %resolved.provider.name,
            model = %resolved.model.name,
            external_task_id = %external_task_id,
            "Generation job submitted"
        );

        let outcome = self
            .services
            .transition(
                asset_id,
                Transition::Processing {
                    external_task_id: external_task_id.clone(),
                },
            )
            .await?;
        if !outcome.applied {
            warn!(
                status = %outcome.asset.status,
                "Asset changed state during dispatch, not scheduling a poll"
            );
            return Ok(DispatchOutcome::Skipped("asset changed state during dispatch"));
        }

        let poll = CheckGenerationStatusPayload {
            asset_id,
            attempt: 1,
        };
        let poll_task_id = enqueue_payload(
            self.services.queue.as_ref(),
            &poll,
            self.services.settings().poll_interval,
        )
        .await?;

        Ok(DispatchOutcome::Submitted {
            external_task_id,
            poll_task_id,
        })
    }

    /// Run a `start_generation` task invocation.
    pub async fn handle_task(&self, task: &Task) -> TaskOutcome {
        let payload: StartGenerationPayload = match task.try_payload_as() {
            Ok(p) => p,
            Err(e) => {
                return TaskOutcome::fatal(format!("Invalid start_generation payload: {}", e))
            }
        };
        let asset_id = payload.asset_id;

        match self.dispatch(asset_id).await {
            Ok(DispatchOutcome::Submitted {
                external_task_id,
                poll_task_id,
            }) => TaskOutcome::Success(json!({
                "asset_id": asset_id,
                "external_task_id": external_task_id,
                "poll_task_id": poll_task_id,
            })),
            Ok(DispatchOutcome::Skipped(reason)) => TaskOutcome::Success(json!({
                "asset_id": asset_id,
                "skipped": reason,
            })),
            Err(e) if e.is_not_found() => {
                warn!(asset_id = %asset_id, error = %e, "Asset vanished, aborting dispatch");
                TaskOutcome::Success(json!({
                    "asset_id": asset_id,
                    "aborted": e.to_string(),
                }))
            }
            Err(e) if e.is_transport() && task.can_retry() => {
                warn!(
                    asset_id = %asset_id,
                    error = %e,
                    retry_count = task.retry_count,
                    max_retries = task.max_retries,
                    "Dispatch transport failure, retrying"
                );
                TaskOutcome::retry(self.services.settings().dispatch_retry_backoff, e.to_string())
            }
            Err(e) => {
                let message = e.to_string();
                error!(asset_id = %asset_id, error = %message, "Generation dispatch failed");
                self.services.fail_asset(asset_id, &message).await;
                TaskOutcome::fatal(message)
            }
        }
    }
}
