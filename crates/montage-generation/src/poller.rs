//! Generation status polling
//!
//! Each `check_generation_status` invocation asks the provider once. A finished job is
//! downloaded into storage and the asset completed; a failed job fails the asset; any
//! other state schedules the next attempt until the attempt ceiling is reached.
//!
//! Attempts are keyed by number in the queue, so a redelivered invocation never starts a
//! second chain. When two invocations race to the same terminal state only one
//! transition applies; the loser removes any file it stored and reports the asset as
//! already finished.

use montage_core::lifecycle::Transition;
use montage_core::models::{AssetStatus, CheckGenerationStatusPayload, Task, TaskOutcome};
use montage_db::enqueue_payload;
use serde_json::json;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::client::JobState;
use crate::error::GenerationError;
use crate::result_file::{infer_result_file, unique_result_key};
use crate::services::GenerationServices;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Completed { file_url: String },
    Failed { error_message: String },
    /// Still running; the next attempt is scheduled.
    Rescheduled { next_attempt: u32 },
    /// Still running. Nothing was scheduled (one-off check).
    Running { state: String },
    /// Still running after the last allowed attempt. The asset stays `processing`.
    Exhausted { state: String },
    /// The asset was already `completed` or `failed`.
    AlreadyFinished(AssetStatus),
}

#[derive(Clone)]
pub struct Poller {
    services: GenerationServices,
}

impl Poller {
    pub fn new(services: GenerationServices) -> Self {
        Self { services }
    }

    /// Poll as attempt `attempt` of the asset's chain, scheduling the next attempt while
    /// the job is running.
    #[instrument(skip(self), fields(asset_id = %asset_id, attempt = attempt))]
    pub async fn poll_once(&self, asset_id: Uuid, attempt: u32) -> Result<PollOutcome, GenerationError> {
        self.poll(asset_id, Some(attempt)).await
    }

    /// Ask the provider once without touching the poll chain.
    #[instrument(skip(self), fields(asset_id = %asset_id))]
    pub async fn check_once(&self, asset_id: Uuid) -> Result<PollOutcome, GenerationError> {
        self.poll(asset_id, None).await
    }

    async fn poll(&self, asset_id: Uuid, attempt: Option<u32>) -> Result<PollOutcome, GenerationError> {
        let target = self
            .services
            .assets
            .load_for_generation(asset_id)
            .await?
            .ok_or_else(|| GenerationError::NotFound(format!("asset {}", asset_id)))?;
        let asset = &target.asset;

        if asset.status.is_terminal() {
            info!(status = %asset.status, "Asset already finished, nothing to poll");
            return Ok(PollOutcome::AlreadyFinished(asset.status));
        }

        let external_task_id = asset
            .external_task_id()
            .ok_or_else(|| GenerationError::Invariant("External task id not found".to_string()))?;

        let model_id = asset
            .ai_model_id
            .ok_or_else(|| GenerationError::Config("No AI model attached to asset".to_string()))?;
        let resolved = self
            .services
            .registry
            .find(model_id)
            .await?
            .ok_or_else(|| GenerationError::Config(format!("AI model {} not found", model_id)))?;

        let state = self
            .services
            .client
            .job_status(&resolved.provider, external_task_id)
            .await?;

        match state {
            JobState::Success { result_urls } => {
                // Only the first result is kept.
                let result_url = result_urls.first().ok_or_else(|| {
                    GenerationError::Provider("Result URLs not found".to_string())
                })?;
                let (key, file_url) = self.store_result(result_url).await?;
                let outcome = self
                    .services
                    .transition(
                        asset_id,
                        Transition::Completed {
                            file_url: file_url.clone(),
                        },
                    )
                    .await?;
                if !outcome.applied {
                    self.discard_result(&key).await;
                    return Ok(PollOutcome::AlreadyFinished(outcome.asset.status));
                }
                info!(file_url = %file_url, "Generation completed");
                Ok(PollOutcome::Completed { file_url })
            }
            JobState::Failed { message } => {
                let outcome = self
                    .services
                    .transition(
                        asset_id,
                        Transition::Failed {
                            error_message: message.clone(),
                        },
                    )
                    .await?;
                if !outcome.applied {
                    return Ok(PollOutcome::AlreadyFinished(outcome.asset.status));
                }
                warn!(error = %message, "Provider reported generation failure");
                Ok(PollOutcome::Failed {
                    error_message: message,
                })
            }
            JobState::InProgress(state) => {
                let Some(attempt) = attempt else {
                    info!(state = %state, "Generation still running");
                    return Ok(PollOutcome::Running { state });
                };
                let max_attempts = self.services.settings().max_poll_attempts;
                if attempt >= max_attempts {
                    warn!(
                        state = %state,
                        max_attempts = max_attempts,
                        "Polling gave up, asset left processing"
                    );
                    return Ok(PollOutcome::Exhausted { state });
                }

                let next = CheckGenerationStatusPayload {
                    asset_id,
                    attempt: attempt + 1,
                };
                enqueue_payload(
                    self.services.queue.as_ref(),
                    &next,
                    self.services.settings().poll_interval,
                )
                .await?;
                Ok(PollOutcome::Rescheduled {
                    next_attempt: attempt + 1,
                })
            }
        }
    }

    /// Download and store the result. Returns its storage key and public URL.
    async fn store_result(&self, result_url: &str) -> Result<(String, String), GenerationError> {
        let bytes = self.services.client.download(result_url).await?;
        let file = infer_result_file(result_url);
        let key = unique_result_key(file);

        let url = self
            .services
            .storage
            .put(&key, bytes, file.content_type)
            .await?;
        info!(key = %key, content_type = file.content_type, "Stored generation result");
        Ok((key, url))
    }

    /// Remove a stored result that lost the race to complete the asset.
    async fn discard_result(&self, key: &str) {
        match self.services.storage.delete(key).await {
            Ok(_) => info!(key = %key, "Asset already finished, discarded duplicate result"),
            Err(e) => warn!(key = %key, error = %e, "Failed to discard duplicate result"),
        }
    }

    /// Run a `check_generation_status` task invocation.
    pub async fn handle_task(&self, task: &Task) -> TaskOutcome {
        let payload: CheckGenerationStatusPayload = match task.try_payload_as() {
            Ok(p) => p,
            Err(e) => {
                return TaskOutcome::fatal(format!(
                    "Invalid check_generation_status payload: {}",
                    e
                ))
            }
        };
        let asset_id = payload.asset_id;

        match self.poll_once(asset_id, payload.attempt).await {
            Ok(outcome) => TaskOutcome::Success(outcome_json(asset_id, &outcome)),
            Err(e) if e.is_not_found() => {
                warn!(asset_id = %asset_id, error = %e, "Asset vanished, aborting poll");
                TaskOutcome::Success(json!({
                    "asset_id": asset_id,
                    "aborted": e.to_string(),
                }))
            }
            Err(e) if e.is_transport() => {
                if task.can_retry() {
                    warn!(
                        asset_id = %asset_id,
                        error = %e,
                        retry_count = task.retry_count,
                        "Status poll transport failure, retrying"
                    );
                    return TaskOutcome::retry(
                        self.services.settings().poll_transport_backoff,
                        e.to_string(),
                    );
                }
                error!(
                    asset_id = %asset_id,
                    error = %e,
                    "Status poll retries exhausted, asset state left unchanged"
                );
                TaskOutcome::fatal(e.to_string())
            }
            Err(e) => {
                let message = e.to_string();
                error!(asset_id = %asset_id, error = %message, "Status poll failed");
                self.services.fail_asset(asset_id, &message).await;
                TaskOutcome::fatal(message)
            }
        }
    }
}

fn outcome_json(asset_id: Uuid, outcome: &PollOutcome) -> serde_json::Value {
    match outcome {
        PollOutcome::Completed { file_url } => json!({
            "asset_id": asset_id,
            "status": "completed",
            "file_url": file_url,
        }),
        PollOutcome::Failed { error_message } => json!({
            "asset_id": asset_id,
            "status": "failed",
            "error": error_message,
        }),
        PollOutcome::Rescheduled { next_attempt } => json!({
            "asset_id": asset_id,
            "status": "processing",
            "next_attempt": next_attempt,
        }),
        PollOutcome::Running { state } => json!({
            "asset_id": asset_id,
            "status": "processing",
            "provider_state": state,
        }),
        PollOutcome::Exhausted { state } => json!({
            "asset_id": asset_id,
            "status": "processing",
            "provider_state": state,
            "exhausted": true,
        }),
        PollOutcome::AlreadyFinished(status) => json!({
            "asset_id": asset_id,
            "status": status.to_string(),
        }),
    }
}
