//! Repository seams used by the generation core
//!
//! Dispatch and polling only need a narrow view of persistence: load an asset with its
//! surroundings, apply a lifecycle transition atomically, and enqueue follow-up work.
//! Keeping these as traits lets the generation crate run against in-memory doubles.

use std::time::Duration;

use async_trait::async_trait;
use montage_core::error::AppError;
use montage_core::lifecycle::Transition;
use montage_core::models::{Asset, GenerationTarget, TaskPayload, TaskType};
use uuid::Uuid;

/// Result of applying a transition under the asset row lock.
#[derive(Debug, Clone)]
pub struct TransitionOutcome {
    /// Asset state after the call (unchanged when skipped).
    pub asset: Asset,
    /// Owning project, for notifications.
    pub project_id: Uuid,
    pub applied: bool,
}

#[async_trait]
pub trait AssetStore: Send + Sync {
    /// Load an asset with its owning project and parent file location.
    async fn load_for_generation(&self, asset_id: Uuid)
        -> Result<Option<GenerationTarget>, AppError>;

    /// Re-read the asset under a row lock, check the transition against the current
    /// status and write it if allowed.
    async fn apply_transition(
        &self,
        asset_id: Uuid,
        transition: &Transition,
    ) -> Result<TransitionOutcome, AppError>;
}

#[async_trait]
pub trait TaskEnqueuer: Send + Sync {
    /// Schedule a task to run `delay` from now. Returns the task id.
    ///
    /// When a task with the same `dedupe_key` already exists, nothing is inserted and
    /// the existing task's id is returned.
    async fn enqueue(
        &self,
        task_type: TaskType,
        asset_id: Uuid,
        payload: serde_json::Value,
        delay: Duration,
        dedupe_key: Option<String>,
    ) -> Result<Uuid, AppError>;
}

/// Enqueue a typed payload.
pub async fn enqueue_payload<P: TaskPayload + Sync>(
    enqueuer: &dyn TaskEnqueuer,
    payload: &P,
    delay: Duration,
) -> Result<Uuid, AppError> {
    let value = serde_json::to_value(payload)?;
    enqueuer
        .enqueue(P::task_type(), payload.asset_id(), value, delay, payload.dedupe_key())
        .await
}
