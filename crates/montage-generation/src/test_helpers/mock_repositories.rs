//! Mock repository implementations for testing
//!
//! These mocks let the dispatcher and poller run without a database.

use async_trait::async_trait;
use chrono::Utc;
use montage_core::error::AppError;
use montage_core::lifecycle::{evaluate_transition, Transition, TransitionDecision};
use montage_core::models::{Asset, AssetStatus, AssetStatusEvent, GenerationTarget, TaskType};
use montage_db::{AssetStore, TaskEnqueuer, TransitionOutcome};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

use crate::notifier::StatusPublisher;

/// Assets with their project and parent file location.
#[derive(Clone, Default)]
pub struct InMemoryAssetStore {
    targets: Arc<Mutex<HashMap<Uuid, GenerationTarget>>>,
    transitions: Arc<Mutex<Vec<(Uuid, AssetStatus)>>>,
}

impl InMemoryAssetStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an asset under `project_id` and return its id.
    pub fn add_asset(&self, project_id: Uuid, asset: Asset, parent_file_url: Option<&str>) -> Uuid {
        let id = asset.id;
        self.targets.lock().unwrap().insert(
            id,
            GenerationTarget {
                asset,
                project_id,
                parent_file_url: parent_file_url.map(str::to_string),
            },
        );
        id
    }

    pub fn remove_asset(&self, asset_id: Uuid) {
        self.targets.lock().unwrap().remove(&asset_id);
    }

    pub fn asset(&self, asset_id: Uuid) -> Option<Asset> {
        self.targets
            .lock()
            .unwrap()
            .get(&asset_id)
            .map(|t| t.asset.clone())
    }

    /// Every applied transition in order.
    pub fn applied_transitions(&self) -> Vec<(Uuid, AssetStatus)> {
        self.transitions.lock().unwrap().clone()
    }
}

#[async_trait]
impl AssetStore for InMemoryAssetStore {
    async fn load_for_generation(
        &self,
        asset_id: Uuid,
    ) -> Result<Option<GenerationTarget>, AppError> {
        Ok(self.targets.lock().unwrap().get(&asset_id).cloned())
    }

    async fn apply_transition(
        &self,
        asset_id: Uuid,
        transition: &Transition,
    ) -> Result<TransitionOutcome, AppError> {
        let mut targets = self.targets.lock().unwrap();
        let target = targets
            .get_mut(&asset_id)
            .ok_or_else(|| AppError::NotFound(format!("asset {}", asset_id)))?;

        if let TransitionDecision::Skip(_) = evaluate_transition(target.asset.status, transition)? {
            return Ok(TransitionOutcome {
                asset: target.asset.clone(),
                project_id: target.project_id,
                applied: false,
            });
        }

        let asset = &mut target.asset;
        match transition {
            Transition::Processing { external_task_id } => {
                asset.external_task_id = Some(external_task_id.clone());
                asset.error_message = None;
            }
            Transition::Completed { file_url } => {
                asset.file_url = Some(file_url.clone());
                asset.error_message = None;
            }
            Transition::Failed { error_message } => {
                asset.error_message = Some(error_message.clone());
            }
        }
        asset.status = transition.target();
        asset.updated_at = Utc::now();

        self.transitions
            .lock()
            .unwrap()
            .push((asset_id, asset.status));

        Ok(TransitionOutcome {
            asset: asset.clone(),
            project_id: target.project_id,
            applied: true,
        })
    }
}

/// A task handed to [`RecordingEnqueuer`].
#[derive(Debug, Clone, PartialEq)]
pub struct EnqueuedTask {
    pub id: Uuid,
    pub task_type: TaskType,
    pub asset_id: Uuid,
    pub payload: Value,
    pub delay: Duration,
}

/// Task queue that records instead of scheduling.
///
/// Dedupe keys are remembered for the queue's lifetime, like the unique index on
/// `generation_tasks.dedupe_key`; [`RecordingEnqueuer::drain`] does not forget them.
#[derive(Clone, Default)]
pub struct RecordingEnqueuer {
    tasks: Arc<Mutex<Vec<EnqueuedTask>>>,
    dedupe_keys: Arc<Mutex<HashMap<String, Uuid>>>,
}

impl RecordingEnqueuer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tasks(&self) -> Vec<EnqueuedTask> {
        self.tasks.lock().unwrap().clone()
    }

    pub fn count(&self, task_type: TaskType) -> usize {
        self.tasks
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.task_type == task_type)
            .count()
    }

    /// Remove and return everything recorded so far.
    pub fn drain(&self) -> Vec<EnqueuedTask> {
        std::mem::take(&mut *self.tasks.lock().unwrap())
    }
}

#[async_trait]
impl TaskEnqueuer for RecordingEnqueuer {
    async fn enqueue(
        &self,
        task_type: TaskType,
        asset_id: Uuid,
        payload: Value,
        delay: Duration,
        dedupe_key: Option<String>,
    ) -> Result<Uuid, AppError> {
        let id = Uuid::new_v4();
        if let Some(key) = dedupe_key {
            let mut keys = self.dedupe_keys.lock().unwrap();
            if let Some(existing) = keys.get(&key) {
                return Ok(*existing);
            }
            keys.insert(key, id);
        }
        self.tasks.lock().unwrap().push(EnqueuedTask {
            id,
            task_type,
            asset_id,
            payload,
            delay,
        });
        Ok(id)
    }
}

/// Publisher that keeps every event with its group.
#[derive(Clone, Default)]
pub struct RecordingPublisher {
    events: Arc<Mutex<Vec<(String, AssetStatusEvent)>>>,
}

impl RecordingPublisher {
    pub fn events(&self) -> Vec<(String, AssetStatusEvent)> {
        self.events.lock().unwrap().clone()
    }

    /// Status labels in publication order.
    pub fn statuses(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|(_, e)| e.status.clone())
            .collect()
    }
}

#[async_trait]
impl StatusPublisher for RecordingPublisher {
    async fn publish(&self, group: &str, event: &AssetStatusEvent) -> anyhow::Result<()> {
        self.events
            .lock()
            .unwrap()
            .push((group.to_string(), event.clone()));
        Ok(())
    }
}
