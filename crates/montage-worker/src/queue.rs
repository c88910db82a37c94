//! Task queue: worker pool, LISTEN/NOTIFY or polling, retry, and submission.
//!
//! Shutdown: [`TaskQueue::shutdown`] signals the pool to stop; it does not wait for
//! in-flight tasks. A task interrupted by process exit stays `running` until the stale
//! task reaper hands it back to the queue.

use anyhow::{Context, Result};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::time::sleep;
use uuid::Uuid;

use montage_core::config::TaskQueueSettings;
use montage_core::models::{Task, TaskOutcome, TaskPayload, TaskType};
use montage_core::TaskError;
use montage_db::{enqueue_payload, TaskRepository, NEW_TASK_CHANNEL};

use crate::context::TaskHandlerContext;

/// Maximum delay in seconds before retrying a failed task. Caps exponential backoff
/// so that high retry counts do not produce excessively long delays.
pub const MAX_RETRY_BACKOFF_SECS: u64 = 300;

/// Computes backoff in seconds for a given retry count (exponential with cap).
#[inline]
pub(crate) fn compute_retry_backoff_seconds(retry_count: i32) -> u64 {
    2_u64
        .checked_pow(retry_count.max(0) as u32)
        .unwrap_or(MAX_RETRY_BACKOFF_SECS)
        .min(MAX_RETRY_BACKOFF_SECS)
}

/// Error recorded when a handler overruns `task_timeout`.
///
/// A timed-out dispatch may already have been accepted by the provider, so it is not
/// retried; running it again could submit the same job twice.
pub(crate) fn timeout_error(task: &Task, task_timeout: Duration) -> anyhow::Error {
    let message = format!("Task execution timed out after {}s", task_timeout.as_secs());
    match task.task_type {
        TaskType::StartGeneration => TaskError::unrecoverable(anyhow::anyhow!(message)),
        TaskType::CheckGenerationStatus => TaskError::recoverable(anyhow::anyhow!(message)),
    }
    .into()
}

/// What the queue does with a task after one invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum QueueAction {
    Complete(serde_json::Value),
    Reschedule { after: Duration, cause: String },
    Fail(String),
}

impl QueueAction {
    /// Decide the follow-up for an invocation result, honouring the task's retry budget.
    pub fn from_result(task: &Task, result: Result<TaskOutcome>) -> Self {
        match result {
            Ok(TaskOutcome::Success(value)) => QueueAction::Complete(value),
            Ok(TaskOutcome::RetryRequested { after, cause }) => {
                if task.can_retry() {
                    QueueAction::Reschedule { after, cause }
                } else {
                    QueueAction::Fail(format!("Retries exhausted: {}", cause))
                }
            }
            Ok(TaskOutcome::Fatal(message)) => QueueAction::Fail(message),
            Err(e) => {
                let is_unrecoverable = e
                    .downcast_ref::<TaskError>()
                    .map(|te| !te.is_recoverable())
                    .unwrap_or(false);

                if !is_unrecoverable && task.can_retry() {
                    QueueAction::Reschedule {
                        after: Duration::from_secs(compute_retry_backoff_seconds(task.retry_count)),
                        cause: e.to_string(),
                    }
                } else {
                    QueueAction::Fail(e.to_string())
                }
            }
        }
    }
}

#[derive(Clone)]
pub struct TaskQueue {
    repository: TaskRepository,
    shutdown_tx: mpsc::Sender<()>,
}

impl TaskQueue {
    /// Create a TaskQueue and spawn its worker pool.
    ///
    /// If `pool` is `Some`, the worker uses PostgreSQL LISTEN/NOTIFY to wake immediately
    /// when tasks are created, in addition to polling at `settings.poll_interval`.
    pub fn new(
        repository: TaskRepository,
        settings: TaskQueueSettings,
        context: Weak<dyn TaskHandlerContext>,
        pool: Option<sqlx::PgPool>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let repo_clone = repository.clone();
        tokio::spawn(async move {
            Self::worker_pool(repo_clone, settings, context, shutdown_rx, pool).await;
        });

        Self {
            repository,
            shutdown_tx,
        }
    }

    /// A queue that only submits. Tasks are picked up by a worker elsewhere.
    pub fn new_no_worker(repository: TaskRepository) -> Self {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        drop(shutdown_rx);
        Self {
            repository,
            shutdown_tx,
        }
    }

    /// Submit a typed task to run immediately.
    #[tracing::instrument(skip(self, payload), fields(task_type = %P::task_type()))]
    pub async fn submit<P: TaskPayload + Sync>(&self, payload: &P) -> Result<Uuid> {
        let task_id = enqueue_payload(&self.repository, payload, Duration::ZERO)
            .await
            .map_err(|e| {
                tracing::error!(
                    error = %e,
                    asset_id = %payload.asset_id(),
                    "Failed to create task in repository"
                );
                anyhow::anyhow!("Failed to create task in repository: {}", e)
            })?;

        tracing::info!(task_id = %task_id, asset_id = %payload.asset_id(), "Task submitted to queue");
        Ok(task_id)
    }

    async fn worker_pool(
        repository: TaskRepository,
        settings: TaskQueueSettings,
        context: Weak<dyn TaskHandlerContext>,
        mut shutdown_rx: mpsc::Receiver<()>,
        pool: Option<sqlx::PgPool>,
    ) {
        let use_listen = pool.is_some();
        tracing::info!(
            max_workers = settings.max_workers,
            poll_interval_ms = settings.poll_interval.as_millis() as u64,
            listen_notify = use_listen,
            "Task queue worker pool started"
        );

        let semaphore = Arc::new(Semaphore::new(settings.max_workers));

        // Wakes the main loop when LISTEN receives a NOTIFY.
        let (notify_tx, mut notify_rx) = mpsc::channel::<()>(16);
        if let Some(pool) = pool {
            let tx = notify_tx.clone();
            tokio::spawn(async move {
                loop {
                    match sqlx::postgres::PgListener::connect_with(&pool).await {
                        Ok(mut listener) => {
                            if let Err(e) = listener.listen(NEW_TASK_CHANNEL).await {
                                tracing::warn!(error = %e, "LISTEN failed, will retry");
                                tokio::time::sleep(Duration::from_secs(5)).await;
                                continue;
                            }
                            while listener.recv().await.is_ok() {
                                let _ = tx.send(()).await;
                            }
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "PgListener connect failed, will retry");
                            tokio::time::sleep(Duration::from_secs(5)).await;
                        }
                    }
                }
            });
        }

        let (reaper_shutdown_tx, mut reaper_shutdown_rx) = mpsc::channel::<()>(1);
        if !settings.stale_task_reap_interval.is_zero() {
            let repo_for_reaper = repository.clone();
            let reap_interval = settings.stale_task_reap_interval;
            let grace_period = settings.stale_task_grace_period;
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(reap_interval);
                interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                loop {
                    tokio::select! {
                        _ = interval.tick() => {
                            if let Err(e) = repo_for_reaper.reap_stale_tasks(grace_period).await {
                                tracing::error!(error = %e, "Stale task reaper failed");
                            }
                        }
                        _ = reaper_shutdown_rx.recv() => break,
                    }
                }
            });
        }

        let task_timeout = settings.task_timeout;
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    tracing::info!("Task queue worker pool shutting down");
                    let _ = reaper_shutdown_tx.send(()).await;
                    break;
                }
                _ = notify_rx.recv() => {
                    Self::claim_and_dispatch_one(&repository, &semaphore, &context, task_timeout).await;
                }
                _ = sleep(settings.poll_interval) => {
                    Self::claim_and_dispatch_one(&repository, &semaphore, &context, task_timeout).await;
                }
            }
        }

        tracing::info!("Task queue worker pool stopped");
    }

    async fn claim_and_dispatch_one(
        repository: &TaskRepository,
        semaphore: &Arc<Semaphore>,
        context: &Weak<dyn TaskHandlerContext>,
        task_timeout: Duration,
    ) {
        let permit = match semaphore.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                tracing::debug!("No workers available, skipping claim");
                return;
            }
        };

        match repository.claim_next_task().await {
            Ok(Some(task)) => {
                let repo = repository.clone();
                let ctx = context.clone();

                tokio::spawn(async move {
                    let _permit = permit;
                    if let Err(e) = Self::process_task(task, repo, ctx, task_timeout).await {
                        tracing::error!(error = %e, "Task processing failed");
                    }
                });
            }
            Ok(None) => {
                drop(permit);
                tracing::trace!("No tasks available in queue");
            }
            Err(e) => {
                drop(permit);
                tracing::error!(error = %e, "Failed to claim task from queue");
            }
        }
    }

    #[tracing::instrument(skip(repository, context), fields(task.id = %task.id, task.type = %task.task_type, asset_id = %task.asset_id))]
    async fn process_task(
        task: Task,
        repository: TaskRepository,
        context: Weak<dyn TaskHandlerContext>,
        task_timeout: Duration,
    ) -> Result<()> {
        let ctx = context.upgrade().ok_or_else(|| {
            anyhow::anyhow!("TaskHandlerContext was dropped, cannot process task")
        })?;

        let result = match tokio::time::timeout(task_timeout, ctx.dispatch_task(&task)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::error!(
                    timeout_secs = task_timeout.as_secs(),
                    "Task execution timed out"
                );
                Err(timeout_error(&task, task_timeout))
            }
        };

        match QueueAction::from_result(&task, result) {
            QueueAction::Complete(value) => {
                repository
                    .mark_completed(task.id, value)
                    .await
                    .context("Failed to mark task as completed")?;
                tracing::info!("Task completed successfully");
            }
            QueueAction::Reschedule { after, cause } => {
                tracing::info!(
                    retry_count = task.retry_count + 1,
                    max_retries = task.max_retries,
                    backoff_secs = after.as_secs(),
                    cause = %cause,
                    "Scheduling task retry"
                );
                repository
                    .reschedule(task.id, after, &cause)
                    .await
                    .context("Failed to reschedule task")?;
            }
            QueueAction::Fail(message) => {
                tracing::error!(
                    error = %message,
                    retry_count = task.retry_count,
                    "Task failed, will not retry"
                );
                repository
                    .mark_failed(task.id, &message)
                    .await
                    .context("Failed to mark task as failed")?;
            }
        }

        Ok(())
    }

    /// Signals the worker pool to stop claiming new tasks and exit the main loop.
    ///
    /// Returns immediately after sending the signal. Already-spawned task handlers keep
    /// running until they complete or time out.
    pub async fn shutdown(&self) {
        tracing::info!("Initiating task queue shutdown");
        let _ = self.shutdown_tx.send(()).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use montage_core::models::TaskStatus;
    use serde_json::json;

    fn task(retry_count: i32, max_retries: i32) -> Task {
        let now = Utc::now();
        Task {
            id: Uuid::new_v4(),
            task_type: TaskType::CheckGenerationStatus,
            asset_id: Uuid::new_v4(),
            status: TaskStatus::Running,
            payload: json!({}),
            result: None,
            scheduled_at: now,
            started_at: Some(now),
            completed_at: None,
            retry_count,
            max_retries,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn retry_backoff_exponential_then_capped() {
        assert_eq!(compute_retry_backoff_seconds(0), 1);
        assert_eq!(compute_retry_backoff_seconds(1), 2);
        assert_eq!(compute_retry_backoff_seconds(2), 4);
        assert_eq!(compute_retry_backoff_seconds(8), 256);
        assert_eq!(compute_retry_backoff_seconds(9), MAX_RETRY_BACKOFF_SECS);
        assert_eq!(compute_retry_backoff_seconds(64), MAX_RETRY_BACKOFF_SECS);
    }

    #[test]
    fn success_completes_with_result() {
        let action = QueueAction::from_result(&task(0, 3), Ok(TaskOutcome::Success(json!({"ok": 1}))));
        assert_eq!(action, QueueAction::Complete(json!({"ok": 1})));
    }

    #[test]
    fn retry_request_uses_handler_backoff_within_budget() {
        let outcome = TaskOutcome::retry(Duration::from_secs(60), "connect timeout");
        let action = QueueAction::from_result(&task(1, 3), Ok(outcome.clone()));
        assert_eq!(
            action,
            QueueAction::Reschedule {
                after: Duration::from_secs(60),
                cause: "connect timeout".to_string()
            }
        );

        let action = QueueAction::from_result(&task(3, 3), Ok(outcome));
        assert!(matches!(action, QueueAction::Fail(_)));
    }

    #[test]
    fn fatal_outcome_fails_without_retry() {
        let action = QueueAction::from_result(&task(0, 3), Ok(TaskOutcome::fatal("bad request")));
        assert_eq!(action, QueueAction::Fail("bad request".to_string()));
    }

    #[test]
    fn timed_out_dispatch_is_not_retried() {
        let mut dispatch = task(0, 3);
        dispatch.task_type = TaskType::StartGeneration;
        let err = timeout_error(&dispatch, Duration::from_secs(180));
        let action = QueueAction::from_result(&dispatch, Err(err));
        assert_eq!(
            action,
            QueueAction::Fail("Task execution timed out after 180s".to_string())
        );
    }

    #[test]
    fn timed_out_status_check_backs_off_exponentially() {
        let check = task(2, 3);
        let err = timeout_error(&check, Duration::from_secs(180));
        let action = QueueAction::from_result(&check, Err(err));
        assert!(matches!(
            action,
            QueueAction::Reschedule { after, .. } if after == Duration::from_secs(4)
        ));

        let action = QueueAction::from_result(&task(3, 3), Err(anyhow::anyhow!("generic error")));
        assert!(matches!(action, QueueAction::Fail(_)));
    }
}
