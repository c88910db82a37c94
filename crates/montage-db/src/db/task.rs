use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

use montage_core::config::GenerationSettings;
use montage_core::error::AppError;
use montage_core::models::{StaleTaskAction, Task, TaskStats, TaskType};

use crate::generation_traits::TaskEnqueuer;

/// Channel workers LISTEN on to wake up when a task is inserted.
pub const NEW_TASK_CHANNEL: &str = "montage_new_task";

const TASK_COLUMNS: &str = r#"
    id, task_type, asset_id, status, payload, result, scheduled_at, started_at,
    completed_at, retry_count, max_retries, last_error, created_at, updated_at
"#;

const WORKER_LOST: &str = "Worker lost while running task";

/// Per-type retry budgets applied when tasks are enqueued.
#[derive(Debug, Clone, Copy)]
pub struct RetryBudgets {
    pub start_generation: i32,
    pub check_generation_status: i32,
}

impl Default for RetryBudgets {
    fn default() -> Self {
        Self {
            start_generation: 3,
            check_generation_status: 5,
        }
    }
}

impl RetryBudgets {
    pub fn from_settings(settings: &GenerationSettings) -> Self {
        Self {
            start_generation: settings.dispatch_max_retries,
            check_generation_status: settings.poll_transport_max_retries,
        }
    }

    pub fn for_type(&self, task_type: TaskType) -> i32 {
        match task_type {
            TaskType::StartGeneration => self.start_generation,
            TaskType::CheckGenerationStatus => self.check_generation_status,
        }
    }
}

#[derive(Clone)]
pub struct TaskRepository {
    pool: PgPool,
    budgets: RetryBudgets,
}

impl TaskRepository {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            budgets: RetryBudgets::default(),
        }
    }

    pub fn with_retry_budgets(mut self, budgets: RetryBudgets) -> Self {
        self.budgets = budgets;
        self
    }

    /// Create a new task scheduled `delay` from now
    ///
    /// A task whose `dedupe_key` is already taken is not inserted; the existing task is
    /// returned instead and no worker is woken.
    #[tracing::instrument(skip(self, payload))]
    pub async fn create_task(
        &self,
        task_type: TaskType,
        asset_id: Uuid,
        payload: serde_json::Value,
        delay: Duration,
        max_retries: i32,
        dedupe_key: Option<String>,
    ) -> Result<Task> {
        let delay = chrono::Duration::from_std(delay).context("Task delay out of range")?;
        let scheduled_at = Utc::now() + delay;

        // Insert and notify in one transaction so workers never wake before the row is visible
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin transaction for task creation")?;

        let inserted: Option<Task> = sqlx::query_as::<Postgres, Task>(&format!(
            r#"
            INSERT INTO generation_tasks
                (task_type, asset_id, status, payload, scheduled_at, max_retries, dedupe_key)
            VALUES ($1, $2, 'pending', $3, $4, $5, $6)
            ON CONFLICT (dedupe_key) WHERE dedupe_key IS NOT NULL DO NOTHING
            RETURNING {}
            "#,
            TASK_COLUMNS
        ))
        .bind(task_type.to_string())
        .bind(asset_id)
        .bind(payload)
        .bind(scheduled_at)
        .bind(max_retries)
        .bind(dedupe_key.as_deref())
        .fetch_optional(&mut *tx)
        .await
        .context("Failed to insert task into database")?;

        let task = match inserted {
            Some(task) => task,
            None => {
                let existing = sqlx::query_as::<Postgres, Task>(&format!(
                    "SELECT {} FROM generation_tasks WHERE dedupe_key = $1",
                    TASK_COLUMNS
                ))
                .bind(dedupe_key.as_deref())
                .fetch_one(&mut *tx)
                .await
                .context("Failed to load existing task for dedupe key")?;
                tx.commit()
                    .await
                    .context("Failed to commit transaction for task creation")?;

                tracing::info!(
                    task_id = %existing.id,
                    asset_id = %asset_id,
                    task_type = %task_type,
                    dedupe_key = dedupe_key.as_deref().unwrap_or_default(),
                    "Task already queued, not creating a duplicate"
                );
                return Ok(existing);
            }
        };

        // Workers fall back to polling if the notification is lost
        if let Err(e) = sqlx::query("SELECT pg_notify($1, '')")
            .bind(NEW_TASK_CHANNEL)
            .execute(&mut *tx)
            .await
        {
            tracing::warn!(
                error = %e,
                task_id = %task.id,
                "Failed to send pg_notify for new task, workers will discover task via polling"
            );
        }

        tx.commit()
            .await
            .context("Failed to commit transaction for task creation")?;

        tracing::info!(
            task_id = %task.id,
            asset_id = %asset_id,
            task_type = %task_type,
            scheduled_at = %task.scheduled_at,
            "Task created"
        );

        Ok(task)
    }

    /// Atomically claim the next due task
    ///
    /// Uses `FOR UPDATE SKIP LOCKED` so concurrent workers never claim the same row.
    #[tracing::instrument(skip(self))]
    pub async fn claim_next_task(&self) -> Result<Option<Task>> {
        let task = sqlx::query_as::<Postgres, Task>(&format!(
            r#"
            UPDATE generation_tasks
            SET status = 'running',
                started_at = NOW(),
                updated_at = NOW()
            WHERE id = (
                SELECT id
                FROM generation_tasks
                WHERE status = 'pending'
                    AND scheduled_at <= NOW()
                ORDER BY scheduled_at ASC
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING {}
            "#,
            TASK_COLUMNS
        ))
        .fetch_optional(&self.pool)
        .await
        .context("Failed to claim next task")?;

        if let Some(task) = &task {
            tracing::debug!(
                task_id = %task.id,
                asset_id = %task.asset_id,
                task_type = %task.task_type,
                "Task claimed"
            );
        }

        Ok(task)
    }

    /// Mark task as completed with result
    #[tracing::instrument(skip(self, result))]
    pub async fn mark_completed(&self, task_id: Uuid, result: serde_json::Value) -> Result<Task> {
        let task = sqlx::query_as::<Postgres, Task>(&format!(
            r#"
            UPDATE generation_tasks
            SET status = 'completed',
                result = $2,
                completed_at = NOW(),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            TASK_COLUMNS
        ))
        .bind(task_id)
        .bind(result)
        .fetch_one(&self.pool)
        .await
        .context("Failed to mark task as completed")?;

        tracing::info!(
            task_id = %task_id,
            asset_id = %task.asset_id,
            task_type = %task.task_type,
            "Task completed"
        );
        Ok(task)
    }

    /// Mark task as failed with the error that ended it
    #[tracing::instrument(skip(self, error))]
    pub async fn mark_failed(&self, task_id: Uuid, error: &str) -> Result<Task> {
        let task = sqlx::query_as::<Postgres, Task>(&format!(
            r#"
            UPDATE generation_tasks
            SET status = 'failed',
                last_error = $2,
                completed_at = NOW(),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            TASK_COLUMNS
        ))
        .bind(task_id)
        .bind(error)
        .fetch_one(&self.pool)
        .await
        .context("Failed to mark task as failed")?;

        tracing::error!(
            task_id = %task_id,
            asset_id = %task.asset_id,
            task_type = %task.task_type,
            retry_count = task.retry_count,
            error,
            "Task failed"
        );
        Ok(task)
    }

    /// Put the same task back in the queue after `after`, consuming one retry
    #[tracing::instrument(skip(self, cause))]
    pub async fn reschedule(&self, task_id: Uuid, after: Duration, cause: &str) -> Result<Task> {
        let after = chrono::Duration::from_std(after).context("Retry delay out of range")?;
        let task = sqlx::query_as::<Postgres, Task>(&format!(
            r#"
            UPDATE generation_tasks
            SET status = 'pending',
                retry_count = retry_count + 1,
                scheduled_at = $2,
                started_at = NULL,
                last_error = $3,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            TASK_COLUMNS
        ))
        .bind(task_id)
        .bind(Utc::now() + after)
        .bind(cause)
        .fetch_one(&self.pool)
        .await
        .context("Failed to reschedule task")?;

        tracing::info!(
            task_id = %task_id,
            retry_count = task.retry_count,
            max_retries = task.max_retries,
            scheduled_at = %task.scheduled_at,
            "Task retry scheduled"
        );
        Ok(task)
    }

    /// Settle tasks stuck in `running` longer than `grace_period`
    ///
    /// Covers workers that died mid-task. Each lost run consumes a retry: the task is
    /// requeued while its budget lasts and failed after that. Returns the number of
    /// tasks settled.
    #[tracing::instrument(skip(self))]
    pub async fn reap_stale_tasks(&self, grace_period: Duration) -> Result<u64> {
        let grace_secs = grace_period.as_secs() as f64;
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin transaction for stale task reaping")?;

        let stale = sqlx::query_as::<Postgres, Task>(&format!(
            r#"
            SELECT {}
            FROM generation_tasks
            WHERE status = 'running'
                AND started_at < NOW() - make_interval(secs => $1)
            FOR UPDATE SKIP LOCKED
            "#,
            TASK_COLUMNS
        ))
        .bind(grace_secs)
        .fetch_all(&mut *tx)
        .await
        .context("Failed to select stale tasks")?;

        for task in &stale {
            let query = match task.after_worker_lost() {
                StaleTaskAction::Requeue => {
                    r#"
                    UPDATE generation_tasks
                    SET status = 'pending',
                        retry_count = retry_count + 1,
                        started_at = NULL,
                        last_error = $2,
                        updated_at = NOW()
                    WHERE id = $1
                    "#
                }
                StaleTaskAction::Fail => {
                    r#"
                    UPDATE generation_tasks
                    SET status = 'failed',
                        last_error = $2,
                        completed_at = NOW(),
                        updated_at = NOW()
                    WHERE id = $1
                    "#
                }
            };
            sqlx::query(query)
                .bind(task.id)
                .bind(WORKER_LOST)
                .execute(&mut *tx)
                .await
                .context("Failed to settle stale task")?;

            tracing::warn!(
                task_id = %task.id,
                asset_id = %task.asset_id,
                task_type = %task.task_type,
                retry_count = task.retry_count,
                max_retries = task.max_retries,
                action = ?task.after_worker_lost(),
                "Stale running task settled"
            );
        }

        tx.commit()
            .await
            .context("Failed to commit stale task reaping")?;
        Ok(stale.len() as u64)
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_stats(&self) -> Result<TaskStats> {
        use sqlx::Row;

        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) FILTER (WHERE status = 'pending') as pending,
                COUNT(*) FILTER (WHERE status = 'running') as running,
                COUNT(*) FILTER (WHERE status = 'completed') as completed,
                COUNT(*) FILTER (WHERE status = 'failed') as failed
            FROM generation_tasks
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .context("Failed to fetch task stats")?;

        Ok(TaskStats {
            pending: row.get::<Option<i64>, _>("pending").unwrap_or(0),
            running: row.get::<Option<i64>, _>("running").unwrap_or(0),
            completed: row.get::<Option<i64>, _>("completed").unwrap_or(0),
            failed: row.get::<Option<i64>, _>("failed").unwrap_or(0),
        })
    }
}

#[async_trait]
impl TaskEnqueuer for TaskRepository {
    async fn enqueue(
        &self,
        task_type: TaskType,
        asset_id: Uuid,
        payload: serde_json::Value,
        delay: Duration,
        dedupe_key: Option<String>,
    ) -> Result<Uuid, AppError> {
        let task = self
            .create_task(
                task_type,
                asset_id,
                payload,
                delay,
                self.budgets.for_type(task_type),
                dedupe_key,
            )
            .await?;
        Ok(task.id)
    }
}
