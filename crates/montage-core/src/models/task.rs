use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    StartGeneration,
    CheckGenerationStatus,
}

impl Display for TaskType {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            TaskType::StartGeneration => write!(f, "start_generation"),
            TaskType::CheckGenerationStatus => write!(f, "check_generation_status"),
        }
    }
}

impl FromStr for TaskType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "start_generation" => Ok(TaskType::StartGeneration),
            "check_generation_status" => Ok(TaskType::CheckGenerationStatus),
            _ => Err(anyhow::anyhow!("Invalid task type: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl Display for TaskStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::Running => write!(f, "running"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for TaskStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "running" => Ok(TaskStatus::Running),
            "completed" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            _ => Err(anyhow::anyhow!("Invalid task status: {}", s)),
        }
    }
}

/// A queued unit of generation work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub task_type: TaskType,
    pub asset_id: Uuid,
    pub status: TaskStatus,
    pub payload: serde_json::Value,
    pub result: Option<serde_json::Value>,
    pub scheduled_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub retry_count: i32,
    pub max_retries: i32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(feature = "sqlx")]
impl sqlx::FromRow<'_, sqlx::postgres::PgRow> for Task {
    fn from_row(row: &sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        use sqlx::Row;
        Ok(Task {
            id: row.get("id"),
            task_type: row.get::<String, _>("task_type").parse().map_err(|e| {
                sqlx::Error::Decode(format!("Failed to parse task_type: {}", e).into())
            })?,
            asset_id: row.get("asset_id"),
            status: row.get::<String, _>("status").parse().map_err(|e| {
                sqlx::Error::Decode(format!("Failed to parse task status: {}", e).into())
            })?,
            payload: row.get("payload"),
            result: row.get("result"),
            scheduled_at: row.get("scheduled_at"),
            started_at: row.get("started_at"),
            completed_at: row.get("completed_at"),
            retry_count: row.get("retry_count"),
            max_retries: row.get("max_retries"),
            last_error: row.get("last_error"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }
}

impl Task {
    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }

    /// What to do with this task after its worker vanished mid-run. A lost run
    /// consumes a retry like any other failed attempt.
    pub fn after_worker_lost(&self) -> StaleTaskAction {
        if self.can_retry() {
            StaleTaskAction::Requeue
        } else {
            StaleTaskAction::Fail
        }
    }

    /// Extract the payload as a typed struct, returning an error on failure.
    pub fn try_payload_as<P: TaskPayload>(&self) -> Result<P, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaleTaskAction {
    Requeue,
    Fail,
}

/// Trait for type-safe task payloads
pub trait TaskPayload: Serialize + for<'de> Deserialize<'de> {
    fn task_type() -> TaskType;

    fn asset_id(&self) -> Uuid;

    /// Key identifying this exact unit of work. The queue keeps at most one task per key.
    fn dedupe_key(&self) -> Option<String> {
        None
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StartGenerationPayload {
    pub asset_id: Uuid,
}

impl TaskPayload for StartGenerationPayload {
    fn task_type() -> TaskType {
        TaskType::StartGeneration
    }

    fn asset_id(&self) -> Uuid {
        self.asset_id
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CheckGenerationStatusPayload {
    pub asset_id: Uuid,
    /// 1-based poll attempt number.
    #[serde(default = "first_attempt")]
    pub attempt: u32,
}

fn first_attempt() -> u32 {
    1
}

impl TaskPayload for CheckGenerationStatusPayload {
    fn task_type() -> TaskType {
        TaskType::CheckGenerationStatus
    }

    fn asset_id(&self) -> Uuid {
        self.asset_id
    }

    /// An asset is dispatched once, so each attempt number is polled at most once.
    fn dedupe_key(&self) -> Option<String> {
        Some(format!("{}:{}:{}", Self::task_type(), self.asset_id, self.attempt))
    }
}

/// What a task handler asks the queue runtime to do with the current invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    /// Done. The value is stored as the task result.
    Success(serde_json::Value),
    /// Run this same invocation again after `after`.
    RetryRequested { after: Duration, cause: String },
    /// Give up on this invocation without retrying.
    Fatal(String),
}

impl TaskOutcome {
    pub fn success() -> Self {
        TaskOutcome::Success(serde_json::Value::Null)
    }

    pub fn retry(after: Duration, cause: impl Into<String>) -> Self {
        TaskOutcome::RetryRequested {
            after,
            cause: cause.into(),
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        TaskOutcome::Fatal(message.into())
    }

    pub fn is_success(&self) -> bool {
        matches!(self, TaskOutcome::Success(_))
    }
}

#[derive(Debug, Serialize, Default)]
pub struct TaskStats {
    pub pending: i64,
    pub running: i64,
    pub completed: i64,
    pub failed: i64,
}
