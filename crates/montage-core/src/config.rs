//! Configuration module
//!
//! Everything is read from the environment (a `.env` file is honoured). Generation and
//! queue timings are handed to the components that need them as typed sub-views so no
//! component reads the environment itself.

use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::storage_types::StorageBackend;

const MAX_CONNECTIONS: u32 = 20;
const DEFAULT_STATUS_PATH: &str = "/api/v1/jobs/recordInfo";

/// Where asset status events are published.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyBackend {
    /// `pg_notify` on the project's channel.
    Postgres,
    /// Events are dropped.
    Disabled,
}

impl FromStr for NotifyBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "postgres" | "pg" => Ok(NotifyBackend::Postgres),
            "none" | "noop" | "" => Ok(NotifyBackend::Disabled),
            _ => Err(anyhow::anyhow!("Invalid notify backend: {}", s)),
        }
    }
}

/// Timeouts, intervals and retry budgets for dispatch and polling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationSettings {
    pub submit_timeout: Duration,
    pub status_timeout: Duration,
    pub download_timeout: Duration,
    /// Delay before the first poll and between polls.
    pub poll_interval: Duration,
    pub max_poll_attempts: u32,
    pub dispatch_max_retries: i32,
    pub dispatch_retry_backoff: Duration,
    pub poll_transport_max_retries: i32,
    pub poll_transport_backoff: Duration,
    /// Provider status path, relative to the provider base URL.
    pub status_path: String,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            submit_timeout: Duration::from_secs(30),
            status_timeout: Duration::from_secs(30),
            download_timeout: Duration::from_secs(60),
            poll_interval: Duration::from_secs(10),
            max_poll_attempts: 60,
            dispatch_max_retries: 3,
            dispatch_retry_backoff: Duration::from_secs(60),
            poll_transport_max_retries: 5,
            poll_transport_backoff: Duration::from_secs(10),
            status_path: DEFAULT_STATUS_PATH.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskQueueSettings {
    pub max_workers: usize,
    pub poll_interval: Duration,
    pub stale_task_reap_interval: Duration,
    /// How long a task may sit in `running` before the reaper returns it to the queue.
    pub stale_task_grace_period: Duration,
    /// Upper bound on one handler invocation.
    pub task_timeout: Duration,
}

impl Default for TaskQueueSettings {
    fn default() -> Self {
        Self {
            max_workers: 4,
            poll_interval: Duration::from_millis(1000),
            stale_task_reap_interval: Duration::from_secs(60),
            stale_task_grace_period: Duration::from_secs(300),
            task_timeout: Duration::from_secs(180),
        }
    }
}

#[derive(Clone)]
pub struct MontageConfig {
    pub database_url: String,
    pub db_max_connections: u32,
    pub storage_backend: StorageBackend,
    pub local_storage_path: Option<String>,
    pub local_storage_base_url: Option<String>,
    pub s3_bucket: Option<String>,
    pub s3_region: Option<String>,
    pub s3_endpoint: Option<String>,
    pub generation: GenerationSettings,
    pub task_queue: TaskQueueSettings,
    pub notify_backend: NotifyBackend,
    pub log_json: bool,
}

impl fmt::Debug for MontageConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MontageConfig")
            .field("database_url", &"[REDACTED]")
            .field("db_max_connections", &self.db_max_connections)
            .field("storage_backend", &self.storage_backend)
            .field("local_storage_path", &self.local_storage_path)
            .field("s3_bucket", &self.s3_bucket)
            .field("generation", &self.generation)
            .field("task_queue", &self.task_queue)
            .field("notify_backend", &self.notify_backend)
            .finish()
    }
}

impl MontageConfig {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, anyhow::Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let database_url =
            var("DATABASE_URL").ok_or_else(|| anyhow::anyhow!("DATABASE_URL must be set"))?;

        let storage_backend = match var("STORAGE_BACKEND") {
            Some(raw) => raw.parse::<StorageBackend>()?,
            None => StorageBackend::Local,
        };

        let defaults = GenerationSettings::default();
        let generation = GenerationSettings {
            submit_timeout: secs(&var, "GENERATION_SUBMIT_TIMEOUT_SECS", defaults.submit_timeout)?,
            status_timeout: secs(&var, "GENERATION_STATUS_TIMEOUT_SECS", defaults.status_timeout)?,
            download_timeout: secs(
                &var,
                "GENERATION_DOWNLOAD_TIMEOUT_SECS",
                defaults.download_timeout,
            )?,
            poll_interval: secs(&var, "GENERATION_POLL_INTERVAL_SECS", defaults.poll_interval)?,
            max_poll_attempts: parsed(
                &var,
                "GENERATION_MAX_POLL_ATTEMPTS",
                defaults.max_poll_attempts,
            )?,
            dispatch_max_retries: parsed(
                &var,
                "GENERATION_DISPATCH_MAX_RETRIES",
                defaults.dispatch_max_retries,
            )?,
            dispatch_retry_backoff: secs(
                &var,
                "GENERATION_DISPATCH_RETRY_BACKOFF_SECS",
                defaults.dispatch_retry_backoff,
            )?,
            poll_transport_max_retries: parsed(
                &var,
                "GENERATION_POLL_TRANSPORT_MAX_RETRIES",
                defaults.poll_transport_max_retries,
            )?,
            poll_transport_backoff: secs(
                &var,
                "GENERATION_POLL_TRANSPORT_BACKOFF_SECS",
                defaults.poll_transport_backoff,
            )?,
            status_path: var("GENERATION_STATUS_PATH").unwrap_or(defaults.status_path),
        };

        let queue_defaults = TaskQueueSettings::default();
        let task_queue = TaskQueueSettings {
            max_workers: parsed(&var, "TASK_QUEUE_MAX_WORKERS", queue_defaults.max_workers)?,
            poll_interval: Duration::from_millis(parsed(
                &var,
                "TASK_QUEUE_POLL_INTERVAL_MS",
                queue_defaults.poll_interval.as_millis() as u64,
            )?),
            stale_task_reap_interval: secs(
                &var,
                "TASK_QUEUE_STALE_TASK_REAP_INTERVAL_SECS",
                queue_defaults.stale_task_reap_interval,
            )?,
            stale_task_grace_period: secs(
                &var,
                "TASK_QUEUE_STALE_TASK_GRACE_PERIOD_SECS",
                queue_defaults.stale_task_grace_period,
            )?,
            task_timeout: secs(
                &var,
                "TASK_QUEUE_TASK_TIMEOUT_SECS",
                queue_defaults.task_timeout,
            )?,
        };

        let notify_backend = match var("NOTIFY_BACKEND") {
            Some(raw) => raw.parse()?,
            None => NotifyBackend::Postgres,
        };

        Ok(Self {
            database_url,
            db_max_connections: parsed(&var, "DB_MAX_CONNECTIONS", MAX_CONNECTIONS)?,
            storage_backend,
            local_storage_path: var("LOCAL_STORAGE_PATH"),
            local_storage_base_url: var("LOCAL_STORAGE_BASE_URL"),
            s3_bucket: var("S3_BUCKET"),
            s3_region: var("S3_REGION").or_else(|| var("AWS_REGION")),
            s3_endpoint: var("S3_ENDPOINT"),
            generation,
            task_queue,
            notify_backend,
            log_json: var("LOG_FORMAT")
                .map(|f| f.eq_ignore_ascii_case("json"))
                .unwrap_or(false),
        })
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if !(self.database_url.starts_with("postgres://")
            || self.database_url.starts_with("postgresql://"))
        {
            return Err(anyhow::anyhow!(
                "DATABASE_URL must be a valid PostgreSQL connection string"
            ));
        }

        match self.storage_backend {
            StorageBackend::S3 if self.s3_bucket.is_none() => {
                return Err(anyhow::anyhow!("STORAGE_BACKEND=s3 requires S3_BUCKET"));
            }
            StorageBackend::Local
                if self.local_storage_path.is_none() || self.local_storage_base_url.is_none() =>
            {
                return Err(anyhow::anyhow!(
                    "STORAGE_BACKEND=local requires LOCAL_STORAGE_PATH and LOCAL_STORAGE_BASE_URL"
                ));
            }
            _ => {}
        }

        let g = &self.generation;
        if g.max_poll_attempts == 0 {
            return Err(anyhow::anyhow!(
                "GENERATION_MAX_POLL_ATTEMPTS must be at least 1"
            ));
        }
        if g.dispatch_max_retries < 0 || g.poll_transport_max_retries < 0 {
            return Err(anyhow::anyhow!("Retry budgets cannot be negative"));
        }
        if g.submit_timeout.is_zero() || g.status_timeout.is_zero() || g.download_timeout.is_zero()
        {
            return Err(anyhow::anyhow!("Generation timeouts must be greater than zero"));
        }
        if !g.status_path.starts_with('/') {
            return Err(anyhow::anyhow!("GENERATION_STATUS_PATH must start with '/'"));
        }

        if self.task_queue.max_workers == 0 {
            return Err(anyhow::anyhow!("TASK_QUEUE_MAX_WORKERS must be at least 1"));
        }
        if self.task_queue.task_timeout >= self.task_queue.stale_task_grace_period {
            return Err(anyhow::anyhow!(
                "TASK_QUEUE_TASK_TIMEOUT_SECS must be shorter than the stale task grace period"
            ));
        }

        Ok(())
    }
}

fn parsed<T, F>(var: &F, key: &str, default: T) -> Result<T, anyhow::Error>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match var(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("{} must be a valid number", key)),
        None => Ok(default),
    }
}

fn secs<F>(var: &F, key: &str, default: Duration) -> Result<Duration, anyhow::Error>
where
    F: Fn(&str) -> Option<String>,
{
    parsed(var, key, default.as_secs()).map(Duration::from_secs)
}
