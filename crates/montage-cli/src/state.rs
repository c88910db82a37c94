use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use montage_core::models::{Task, TaskOutcome};
use montage_core::MontageConfig;
use montage_db::{AssetRepository, ProviderRepository, RetryBudgets, TaskRepository};
use montage_generation::{GenerationHandlers, GenerationServices, Notifier, ProviderClient};
use montage_storage::create_storage;
use montage_worker::TaskHandlerContext;
use sqlx::PgPool;

/// Everything a command or the worker needs, built once from configuration.
pub struct AppState {
    pub config: MontageConfig,
    pub pool: PgPool,
    pub tasks: TaskRepository,
    pub providers: ProviderRepository,
    pub handlers: GenerationHandlers,
}

impl AppState {
    pub async fn build(config: MontageConfig, pool: PgPool) -> Result<Self> {
        let storage = create_storage(&config)
            .await
            .context("Failed to initialize storage")?;

        let tasks = TaskRepository::new(pool.clone())
            .with_retry_budgets(RetryBudgets::from_settings(&config.generation));
        let providers = ProviderRepository::new(pool.clone());
        let publisher = montage_infra::create_publisher(config.notify_backend, &pool);
        let client = ProviderClient::new(config.generation.clone())?;

        let services = GenerationServices {
            assets: Arc::new(AssetRepository::new(pool.clone())),
            registry: Arc::new(providers.clone()),
            queue: Arc::new(tasks.clone()),
            storage,
            notifier: Notifier::new(publisher),
            client,
        };

        tracing::info!(
            storage = %config.storage_backend,
            notify = ?config.notify_backend,
            "Application state initialized"
        );

        Ok(Self {
            config,
            pool,
            tasks,
            providers,
            handlers: GenerationHandlers::new(services),
        })
    }
}

#[async_trait]
impl TaskHandlerContext for AppState {
    async fn dispatch_task(self: Arc<Self>, task: &Task) -> Result<TaskOutcome> {
        Ok(self.handlers.handle(task).await)
    }
}
