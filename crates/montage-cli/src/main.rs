//! Montage command line.
//!
//! Reads configuration from the environment (`.env` honoured). `DATABASE_URL` is always
//! required; storage and notification settings matter for `worker` and `poll`.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use montage_cli::{load_catalog, seed_catalog, AppState};
use montage_core::models::{ModelKind, StartGenerationPayload};
use montage_core::registry::ModelRegistry;
use montage_core::MontageConfig;
use montage_worker::{TaskHandlerContext, TaskQueue};
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "montage", about = "AI generation dispatch and tracking")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the task worker until interrupted
    Worker,
    /// Queue a generation for a pending asset
    Generate {
        /// Asset UUID
        asset_id: Uuid,
        /// Dispatch in this process instead of queueing
        #[arg(long)]
        inline: bool,
    },
    /// Check a processing asset's job status once
    Poll {
        /// Asset UUID
        asset_id: Uuid,
        /// Run as this attempt of the poll chain and schedule the next one while the job
        /// is running. An attempt that is already queued is not scheduled twice.
        #[arg(long)]
        attempt: Option<u32>,
    },
    /// List active models
    Models {
        /// Filter by kind: image or video
        #[arg(long)]
        kind: Option<ModelKind>,
    },
    /// Upsert providers and models from a catalog file
    Seed {
        /// Path to the catalog JSON
        file: PathBuf,
    },
    /// Apply database migrations
    Migrate,
    /// Show task queue counts
    Stats,
}

fn print_json(value: &impl Serialize) -> Result<()> {
    let out = serde_json::to_string_pretty(value).context("Serialize output")?;
    println!("{}", out);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = MontageConfig::from_env().context("Failed to load configuration")?;
    montage_infra::init_telemetry(config.log_json)
        .map_err(|e| anyhow::anyhow!("Failed to initialize telemetry: {}", e))?;

    let pool = montage_db::connect(&config).await?;

    match cli.command {
        Commands::Migrate => {
            montage_db::run_migrations(&pool).await?;
        }
        Commands::Seed { file } => {
            let catalog = load_catalog(&file)?;
            let repo = montage_db::ProviderRepository::new(pool.clone());
            let summary = seed_catalog(&repo, &catalog, |var| std::env::var(var).ok()).await?;
            print_json(&summary)?;
        }
        Commands::Models { kind } => {
            let repo = montage_db::ProviderRepository::new(pool.clone());
            let models = repo.active_models(kind).await?;
            let listing: Vec<_> = models
                .iter()
                .map(|m| {
                    json!({
                        "id": m.model.id,
                        "provider": m.provider.name,
                        "name": m.model.name,
                        "kind": m.model.kind,
                        "parameters_schema": m.model.parameters_schema,
                    })
                })
                .collect();
            print_json(&listing)?;
        }
        Commands::Stats => {
            let tasks = montage_db::TaskRepository::new(pool.clone());
            print_json(&tasks.get_stats().await?)?;
        }
        Commands::Generate { asset_id, inline } => {
            config.validate()?;
            let state = AppState::build(config, pool).await?;
            if inline {
                let outcome = state.handlers.dispatcher().dispatch(asset_id).await?;
                print_json(&json!({ "asset_id": asset_id, "outcome": format!("{:?}", outcome) }))?;
            } else {
                let queue = TaskQueue::new_no_worker(state.tasks.clone());
                let task_id = queue.submit(&StartGenerationPayload { asset_id }).await?;
                print_json(&json!({ "asset_id": asset_id, "task_id": task_id }))?;
            }
        }
        Commands::Poll { asset_id, attempt } => {
            config.validate()?;
            let state = AppState::build(config, pool).await?;
            let poller = state.handlers.poller();
            let outcome = match attempt {
                Some(attempt) => poller.poll_once(asset_id, attempt).await?,
                None => poller.check_once(asset_id).await?,
            };
            print_json(&json!({ "asset_id": asset_id, "outcome": format!("{:?}", outcome) }))?;
        }
        Commands::Worker => {
            config.validate()?;
            let settings = config.task_queue.clone();
            let state = Arc::new(AppState::build(config, pool.clone()).await?);
            let context: Arc<dyn TaskHandlerContext> = state.clone();

            let queue = TaskQueue::new(
                state.tasks.clone(),
                settings,
                Arc::downgrade(&context),
                Some(pool),
            );

            tracing::info!("Worker running, press Ctrl-C to stop");
            tokio::signal::ctrl_c()
                .await
                .context("Failed to listen for shutdown signal")?;
            queue.shutdown().await;
        }
    }

    Ok(())
}
