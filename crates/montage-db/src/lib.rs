//! Montage Database Layer
//!
//! Postgres repositories for the provider/model catalog, assets and the generation
//! task queue, plus the traits the generation core programs against.

pub mod db;
pub mod generation_traits;

pub use db::pool::{connect, run_migrations};
pub use db::{AssetRepository, ProviderRepository, RetryBudgets, TaskRepository, NEW_TASK_CHANNEL};
pub use generation_traits::{enqueue_payload, AssetStore, TaskEnqueuer, TransitionOutcome};
