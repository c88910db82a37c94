//! Database repositories
//!
//! One repository per table family: the provider/model catalog, assets, and the
//! generation task queue.

pub mod asset;
pub mod pool;
pub mod provider;
pub mod task;

pub use asset::AssetRepository;
pub use provider::ProviderRepository;
pub use task::{RetryBudgets, TaskRepository, NEW_TASK_CHANNEL};
