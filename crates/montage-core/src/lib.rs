//! Montage Core Library
//!
//! Domain models, the request template engine, the asset generation lifecycle,
//! the provider/model catalog, configuration and error types shared by every
//! Montage component.

pub mod config;
pub mod error;
pub mod lifecycle;
pub mod models;
pub mod registry;
pub mod storage_types;
pub mod task_error;
pub mod template;

// Re-export commonly used types
pub use config::{GenerationSettings, MontageConfig, NotifyBackend, TaskQueueSettings};
pub use error::AppError;
pub use lifecycle::{evaluate_transition, Transition, TransitionDecision, TransitionRejected};
pub use registry::{ModelCatalog, ModelRegistry};
pub use storage_types::StorageBackend;
pub use task_error::TaskError;
pub use template::{substitute, GenerationContext};
