//! Task handler context trait
//!
//! The command line implements this trait for its application state. The worker calls
//! `dispatch_task` for every claimed task; the implementation matches on task type and
//! invokes the generation handlers.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use montage_core::models::{Task, TaskOutcome};

/// Context for task dispatch.
///
/// The worker holds a weak reference so the pool never keeps application state alive.
#[async_trait]
pub trait TaskHandlerContext: Send + Sync {
    /// Run one invocation of `task` and report what the queue should do next.
    async fn dispatch_task(self: Arc<Self>, task: &Task) -> Result<TaskOutcome>;
}
