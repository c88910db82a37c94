//! Montage Worker
//!
//! Claims generation tasks from Postgres and runs them through a
//! [`TaskHandlerContext`] on a bounded worker pool.

pub mod context;
pub mod queue;

pub use context::TaskHandlerContext;
pub use queue::{QueueAction, TaskQueue, MAX_RETRY_BACKOFF_SECS};
