//! Montage Generation
//!
//! Dispatches asset generation jobs to task-based AI providers and tracks them to
//! completion:
//!
//! - [`Dispatcher`] fills the model's request template, submits the job and schedules
//!   the first status check.
//! - [`Poller`] checks job status, stores finished results and reschedules itself while
//!   the job is running.
//! - [`Notifier`] broadcasts every applied status change to the asset's project.
//!
//! Both run as queue task handlers through [`GenerationHandlers`].

pub mod client;
pub mod dispatcher;
pub mod error;
pub mod handlers;
pub mod notifier;
pub mod poller;
pub mod result_file;
pub mod services;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;

pub use client::{JobState, ProviderClient};
pub use dispatcher::{DispatchOutcome, Dispatcher};
pub use error::GenerationError;
pub use handlers::GenerationHandlers;
pub use notifier::{NoopPublisher, Notifier, StatusPublisher};
pub use poller::{PollOutcome, Poller};
pub use result_file::{infer_result_file, ResultFile};
pub use services::GenerationServices;
