//! Data models for the generation subsystem

mod asset;
mod event;
mod provider;
mod task;

pub use asset::*;
pub use event::*;
pub use provider::*;
pub use task::*;
