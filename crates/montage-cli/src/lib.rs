//! Montage command line support: application state wiring and catalog seeding.

pub mod catalog;
pub mod state;

pub use catalog::{load_catalog, seed_catalog, SeedSummary};
pub use state::AppState;
