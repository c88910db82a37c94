//! Montage Infrastructure Library
//!
//! Shared infrastructure for the Montage binary:
//! - Telemetry initialization
//! - Status event publishers

#[cfg(feature = "observability-basic")]
pub mod telemetry;

pub mod notify;

#[cfg(feature = "observability-basic")]
pub use telemetry::init_telemetry;

pub use notify::create_publisher;
#[cfg(feature = "notify-postgres")]
pub use notify::PgNotifyPublisher;
