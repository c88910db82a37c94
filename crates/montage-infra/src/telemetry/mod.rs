//! Tracing subscriber setup
//!
//! `RUST_LOG` wins when set; otherwise Montage crates log at `info`.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const DEFAULT_LOG_FILTER: &str = "montage=info,montage_core=info,montage_db=info,montage_generation=info,montage_worker=info,montage_storage=info,sqlx=warn";

/// Install the global subscriber. Human-readable by default, one JSON object per line
/// when `json` is set.
pub fn init_telemetry(json: bool) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(true))
            .try_init()?;
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()?;
    }

    tracing::debug!(json, "Telemetry initialized");
    Ok(())
}
