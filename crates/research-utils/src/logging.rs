//! Logging and tracing utilities

use crate::LogFormat;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_FILTER: &str = "info";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Initialize a human readable subscriber (`RUST_LOG` overrides the `info` default)
pub fn init_tracing() {
    init_tracing_with(LogFormat::Text);
}

/// Initialize a subscriber that writes one JSON object per event
pub fn init_tracing_json() {
    init_tracing_with(LogFormat::Json);
}

/// Initialize tracing in the given format
///
/// Returns `false` when a global subscriber was already installed.
pub fn init_tracing_with(format: LogFormat) -> bool {
    let registry = tracing_subscriber::registry().with(env_filter());
    let result = match format {
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).try_init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(false))
            .try_init(),
    };
    result.is_ok()
}
