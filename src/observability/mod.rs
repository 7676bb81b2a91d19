//! # Observability Infrastructure
//!
//! Structured logging for the Trellis control plane using the tracing
//! ecosystem. The subscriber is installed once at process start; everything
//! else in the crate emits events through the `tracing` macros.

use tracing_subscriber::EnvFilter;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable single-line output
    Text,
    /// JSON lines, one event per line
    Json,
}

/// Initialize the global tracing subscriber.
///
/// The filter is taken from `RUST_LOG` when set, otherwise from
/// `default_level` (e.g. "info"). Returns an error when a subscriber has
/// already been installed, which only happens when tests initialize logging
/// more than once; callers may ignore that case.
pub fn init_tracing(default_level: &str, format: LogFormat) -> Result<(), crate::Error> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("trellis={},tonic=info", default_level)));

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);

    let result = match format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };

    result.map_err(|e| {
        crate::Error::config_with_source("Failed to install tracing subscriber", e)
    })
}
