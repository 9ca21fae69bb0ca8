//! Tracing subscriber setup.

use tracing_subscriber::EnvFilter;

use crate::error::{ConfigError, Result};
use crate::settings::LoggingSettings;

/// Filter used when neither settings nor `RUST_LOG` provide one.
pub const DEFAULT_FILTER: &str = "info";

/// Builds the filter: `[logging].filter` (or `SWITCHBOARD_LOG`), then `RUST_LOG`, then `info`.
pub fn env_filter(settings: &LoggingSettings) -> Result<EnvFilter> {
	let directives = settings
		.filter
		.clone()
		.or_else(|| std::env::var(EnvFilter::DEFAULT_ENV).ok())
		.unwrap_or_else(|| DEFAULT_FILTER.to_string());
	EnvFilter::try_new(&directives).map_err(|e| ConfigError::invalid("logging.filter", directives, e.to_string()))
}

/// Installs a global fmt subscriber. Fails if one is already installed.
pub fn init_tracing(settings: &LoggingSettings) -> Result<()> {
	let filter = env_filter(settings)?;
	tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_ansi(settings.ansi)
		.with_target(true)
		.try_init()
		.map_err(|e| ConfigError::Tracing(e.to_string()))
}
