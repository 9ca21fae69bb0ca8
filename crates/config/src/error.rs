//! Error types for configuration loading.

use std::path::PathBuf;

use switchboard_registry::RegistryError;
use thiserror::Error;

/// Errors that can occur while loading or applying configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error parsing TOML syntax or shape.
	#[error("TOML parse error: {0}")]
	Toml(#[from] toml::de::Error),

	/// Error reading a configuration file.
	#[error("I/O error reading {path}: {error}")]
	Io {
		/// Path to the file that failed to read.
		path: PathBuf,
		/// The underlying I/O error.
		error: std::io::Error,
	},

	/// A setting has a value outside its domain.
	#[error("invalid value {value:?} for {key}: {message}")]
	InvalidValue { key: String, value: String, message: String },

	/// Running registrars during bootstrap failed.
	#[error("bootstrap failed: {0}")]
	Bootstrap(#[from] RegistryError),

	/// A global tracing subscriber could not be installed.
	#[error("failed to initialise tracing: {0}")]
	Tracing(String),
}

impl ConfigError {
	pub(crate) fn invalid(key: impl Into<String>, value: impl Into<String>, message: impl Into<String>) -> Self {
		Self::InvalidValue {
			key: key.into(),
			value: value.into(),
			message: message.into(),
		}
	}
}

/// Result type for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;
