//! `SWITCHBOARD_*` environment overlay.

use crate::error::{ConfigError, Result};
use crate::settings::Settings;

pub const PREFIX: &str = "SWITCHBOARD_";

fn list(value: &str) -> Vec<String> {
	value.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect()
}

fn flag(key: &str, value: &str) -> Result<bool> {
	match value.trim().to_ascii_lowercase().as_str() {
		"1" | "true" | "yes" | "on" => Ok(true),
		"0" | "false" | "no" | "off" => Ok(false),
		_ => Err(ConfigError::invalid(key, value, "expected a boolean")),
	}
}

fn number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T>
where
	T::Err: std::fmt::Display,
{
	value.trim().parse().map_err(|e: T::Err| ConfigError::invalid(key, value, e.to_string()))
}

/// Applies one variable. Variables without the prefix, or with an unknown suffix, are ignored.
pub(crate) fn apply(settings: &mut Settings, key: &str, value: &str) -> Result<()> {
	let Some(name) = key.strip_prefix(PREFIX) else {
		return Ok(());
	};
	match name {
		"DEFAULT_BACKEND" => settings.dispatch.default_backend = value.trim().to_string(),
		"DEFAULT_MODE" => settings.dispatch.default_mode = value.parse().map_err(|e: String| ConfigError::invalid(key, value, e))?,
		"BACKEND_FALLBACK" => settings.dispatch.backend_fallback = flag(key, value)?,
		"QUEUE_CAPACITY" => settings.dispatch.queue_capacity = number(key, value)?,
		"DEFAULT_TIMEOUT_MS" => settings.dispatch.default_timeout_ms = Some(number(key, value)?),
		"RETAIN_TERMINAL_MS" => settings.dispatch.retain_terminal_ms = Some(number(key, value)?),
		"COLLISION_POLICY" => settings.registry.collision_policy = value.parse().map_err(|e: String| ConfigError::invalid(key, value, e))?,
		"STRIP_TOKENS" => settings.registry.strip_tokens.extend(list(value)),
		"DISCOVERY" => settings.registry.discovery = list(value),
		"APP_LABEL" => settings.registry.app_label = Some(value.trim().to_string()),
		"FREEZE" => settings.registry.freeze = flag(key, value)?,
		"LOG" => settings.logging.filter = Some(value.to_string()),
		_ => {
			tracing::debug!(key, "config.env.ignored");
			return Ok(());
		}
	}
	tracing::trace!(key, "config.env.applied");
	Ok(())
}
