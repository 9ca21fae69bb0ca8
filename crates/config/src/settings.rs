//! Settings sections and their translation into runtime options.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use globset::Glob;
use serde::Deserialize;
use switchboard_registry::{Bootstrap, BootstrapReport, CollisionPolicy, ComponentStore, HostContext, StoreOptions, StripTokens};
use switchboard_worker::{DispatcherConfig, ExecutionMode, ImmediateBackend, LocalQueue};

use crate::env;
use crate::error::{ConfigError, Result};

/// Host configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
	pub registry: RegistrySettings,
	pub dispatch: DispatchSettings,
	pub logging: LoggingSettings,
}

/// `[registry]`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RegistrySettings {
	pub collision_policy: CollisionPolicy,
	/// Global name-strip tokens, added to the built-in ones.
	pub strip_tokens: Vec<String>,
	/// Strip tokens that only apply inside one namespace.
	pub namespace_strip_tokens: BTreeMap<String, Vec<String>>,
	/// Host application label used as the default namespace.
	pub app_label: Option<String>,
	pub default_group: Option<String>,
	/// Module-path globs selecting which registrars run at startup. Empty runs all.
	pub discovery: Vec<String>,
	/// Freeze the store once bootstrap succeeds.
	pub freeze: bool,
}

impl Default for RegistrySettings {
	fn default() -> Self {
		Self {
			collision_policy: CollisionPolicy::Strict,
			strip_tokens: Vec::new(),
			namespace_strip_tokens: BTreeMap::new(),
			app_label: None,
			default_group: None,
			discovery: Vec::new(),
			freeze: true,
		}
	}
}

/// `[dispatch]`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DispatchSettings {
	pub default_backend: String,
	pub default_mode: ExecutionMode,
	pub backend_fallback: bool,
	pub queue_capacity: usize,
	pub default_timeout_ms: Option<u64>,
	/// How long finished task records stay pollable. Defaults to ten minutes.
	pub retain_terminal_ms: Option<u64>,
}

impl Default for DispatchSettings {
	fn default() -> Self {
		Self {
			default_backend: ImmediateBackend::NAME.to_string(),
			default_mode: ExecutionMode::Sync,
			backend_fallback: false,
			queue_capacity: LocalQueue::DEFAULT_CAPACITY,
			default_timeout_ms: None,
			retain_terminal_ms: None,
		}
	}
}

/// `[logging]`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingSettings {
	/// `EnvFilter` directives. Falls back to `RUST_LOG`, then `info`.
	pub filter: Option<String>,
	pub ansi: bool,
}

impl Default for LoggingSettings {
	fn default() -> Self {
		Self { filter: None, ansi: true }
	}
}

impl Settings {
	/// Parses TOML and validates the result.
	pub fn parse(input: &str) -> Result<Self> {
		let settings: Self = toml::from_str(input)?;
		settings.validate()?;
		Ok(settings)
	}

	/// Loads settings from a TOML file.
	pub fn load(path: impl AsRef<Path>) -> Result<Self> {
		let path = path.as_ref();
		let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
			path: path.to_path_buf(),
			error: e,
		})?;
		Self::parse(&content)
	}

	/// Loads the optional file, then overlays `SWITCHBOARD_*` variables from the process environment.
	pub fn from_env(path: Option<&Path>) -> Result<Self> {
		let mut settings = match path {
			Some(path) => Self::load(path)?,
			None => Self::default(),
		};
		settings.apply_env(std::env::vars())?;
		Ok(settings)
	}

	/// Applies `SWITCHBOARD_*` overrides from `vars` and revalidates.
	pub fn apply_env<I, K, V>(&mut self, vars: I) -> Result<()>
	where
		I: IntoIterator<Item = (K, V)>,
		K: AsRef<str>,
		V: AsRef<str>,
	{
		for (key, value) in vars {
			env::apply(self, key.as_ref(), value.as_ref())?;
		}
		self.validate()
	}

	/// Checks cross-field constraints.
	pub fn validate(&self) -> Result<()> {
		if self.dispatch.default_backend.trim().is_empty() {
			return Err(ConfigError::invalid("dispatch.default_backend", "", "must not be empty"));
		}
		if self.dispatch.queue_capacity == 0 {
			return Err(ConfigError::invalid("dispatch.queue_capacity", "0", "must be at least 1"));
		}
		for pattern in &self.registry.discovery {
			Glob::new(pattern).map_err(|e| ConfigError::invalid("registry.discovery", pattern.as_str(), e.to_string()))?;
		}
		Ok(())
	}

	pub fn strip_tokens(&self) -> StripTokens {
		let mut tokens = StripTokens::builtin();
		tokens.extend_global(&self.registry.strip_tokens);
		for (namespace, extra) in &self.registry.namespace_strip_tokens {
			tokens.extend_namespace(namespace, extra);
		}
		tokens
	}

	pub fn store_options(&self) -> StoreOptions {
		StoreOptions {
			policy: self.registry.collision_policy,
			host: HostContext {
				app_label: self.registry.app_label.clone(),
				group: self.registry.default_group.clone(),
				default_domain: None,
			},
			strip_tokens: self.strip_tokens(),
		}
	}

	/// Creates an empty store configured from `[registry]`.
	pub fn build_store(&self) -> Arc<ComponentStore> {
		Arc::new(ComponentStore::new(self.store_options()))
	}

	pub fn dispatcher_config(&self) -> DispatcherConfig {
		DispatcherConfig {
			default_backend: self.dispatch.default_backend.clone(),
			default_mode: self.dispatch.default_mode,
			backend_fallback: self.dispatch.backend_fallback,
			queue_capacity: self.dispatch.queue_capacity,
			default_timeout: self.dispatch.default_timeout_ms.map(Duration::from_millis),
			retain_terminal: Some(self.dispatch.retain_terminal_ms.map_or(DispatcherConfig::DEFAULT_RETENTION, Duration::from_millis)),
		}
	}

	/// Runs every discovered registrar matching `[registry].discovery` against `store`.
	pub fn bootstrap(&self, store: &ComponentStore) -> Result<BootstrapReport> {
		self.bootstrap_with(Bootstrap::discovered(), store)
	}

	/// Like [`Self::bootstrap`] with an explicit registrar list.
	pub fn bootstrap_with(&self, bootstrap: Bootstrap, store: &ComponentStore) -> Result<BootstrapReport> {
		Ok(bootstrap.freeze(self.registry.freeze).run(store, &self.registry.discovery)?)
	}
}
