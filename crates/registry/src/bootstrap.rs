//! Link-time registrar discovery.
//!
//! # Role
//!
//! Crates submit a [`Registrar`] with [`registrar!`](crate::registrar). The linker collects every
//! submission; [`Bootstrap::run`] selects the ones whose module path matches the configured
//! discovery globs and runs them against a store in `(ordinal, module)` order.
//!
//! # Invariants
//!
//! - An empty pattern list selects every registrar.
//! - A failing registrar aborts the bootstrap; registrars after it do not run.
//! - With `freeze` set, the store is frozen only after every selected registrar succeeded.

use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::error::RegistryError;
use crate::store::ComponentStore;

/// Registration entry point contributed by one module.
#[derive(Clone, Copy)]
pub struct Registrar {
	/// Module path the registrar was submitted from.
	pub module: &'static str,
	/// Lower ordinals run first.
	pub ordinal: i32,
	pub register: fn(&ComponentStore) -> Result<(), RegistryError>,
}

inventory::collect!(Registrar);

impl std::fmt::Debug for Registrar {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Registrar").field("module", &self.module).field("ordinal", &self.ordinal).finish()
	}
}

/// Submits a registrar function for link-time discovery.
///
/// ```ignore
/// fn register(store: &ComponentStore) -> Result<(), RegistryError> { ... }
/// switchboard_registry::registrar!(register);
/// switchboard_registry::registrar!(register, ordinal = -10);
/// ```
#[macro_export]
macro_rules! registrar {
	($f:path) => {
		$crate::registrar!($f, ordinal = 0);
	};
	($f:path, ordinal = $ordinal:expr) => {
		$crate::inventory::submit! {
			$crate::Registrar {
				module: ::core::module_path!(),
				ordinal: $ordinal,
				register: $f,
			}
		}
	};
}

/// Outcome of a bootstrap run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BootstrapReport {
	/// Modules whose registrars ran, in run order.
	pub ran: Vec<&'static str>,
	/// Modules filtered out by the discovery patterns.
	pub skipped: Vec<&'static str>,
	pub frozen: bool,
}

/// Runs registrars against a store.
#[derive(Debug, Clone, Default)]
pub struct Bootstrap {
	registrars: Vec<Registrar>,
	freeze: bool,
}

impl Bootstrap {
	/// Empty bootstrap; add registrars with [`Self::with`].
	pub fn new() -> Self {
		Self::default()
	}

	/// Bootstrap seeded with every link-time registrar.
	pub fn discovered() -> Self {
		Self {
			registrars: inventory::iter::<Registrar>.into_iter().copied().collect(),
			freeze: false,
		}
	}

	pub fn with(mut self, registrar: Registrar) -> Self {
		self.registrars.push(registrar);
		self
	}

	/// Freezes the store after a successful run.
	pub fn freeze(mut self, freeze: bool) -> Self {
		self.freeze = freeze;
		self
	}

	pub fn registrars(&self) -> &[Registrar] {
		&self.registrars
	}

	/// Runs every registrar whose module matches one of `patterns`.
	pub fn run<S: AsRef<str>>(&self, store: &ComponentStore, patterns: &[S]) -> Result<BootstrapReport, RegistryError> {
		let filter = build_filter(patterns)?;
		let mut ordered = self.registrars.clone();
		ordered.sort_by(|a, b| a.ordinal.cmp(&b.ordinal).then_with(|| a.module.cmp(b.module)));

		let mut report = BootstrapReport::default();
		for reg in ordered {
			if filter.as_ref().is_some_and(|set| !set.is_match(reg.module)) {
				tracing::trace!(module = reg.module, "bootstrap.skip");
				report.skipped.push(reg.module);
				continue;
			}
			tracing::debug!(module = reg.module, ordinal = reg.ordinal, "bootstrap.run");
			(reg.register)(store).inspect_err(|error| tracing::error!(module = reg.module, %error, "bootstrap.failed"))?;
			report.ran.push(reg.module);
		}

		if self.freeze {
			store.freeze();
			report.frozen = true;
		}
		tracing::info!(ran = report.ran.len(), skipped = report.skipped.len(), frozen = report.frozen, "bootstrap.done");
		Ok(report)
	}
}

fn build_filter<S: AsRef<str>>(patterns: &[S]) -> Result<Option<GlobSet>, RegistryError> {
	if patterns.is_empty() {
		return Ok(None);
	}
	let mut builder = GlobSetBuilder::new();
	for pattern in patterns {
		let pattern = pattern.as_ref();
		let glob = Glob::new(pattern).map_err(|e| RegistryError::Discovery {
			pattern: pattern.to_string(),
			message: e.to_string(),
		})?;
		builder.add(glob);
	}
	builder.build().map(Some).map_err(|e| RegistryError::Discovery {
		pattern: patterns.iter().map(AsRef::as_ref).collect::<Vec<_>>().join(","),
		message: e.to_string(),
	})
}
