//! Component stores: one registry per domain plus the active-store stack.
//!
//! # Mental Model
//!
//! Registration code never touches a global. It targets [`ComponentStore::current_active`], which is
//! whatever store the current execution context pushed last, or the process default store
//! when nothing was pushed. Hosts and tests substitute stores with
//! [`ComponentStore::push_active`] (synchronous scopes) or [`ComponentStore::scope`]
//! (one async task).

mod active;


use std::collections::BTreeMap;
use std::panic::Location;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

pub use active::{ActiveStoreGuard, Scoped};
use parking_lot::RwLock;

use crate::collision::{CollisionPolicy, CollisionRecord};
use crate::component::{Component, Lookup, RegistrationRecord};
use crate::error::RegistryError;
use crate::identity::{Domain, Identity};
use crate::registry::Registry;
use crate::resolver::{HostContext, IdentityHints, IdentityResolver, Resolved, StripTokens};

/// Store-wide configuration.
#[derive(Debug, Clone, Default)]
pub struct StoreOptions {
	pub policy: CollisionPolicy,
	pub host: HostContext,
	pub strip_tokens: StripTokens,
}

/// Aggregate of per-domain registries.
pub struct ComponentStore {
	policy: CollisionPolicy,
	resolver: IdentityResolver,
	registries: RwLock<BTreeMap<Domain, Arc<Registry>>>,
	frozen: AtomicBool,
}

impl Default for ComponentStore {
	fn default() -> Self {
		Self::new(StoreOptions::default())
	}
}

impl ComponentStore {
	/// Creates a fresh, open store.
	pub fn new(options: StoreOptions) -> Self {
		Self {
			policy: options.policy,
			resolver: IdentityResolver::new(options.host, options.strip_tokens),
			registries: RwLock::new(BTreeMap::new()),
			frozen: AtomicBool::new(false),
		}
	}

	pub fn policy(&self) -> CollisionPolicy {
		self.policy
	}

	pub fn resolver(&self) -> &IdentityResolver {
		&self.resolver
	}

	/// Returns the registry for `domain`, creating it on first access.
	///
	/// Registries created after [`Self::freeze`] start out frozen.
	pub fn registry(&self, domain: Domain) -> Arc<Registry> {
		if let Some(reg) = self.registries.read().get(&domain) {
			return Arc::clone(reg);
		}
		let mut registries = self.registries.write();
		let reg = registries.entry(domain).or_insert_with(|| {
			let reg = Registry::new(domain, self.policy);
			if self.frozen.load(Ordering::Acquire) {
				reg.freeze();
			}
			Arc::new(reg)
		});
		Arc::clone(reg)
	}

	/// Registers a component, resolving its identity from its declaration and `hints`.
	#[track_caller]
	pub fn register<C: Component>(&self, component: C, hints: IdentityHints) -> Result<Identity, RegistryError> {
		self.register_arc(Arc::new(component), hints)
	}

	/// Registers a shared component.
	#[track_caller]
	pub fn register_arc<C: Component>(&self, component: Arc<C>, hints: IdentityHints) -> Result<Identity, RegistryError> {
		let source = Location::caller();
		let decl = component.decl();
		let Resolved { identity, .. } = self.resolver.resolve(&decl, &hints)?;
		let record = RegistrationRecord::new(component, &decl, identity.clone(), source);
		self.registry(identity.domain()).register(record)?;
		Ok(identity)
	}

	/// Finds the record registered under an identity or label.
	pub fn resolve(&self, lookup: impl Into<Lookup>) -> Result<Arc<RegistrationRecord>, RegistryError> {
		let identity = lookup.into().into_identity()?;
		let registry = self.registries.read().get(&identity.domain()).cloned();
		match registry {
			Some(reg) => reg.get(&identity),
			None => Err(RegistryError::NotFound { label: identity.label() }),
		}
	}

	/// Finds a component and downcasts it to its concrete type.
	pub fn resolve_as<T: Component>(&self, lookup: impl Into<Lookup>) -> Result<Arc<T>, RegistryError> {
		self.resolve(lookup)?.downcast::<T>()
	}

	/// Freezes every registry, including ones created later.
	pub fn freeze(&self) {
		let registries = self.registries.write();
		self.frozen.store(true, Ordering::Release);
		for reg in registries.values() {
			reg.freeze();
		}
		tracing::info!(domains = registries.len(), "component_store.freeze");
	}

	pub fn is_frozen(&self) -> bool {
		self.frozen.load(Ordering::Acquire)
	}

	/// Domains that have a registry, in order.
	pub fn domains(&self) -> Vec<Domain> {
		self.registries.read().keys().copied().collect()
	}

	/// Lenient-mode collisions across all registries, grouped by domain.
	pub fn list_collisions(&self) -> Vec<CollisionRecord> {
		self.registries.read().values().flat_map(|reg| reg.collisions()).collect()
	}

	/// Total number of registered components.
	pub fn len(&self) -> usize {
		self.registries.read().values().map(|reg| reg.len()).sum()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

impl std::fmt::Debug for ComponentStore {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ComponentStore")
			.field("policy", &self.policy)
			.field("frozen", &self.is_frozen())
			.field("registries", &*self.registries.read())
			.finish()
	}
}
