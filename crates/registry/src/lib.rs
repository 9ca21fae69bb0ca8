//! Component identities, per-domain registries and active component stores.
//!
//! # Overview
//!
//! Every registrable component (service, codec, schema, prompt section, provider) gets a
//! canonical four-segment [`Identity`] `domain.namespace.group.name`. The
//! [`IdentityResolver`] derives it from caller [`IdentityHints`], the component's
//! [`ComponentDecl`], and the [`HostContext`]. Identities key one [`Registry`] per
//! [`Domain`], aggregated in a [`ComponentStore`].
//!
//! Registration targets the *active* store ([`ComponentStore::current_active`]); tests and
//! multi-tenant hosts push their own store for a scope.

pub mod bootstrap;
pub mod collision;
pub mod component;
pub mod error;
pub mod identity;
pub mod registry;
pub mod resolver;
pub mod store;

pub use bootstrap::{Bootstrap, BootstrapReport, Registrar};
pub use collision::{CollisionPolicy, CollisionRecord, Outcome};
pub use component::{Component, ComponentDecl, Lookup, RegistrationRecord};
pub use error::{IdentityError, IdentityField, RegistryError};
pub use identity::{Domain, Identity, normalize_token};
#[doc(hidden)]
pub use inventory;
pub use registry::Registry;
pub use resolver::{BUILTIN_STRIP_TOKENS, DEFAULT_SEGMENT, FieldSource, HostContext, IdentityHints, IdentityResolver, ResolutionMeta, Resolved, StripTokens};
pub use store::{ActiveStoreGuard, ComponentStore, Scoped, StoreOptions};

use std::sync::Arc;

/// Registers `component` in the active store.
#[track_caller]
pub fn register<C: Component>(component: C, hints: IdentityHints) -> Result<Identity, RegistryError> {
	ComponentStore::current_active().register(component, hints)
}

/// Resolves a component from the active store.
pub fn resolve(lookup: impl Into<Lookup>) -> Result<Arc<RegistrationRecord>, RegistryError> {
	ComponentStore::current_active().resolve(lookup)
}
