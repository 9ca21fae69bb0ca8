//! Component declarations and registration records.

use std::any::{Any, TypeId};
use std::borrow::Cow;
use std::panic::Location;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::error::{IdentityError, RegistryError};
use crate::identity::{Domain, Identity};

/// A registrable piece of the framework.
///
/// Implementors describe themselves with one [`ComponentDecl`]; every identity hint a
/// component carries lives in that record.
pub trait Component: Any + Send + Sync {
	/// Returns the declaration used for identity resolution.
	fn decl(&self) -> ComponentDecl;
}

/// Per-component identity configuration.
///
/// Unset fields fall through to host defaults and then domain defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentDecl {
	/// Rust type the declaration describes; "same component" means same type.
	pub type_id: TypeId,
	/// Full Rust type path.
	pub type_name: &'static str,
	pub domain: Option<Domain>,
	pub namespace: Option<Cow<'static, str>>,
	pub group: Option<Cow<'static, str>>,
	pub name: Option<Cow<'static, str>>,
}

impl ComponentDecl {
	/// Creates an empty declaration for `T`.
	pub fn of<T: Any>() -> Self {
		Self {
			type_id: TypeId::of::<T>(),
			type_name: std::any::type_name::<T>(),
			domain: None,
			namespace: None,
			group: None,
			name: None,
		}
	}

	/// Derives the name and module path from `N` while keeping this declaration's type identity.
	///
	/// Adapters use this so they resolve separately from the type they wrap.
	pub fn named_after<N: Any>(mut self) -> Self {
		self.type_name = std::any::type_name::<N>();
		self
	}

	pub fn domain(mut self, domain: Domain) -> Self {
		self.domain = Some(domain);
		self
	}

	pub fn namespace(mut self, namespace: impl Into<Cow<'static, str>>) -> Self {
		self.namespace = Some(namespace.into());
		self
	}

	pub fn group(mut self, group: impl Into<Cow<'static, str>>) -> Self {
		self.group = Some(group.into());
		self
	}

	pub fn name(mut self, name: impl Into<Cow<'static, str>>) -> Self {
		self.name = Some(name.into());
		self
	}

	/// Type path without generic arguments.
	fn bare_path(&self) -> &'static str {
		match self.type_name.find('<') {
			Some(idx) => &self.type_name[..idx],
			None => self.type_name,
		}
	}

	/// Last path segment of the type name (`GeneratePatientService`).
	pub fn short_name(&self) -> &'static str {
		let path = self.bare_path();
		path.rsplit("::").next().unwrap_or(path)
	}

	/// Module path the type lives in (`telemed::services`).
	pub fn module_path(&self) -> &'static str {
		let path = self.bare_path();
		match path.rfind("::") {
			Some(idx) => &path[..idx],
			None => "",
		}
	}

	/// First module path segment, normally the owning crate.
	pub fn crate_segment(&self) -> &'static str {
		self.module_path().split("::").next().unwrap_or("")
	}
}

/// Immutable record of one registration.
#[derive(Clone)]
pub struct RegistrationRecord {
	component: Arc<dyn Component>,
	any: Arc<dyn Any + Send + Sync>,
	identity: Identity,
	type_id: TypeId,
	type_name: &'static str,
	source: &'static Location<'static>,
	registered_at: DateTime<Utc>,
}

impl RegistrationRecord {
	pub(crate) fn new<C: Component>(component: Arc<C>, decl: &ComponentDecl, identity: Identity, source: &'static Location<'static>) -> Self {
		Self {
			any: component.clone(),
			component,
			identity,
			type_id: decl.type_id,
			type_name: decl.type_name,
			source,
			registered_at: Utc::now(),
		}
	}

	pub fn component(&self) -> &Arc<dyn Component> {
		&self.component
	}

	pub fn identity(&self) -> &Identity {
		&self.identity
	}

	/// Type identity of the declared component.
	pub fn type_id(&self) -> TypeId {
		self.type_id
	}

	pub fn type_name(&self) -> &'static str {
		self.type_name
	}

	/// Call site that performed the registration.
	pub fn source(&self) -> &'static Location<'static> {
		self.source
	}

	pub fn registered_at(&self) -> DateTime<Utc> {
		self.registered_at
	}

	/// Downcasts the registered component to its concrete type.
	pub fn downcast<T: Component>(&self) -> Result<Arc<T>, RegistryError> {
		self.any.clone().downcast::<T>().map_err(|_| RegistryError::TypeMismatch {
			identity: self.identity.clone(),
			expected: std::any::type_name::<T>(),
		})
	}
}

impl std::fmt::Debug for RegistrationRecord {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("RegistrationRecord")
			.field("identity", &self.identity.label())
			.field("type_name", &self.type_name)
			.field("source", &format_args!("{}:{}", self.source.file(), self.source.line()))
			.field("registered_at", &self.registered_at)
			.finish()
	}
}

/// Lookup key accepted by resolve APIs: an identity or its label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
	Identity(Identity),
	Label(String),
}

impl Lookup {
	/// Converts into a parsed identity.
	pub fn into_identity(self) -> Result<Identity, IdentityError> {
		match self {
			Self::Identity(id) => Ok(id),
			Self::Label(label) => Identity::parse(&label),
		}
	}
}

impl From<Identity> for Lookup {
	fn from(id: Identity) -> Self {
		Self::Identity(id)
	}
}

impl From<&Identity> for Lookup {
	fn from(id: &Identity) -> Self {
		Self::Identity(id.clone())
	}
}

impl From<&str> for Lookup {
	fn from(label: &str) -> Self {
		Self::Label(label.to_string())
	}
}

impl From<String> for Lookup {
	fn from(label: String) -> Self {
		Self::Label(label)
	}
}
