use std::fmt;

use crate::identity::{Domain, Identity};

/// Identity segment named in resolution errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityField {
	Domain,
	Namespace,
	Group,
	Name,
}

impl fmt::Display for IdentityField {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Domain => write!(f, "domain"),
			Self::Namespace => write!(f, "namespace"),
			Self::Group => write!(f, "group"),
			Self::Name => write!(f, "name"),
		}
	}
}

/// Malformed identity input. Raised at registration time and fatal to that registration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentityError {
	#[error("empty {field} token after normalization (input {raw:?})")]
	EmptyToken { field: IdentityField, raw: String },

	#[error("{field} token {raw:?} contains {ch:?}, which is not allowed in identities")]
	InvalidCharacter { field: IdentityField, raw: String, ch: char },

	#[error("unsupported domain {0:?}")]
	UnsupportedDomain(String),

	#[error("no domain resolved for component {type_name}")]
	MissingDomain { type_name: &'static str },

	#[error("malformed identity label {label:?}: expected domain.namespace.group.name")]
	MalformedLabel { label: String },
}

/// Registry and store failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RegistryError {
	#[error(transparent)]
	Identity(#[from] IdentityError),

	#[error("registry {domain} is frozen")]
	Frozen { domain: Domain },

	#[error("identity collision at {identity}: existing={existing} incoming={incoming}")]
	Collision {
		identity: Identity,
		existing: &'static str,
		incoming: &'static str,
	},

	#[error("no component registered as {label}")]
	NotFound { label: String },

	#[error("identity {identity} does not belong to registry {expected}")]
	DomainMismatch { expected: Domain, identity: Identity },

	#[error("component {identity} is not a {expected}")]
	TypeMismatch { identity: Identity, expected: &'static str },

	#[error("invalid discovery pattern {pattern:?}: {message}")]
	Discovery { pattern: String, message: String },
}

impl RegistryError {
	/// Returns true for missing-component lookups.
	pub fn is_not_found(&self) -> bool {
		matches!(self, Self::NotFound { .. })
	}
}
