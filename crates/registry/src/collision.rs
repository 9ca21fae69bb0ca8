//! Collision vocabulary and policy evaluation.
//!
//! # Role
//!
//! A collision is two distinct component types claiming one [`Identity`]. The store-wide
//! [`CollisionPolicy`] decides whether that aborts the registration or overwrites it.
//!
//! # Invariants
//!
//! - Re-registering the same type under the same identity is always a no-op.
//! - Strict collisions leave the existing record untouched.
//! - Lenient collisions overwrite and append exactly one [`CollisionRecord`].

use std::fmt;
use std::panic::Location;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::component::RegistrationRecord;
use crate::identity::Identity;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollisionPolicy {
	/// Raise on a collision between different component types.
	#[default]
	Strict,
	/// Record the collision, warn, and let the last registration win.
	Lenient,
}

impl CollisionPolicy {
	/// Classifies an incoming registration against whatever already holds its identity.
	pub fn evaluate(self, incoming: &RegistrationRecord, existing: Option<&RegistrationRecord>) -> Outcome {
		match existing {
			None => Outcome::Accept,
			Some(existing) if existing.type_id() == incoming.type_id() => Outcome::NoOpSame,
			Some(_) => match self {
				Self::Strict => Outcome::CollisionStrict,
				Self::Lenient => Outcome::CollisionLenient,
			},
		}
	}
}

impl fmt::Display for CollisionPolicy {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Strict => write!(f, "strict"),
			Self::Lenient => write!(f, "lenient"),
		}
	}
}

impl std::str::FromStr for CollisionPolicy {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.trim().to_ascii_lowercase().as_str() {
			"strict" => Ok(Self::Strict),
			"lenient" => Ok(Self::Lenient),
			other => Err(format!("unknown collision policy {other:?}")),
		}
	}
}

/// Result of evaluating one registration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
	/// Identity was free; record inserted.
	Accept,
	/// Same component type already registered; nothing changed.
	NoOpSame,
	/// Different type under strict policy; registration rejected.
	CollisionStrict,
	/// Different type under lenient policy; existing record replaced.
	CollisionLenient,
}

/// Audit entry for a collision.
#[derive(Debug, Clone)]
pub struct CollisionRecord {
	pub identity: Identity,
	pub incoming: &'static str,
	pub existing: &'static str,
	pub outcome: Outcome,
	pub source: &'static Location<'static>,
	pub recorded_at: DateTime<Utc>,
}

impl CollisionRecord {
	pub(crate) fn new(incoming: &RegistrationRecord, existing: &RegistrationRecord, outcome: Outcome) -> Self {
		Self {
			identity: incoming.identity().clone(),
			incoming: incoming.type_name(),
			existing: existing.type_name(),
			outcome,
			source: incoming.source(),
			recorded_at: Utc::now(),
		}
	}
}
