//! Domain records derived from provider output.

use std::borrow::Cow;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use switchboard_invocation::CorrelationId;
use uuid::Uuid;

/// Target entity kind a section is persisted as.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityKind(Cow<'static, str>);

impl EntityKind {
	/// Conversational message records.
	pub const MESSAGE: Self = Self::from_static("message");

	pub const fn from_static(kind: &'static str) -> Self {
		Self(Cow::Borrowed(kind))
	}

	pub fn new(kind: impl Into<Cow<'static, str>>) -> Self {
		Self(kind.into())
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for EntityKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl From<&'static str> for EntityKind {
	fn from(kind: &'static str) -> Self {
		Self::from_static(kind)
	}
}

/// One record written by the persist stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainRecord {
	pub id: Uuid,
	pub kind: EntityKind,
	/// Output section the record came from.
	pub section: String,
	pub payload: Value,
	pub correlation_id: CorrelationId,
	pub created_at: DateTime<Utc>,
}

impl DomainRecord {
	pub fn new(kind: EntityKind, section: impl Into<String>, payload: Value, correlation_id: CorrelationId) -> Self {
		Self {
			id: Uuid::new_v4(),
			kind,
			section: section.into(),
			payload,
			correlation_id,
			created_at: Utc::now(),
		}
	}
}
