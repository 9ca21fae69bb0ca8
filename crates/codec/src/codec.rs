//! The codec contract.

use std::collections::BTreeMap;
use std::sync::Arc;

use bitflags::bitflags;
use serde_json::Value;
use switchboard_invocation::{MESSAGES_SECTION, OutputSchema};
use switchboard_registry::{Component, ComponentDecl, ComponentStore, Identity, IdentityHints, RegistryError};

use crate::record::EntityKind;

bitflags! {
	/// Pipeline stages a codec runs. Order is fixed regardless of which are enabled.
	#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
	pub struct Stages: u8 {
		/// Check normalized output against the codec's schema.
		const VALIDATE = 1 << 0;
		/// Group output sections into entity buckets.
		const RESTRUCTURE = 1 << 1;
		/// Write all records in one transaction.
		const PERSIST = 1 << 2;
		/// Notify emitters after commit.
		const EMIT = 1 << 3;
	}
}

impl Default for Stages {
	fn default() -> Self {
		Self::all()
	}
}

/// Handling of output sections the codec has no mapping for.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum UnknownSection {
	#[default]
	Drop,
	/// Persist under this entity kind.
	Route(EntityKind),
}

/// Per-codec pipeline configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecOptions {
	pub stages: Stages,
	/// Persist conversational messages. When off, only structured sections are written.
	pub create_messages: bool,
	pub unknown_sections: UnknownSection,
}

impl Default for CodecOptions {
	fn default() -> Self {
		Self {
			stages: Stages::default(),
			create_messages: true,
			unknown_sections: UnknownSection::Drop,
		}
	}
}

impl CodecOptions {
	pub fn without(mut self, stages: Stages) -> Self {
		self.stages.remove(stages);
		self
	}

	pub fn metadata_only(mut self) -> Self {
		self.create_messages = false;
		self
	}

	pub fn route_unknown(mut self, kind: impl Into<EntityKind>) -> Self {
		self.unknown_sections = UnknownSection::Route(kind.into());
		self
	}
}

/// Section name to entity kind.
pub type SectionMap = BTreeMap<String, EntityKind>;

/// Turns provider output into domain records.
pub trait Codec: Component {
	/// Shape the normalized output must satisfy. `None` accepts anything.
	fn output_schema(&self) -> Option<OutputSchema> {
		None
	}

	/// Entity kind for each structured section this codec understands.
	///
	/// The messages section maps to [`EntityKind::MESSAGE`] unless listed here.
	fn sections(&self) -> SectionMap {
		SectionMap::new()
	}

	fn options(&self) -> CodecOptions {
		CodecOptions::default()
	}

	/// Splits one section's data into record payloads.
	///
	/// The default writes one record per message and one record per structured section.
	fn payloads(&self, section: &str, data: &Value) -> Vec<Value> {
		match data {
			Value::Array(items) if section == MESSAGES_SECTION => items.clone(),
			other => vec![other.clone()],
		}
	}
}

/// Registry component wrapping a codec trait object. Declares as the inner codec.
#[derive(Clone)]
pub struct CodecHandle {
	inner: Arc<dyn Codec>,
}

impl CodecHandle {
	pub fn new<C: Codec>(codec: C) -> Self {
		Self { inner: Arc::new(codec) }
	}

	pub fn codec(&self) -> &Arc<dyn Codec> {
		&self.inner
	}
}

impl Component for CodecHandle {
	fn decl(&self) -> ComponentDecl {
		self.inner.decl()
	}
}

impl std::fmt::Debug for CodecHandle {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_tuple("CodecHandle").field(&self.inner.decl().type_name).finish()
	}
}

#[track_caller]
pub fn register_codec<C: Codec>(store: &ComponentStore, codec: C, hints: IdentityHints) -> Result<Identity, RegistryError> {
	let identity = store.register(CodecHandle::new(codec), hints)?;
	tracing::debug!(%identity, "codec.registered");
	Ok(identity)
}
