//! The four-stage codec pipeline.
//!
//! # Role
//!
//! [`CodecPipeline::run`] turns one provider [`Response`] into persisted domain records:
//!
//! 1. validate: normalized output against the codec's [`OutputSchema`](switchboard_invocation::OutputSchema).
//! 2. restructure: sections grouped into entity buckets.
//! 3. persist: every record in one [`Transaction`](crate::Transaction).
//! 4. emit: [`Emitter`]s notified with what was committed.
//!
//! # Invariants
//!
//! - Stage order is fixed; [`Stages`] only switches stages off.
//! - A validation failure halts before anything is written.
//! - Persist is all or nothing: any failure rolls the transaction back and surfaces one
//!   [`PersistError`] carrying the discarded partial state.
//! - Emit runs only after persist succeeded or was switched off. Emit failures are logged
//!   and reported, never propagated; the commit stands.


use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use switchboard_invocation::{CorrelationId, MESSAGES_SECTION, Response};
use switchboard_registry::{ComponentStore, Identity, Lookup, RegistryError};
use tracing::Instrument;

use crate::codec::{Codec, CodecHandle, Stages, UnknownSection};
use crate::emit::{Committed, Emitter};
use crate::error::{CodecError, EmitError, PersistError, ValidationError};
use crate::record::{DomainRecord, EntityKind};
use crate::sink::{Sink, Transaction};

/// Output of the restructure stage.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Restructured {
	pub buckets: BTreeMap<EntityKind, Vec<DomainRecord>>,
	/// Sections with no mapping that were dropped, or skipped messages.
	pub dropped: Vec<String>,
}

impl Restructured {
	/// All records, bucket by bucket.
	pub fn records(&self) -> Vec<DomainRecord> {
		self.buckets.values().flatten().cloned().collect()
	}

	pub fn len(&self) -> usize {
		self.buckets.values().map(Vec::len).sum()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

/// Summary of one pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineReport {
	pub correlation_id: CorrelationId,
	/// Stages that actually ran.
	pub stages: Stages,
	/// Records committed, or produced when persist was switched off.
	pub records: Vec<DomainRecord>,
	pub dropped_sections: Vec<String>,
	pub emit_failures: Vec<EmitError>,
}

/// A codec bound to a sink and its emitters.
pub struct CodecPipeline {
	codec: Arc<dyn Codec>,
	identity: Option<Identity>,
	sink: Arc<dyn Sink>,
	emitters: Vec<Arc<dyn Emitter>>,
}

impl CodecPipeline {
	pub fn new(codec: Arc<dyn Codec>, sink: Arc<dyn Sink>) -> Self {
		Self {
			codec,
			identity: None,
			sink,
			emitters: Vec::new(),
		}
	}

	/// Builds a pipeline for the codec registered under `lookup`.
	pub fn resolve(store: &ComponentStore, lookup: impl Into<Lookup>, sink: Arc<dyn Sink>) -> Result<Self, CodecError> {
		let record = store.resolve(lookup)?;
		let identity = record.identity().clone();
		let handle = record.downcast::<CodecHandle>().map_err(|err| match err {
			RegistryError::TypeMismatch { .. } => CodecError::NotACodec { identity: identity.clone() },
			other => other.into(),
		})?;
		Ok(Self {
			codec: Arc::clone(handle.codec()),
			identity: Some(identity),
			sink,
			emitters: Vec::new(),
		})
	}

	pub fn with_emitter(mut self, emitter: Arc<dyn Emitter>) -> Self {
		self.emitters.push(emitter);
		self
	}

	pub fn identity(&self) -> Option<&Identity> {
		self.identity.as_ref()
	}

	fn codec_label(&self) -> String {
		match &self.identity {
			Some(identity) => identity.label(),
			None => self.codec.decl().short_name().to_string(),
		}
	}

	/// Checks the normalized output and returns it.
	pub fn validate(&self, response: &Response) -> Result<Value, ValidationError> {
		let output = response.normalized_output();
		let Some(schema) = self.codec.output_schema() else {
			return Ok(output);
		};
		match schema.validate(&output) {
			Ok(()) => Ok(output),
			Err(violations) => Err(ValidationError {
				schema: schema.name,
				payload: output,
				violations,
			}),
		}
	}

	/// Groups output sections into entity buckets.
	pub fn restructure(&self, output: &Value, correlation_id: CorrelationId) -> Restructured {
		let options = self.codec.options();
		let sections = self.codec.sections();
		let mut out = Restructured::default();
		let Value::Object(map) = output else {
			return out;
		};

		for (section, data) in map {
			let kind = if section == MESSAGES_SECTION {
				if !options.create_messages {
					out.dropped.push(section.clone());
					continue;
				}
				sections.get(section).cloned().unwrap_or(EntityKind::MESSAGE)
			} else {
				match (sections.get(section), &options.unknown_sections) {
					(Some(kind), _) => kind.clone(),
					(None, UnknownSection::Route(kind)) => kind.clone(),
					(None, UnknownSection::Drop) => {
						tracing::debug!(%section, "codec.section.dropped");
						out.dropped.push(section.clone());
						continue;
					}
				}
			};
			let bucket = out.buckets.entry(kind.clone()).or_default();
			for payload in self.codec.payloads(section, data) {
				bucket.push(DomainRecord::new(kind.clone(), section.clone(), payload, correlation_id));
			}
		}
		out
	}

	/// Writes `records` in one transaction.
	pub async fn persist(&self, records: &[DomainRecord]) -> Result<(), PersistError> {
		let attempted = records.len();
		let mut tx = self.sink.begin().await.map_err(|source| PersistError {
			written: Vec::new(),
			failed: None,
			attempted,
			rolled_back: true,
			source,
		})?;

		let mut written = Vec::with_capacity(attempted);
		for record in records {
			if let Err(source) = tx.write(record).await {
				let rolled_back = rollback(tx).await;
				return Err(PersistError {
					written,
					failed: Some(record.clone()),
					attempted,
					rolled_back,
					source,
				});
			}
			written.push(record.clone());
		}

		tx.commit().await.map_err(|source| PersistError {
			written,
			failed: None,
			attempted,
			rolled_back: true,
			source,
		})
	}

	/// Notifies every emitter; returns the failures.
	pub async fn emit(&self, committed: &Committed) -> Vec<EmitError> {
		let mut failures = Vec::new();
		for emitter in &self.emitters {
			if let Err(err) = emitter.emit(committed).await {
				tracing::warn!(emitter = emitter.name(), error = %err, correlation_id = %committed.correlation_id, "codec.emit.failed");
				failures.push(err);
			}
		}
		failures
	}

	/// Runs the enabled stages in order.
	pub async fn run(&self, response: &Response) -> Result<PipelineReport, CodecError> {
		let span = tracing::info_span!("codec.pipeline", codec = %self.codec_label(), correlation_id = %response.correlation_id);
		self.run_stages(response).instrument(span).await
	}

	async fn run_stages(&self, response: &Response) -> Result<PipelineReport, CodecError> {
		let enabled = self.codec.options().stages;
		let correlation_id = response.correlation_id;
		let mut ran = Stages::empty();

		let output = if enabled.contains(Stages::VALIDATE) {
			ran |= Stages::VALIDATE;
			self.validate(response).inspect_err(|err| {
				tracing::warn!(schema = %err.schema, violations = err.violations.len(), "codec.validate.failed");
			})?
		} else {
			response.normalized_output()
		};

		let restructured = if enabled.contains(Stages::RESTRUCTURE) {
			ran |= Stages::RESTRUCTURE;
			self.restructure(&output, correlation_id)
		} else {
			Restructured::default()
		};
		let records = restructured.records();
		tracing::debug!(records = records.len(), dropped = restructured.dropped.len(), "codec.restructured");

		if enabled.contains(Stages::PERSIST) && !records.is_empty() {
			ran |= Stages::PERSIST;
			self.persist(&records).await.inspect_err(|err| {
				tracing::error!(error = %err, rolled_back = err.rolled_back, "codec.persist.failed");
			})?;
			tracing::info!(records = records.len(), "codec.persist.committed");
		}

		let mut emit_failures = Vec::new();
		if enabled.contains(Stages::EMIT) && !records.is_empty() && !self.emitters.is_empty() {
			ran |= Stages::EMIT;
			let committed = Committed {
				codec: self.identity.clone(),
				correlation_id,
				records: records.clone(),
			};
			emit_failures = self.emit(&committed).await;
		}

		Ok(PipelineReport {
			correlation_id,
			stages: ran,
			records,
			dropped_sections: restructured.dropped,
			emit_failures,
		})
	}
}

async fn rollback(tx: Box<dyn Transaction>) -> bool {
	match tx.rollback().await {
		Ok(()) => true,
		Err(err) => {
			tracing::error!(error = %err, "codec.persist.rollback_failed");
			false
		}
	}
}

impl std::fmt::Debug for CodecPipeline {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("CodecPipeline")
			.field("codec", &self.codec_label())
			.field("emitters", &self.emitters.len())
			.finish_non_exhaustive()
	}
}
