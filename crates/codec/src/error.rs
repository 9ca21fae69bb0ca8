use serde_json::Value;
use switchboard_invocation::Violation;
use switchboard_registry::{Identity, RegistryError};

use crate::record::DomainRecord;

/// Provider output did not match the codec's output schema.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("output does not match schema {schema:?}: {}", summarize(.violations))]
pub struct ValidationError {
	pub schema: String,
	/// Normalized output that was rejected.
	pub payload: Value,
	pub violations: Vec<Violation>,
}

fn summarize(violations: &[Violation]) -> String {
	match violations {
		[] => "no details".to_string(),
		[only] => only.to_string(),
		[first, rest @ ..] => format!("{first} (and {} more)", rest.len()),
	}
}

/// Failure reported by a [`crate::Sink`] or its transaction.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct SinkError {
	pub message: String,
}

impl SinkError {
	pub fn new(message: impl Into<String>) -> Self {
		Self { message: message.into() }
	}
}

/// The persist stage failed and its transaction was rolled back.
///
/// Carries the partial state that was discarded; none of it is visible to readers.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("persist failed after {} of {attempted} records: {source}", .written.len())]
pub struct PersistError {
	/// Records written inside the transaction before the failure.
	pub written: Vec<DomainRecord>,
	/// Record whose write failed; `None` when begin or commit failed.
	pub failed: Option<DomainRecord>,
	pub attempted: usize,
	/// Whether the rollback itself succeeded.
	pub rolled_back: bool,
	pub source: SinkError,
}

/// Post-commit side effect failure. Logged, never propagated.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("emitter {emitter}: {message}")]
pub struct EmitError {
	pub emitter: String,
	pub message: String,
}

impl EmitError {
	pub fn new(emitter: impl Into<String>, message: impl Into<String>) -> Self {
		Self {
			emitter: emitter.into(),
			message: message.into(),
		}
	}
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum CodecError {
	#[error(transparent)]
	Validation(#[from] ValidationError),

	#[error(transparent)]
	Persist(#[from] PersistError),

	#[error(transparent)]
	Registry(#[from] RegistryError),

	#[error("{identity} is registered but is not a codec")]
	NotACodec { identity: Identity },
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_validation_message_summarizes() {
		let err = ValidationError {
			schema: "feedback".into(),
			payload: Value::Null,
			violations: vec![
				Violation {
					path: "$.score".into(),
					message: "required property is missing".into(),
				},
				Violation {
					path: "$.notes".into(),
					message: "expected array, got string".into(),
				},
			],
		};
		assert_eq!(err.to_string(), "output does not match schema \"feedback\": $.score: required property is missing (and 1 more)");
	}
}
