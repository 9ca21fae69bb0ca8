use serde::{Deserialize, Serialize};
use switchboard_invocation::ProviderError;
use switchboard_registry::{Identity, RegistryError};

use crate::backend::ExecutionMode;
use crate::status::TaskId;

/// Failure inside a dispatched call.
///
/// Stored on the task record, so it is cloneable and serializable.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExecutionError {
	#[error("transport failure: {message}")]
	Transport { message: String },

	#[error("timed out after {millis} ms")]
	Timeout { millis: u64 },

	#[error("invalid input: {message}")]
	Invalid { message: String },

	#[error("service failed: {message}")]
	Failed { message: String },

	#[error("provider {provider}: {message}")]
	Provider { provider: String, message: String, retryable: bool },

	#[error("call cancelled")]
	Cancelled,

	#[error("worker task aborted: {message}")]
	Aborted { message: String },
}

impl ExecutionError {
	pub fn transport(message: impl Into<String>) -> Self {
		Self::Transport { message: message.into() }
	}

	pub fn invalid(message: impl Into<String>) -> Self {
		Self::Invalid { message: message.into() }
	}

	pub fn failed(message: impl Into<String>) -> Self {
		Self::Failed { message: message.into() }
	}

	/// Transient failures that a queue may retry; application failures are never retryable.
	pub fn is_retryable(&self) -> bool {
		match self {
			Self::Transport { .. } | Self::Timeout { .. } => true,
			Self::Provider { retryable, .. } => *retryable,
			Self::Invalid { .. } | Self::Failed { .. } | Self::Cancelled | Self::Aborted { .. } => false,
		}
	}
}

impl From<ProviderError> for ExecutionError {
	fn from(err: ProviderError) -> Self {
		Self::Provider {
			provider: err.provider,
			message: err.message,
			retryable: err.retryable,
		}
	}
}

/// Dispatch failures surfaced to the immediate caller.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DispatchError {
	#[error(transparent)]
	Registry(#[from] RegistryError),

	#[error("no execution backend named {name:?}")]
	BackendNotFound { name: String },

	#[error("backend {backend:?} does not support {mode} execution")]
	UnsupportedMode { backend: String, mode: ExecutionMode },

	#[error("component {identity} is not a service")]
	NotAService { identity: Identity },

	#[error("unknown task {id}")]
	TaskNotFound { id: TaskId },

	#[error(transparent)]
	Execution(#[from] ExecutionError),
}

impl DispatchError {
	/// Execution failure carried by this error, if any.
	pub fn execution(&self) -> Option<&ExecutionError> {
		match self {
			Self::Execution(err) => Some(err),
			_ => None,
		}
	}
}
