//! Service-call lifecycle records.
//!
//! # Invariants
//!
//! - `pending -> running -> {succeeded | failed | cancelled}`; `pending` may also go straight
//!   to `failed` (submission failure) or `cancelled`.
//! - Terminal records never change again.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use switchboard_invocation::{CorrelationId, Response};
use switchboard_registry::Identity;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::backend::ExecutionMode;
use crate::error::ExecutionError;

/// Unique per invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(Uuid);

impl TaskId {
	pub fn new() -> Self {
		Self(Uuid::new_v4())
	}
}

impl Default for TaskId {
	fn default() -> Self {
		Self::new()
	}
}

impl fmt::Display for TaskId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		self.0.fmt(f)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
	Pending,
	Running,
	Succeeded,
	Failed,
	Cancelled,
}

impl TaskState {
	pub fn is_terminal(self) -> bool {
		matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
	}

	pub fn can_transition(self, to: TaskState) -> bool {
		match (self, to) {
			(Self::Pending, Self::Running | Self::Failed | Self::Cancelled) => true,
			(Self::Running, Self::Succeeded | Self::Failed | Self::Cancelled) => true,
			_ => false,
		}
	}

	pub fn as_str(self) -> &'static str {
		match self {
			Self::Pending => "pending",
			Self::Running => "running",
			Self::Succeeded => "succeeded",
			Self::Failed => "failed",
			Self::Cancelled => "cancelled",
		}
	}
}

impl fmt::Display for TaskState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Caller-side context that travels with a call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CallContext {
	pub correlation_id: CorrelationId,
	/// Free-form values for the service (tenant, user, trace baggage).
	#[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
	pub values: BTreeMap<String, Value>,
	/// Upper bound for synchronous execution.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub timeout: Option<Duration>,
	/// Target queue for enqueued calls.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub queue: Option<String>,
	/// Delay before an enqueued call may run.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub delay: Option<Duration>,
	/// Cancelled when the task is cancelled or times out.
	#[serde(skip)]
	pub cancel: CancellationToken,
}

impl CallContext {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_correlation_id(mut self, id: CorrelationId) -> Self {
		self.correlation_id = id;
		self
	}

	pub fn with_value(mut self, key: impl Into<String>, value: Value) -> Self {
		self.values.insert(key.into(), value);
		self
	}

	pub fn with_timeout(mut self, timeout: Duration) -> Self {
		self.timeout = Some(timeout);
		self
	}

	pub fn with_queue(mut self, queue: impl Into<String>) -> Self {
		self.queue = Some(queue.into());
		self
	}

	pub fn with_delay(mut self, delay: Duration) -> Self {
		self.delay = Some(delay);
		self
	}

	pub fn is_cancelled(&self) -> bool {
		self.cancel.is_cancelled()
	}
}

/// Snapshot of one service call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskStatus {
	pub id: TaskId,
	pub service: Identity,
	pub backend: String,
	pub mode: ExecutionMode,
	pub status: TaskState,
	pub input: Value,
	pub context: CallContext,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub result: Option<Response>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<ExecutionError>,
	pub created_at: DateTime<Utc>,
	#[serde(default)]
	pub started_at: Option<DateTime<Utc>>,
	#[serde(default)]
	pub finished_at: Option<DateTime<Utc>>,
	pub correlation_id: CorrelationId,
}

impl TaskStatus {
	pub(crate) fn new(service: Identity, backend: String, mode: ExecutionMode, input: Value, context: CallContext) -> Self {
		Self {
			id: TaskId::new(),
			service,
			backend,
			mode,
			status: TaskState::Pending,
			input,
			correlation_id: context.correlation_id,
			context,
			result: None,
			error: None,
			created_at: Utc::now(),
			started_at: None,
			finished_at: None,
		}
	}

	pub fn is_terminal(&self) -> bool {
		self.status.is_terminal()
	}

	/// Applies a transition; returns false and changes nothing when it is not allowed.
	pub(crate) fn transition(&mut self, to: TaskState) -> bool {
		if !self.status.can_transition(to) {
			return false;
		}
		let now = Utc::now();
		if to == TaskState::Running {
			self.started_at = Some(now);
		}
		if to.is_terminal() {
			self.finished_at = Some(now);
		}
		self.status = to;
		true
	}

	/// Moves to the terminal state matching `outcome`.
	pub(crate) fn finish(&mut self, outcome: Result<Response, ExecutionError>) -> bool {
		let to = match &outcome {
			Ok(_) => TaskState::Succeeded,
			Err(ExecutionError::Cancelled) => TaskState::Cancelled,
			Err(_) => TaskState::Failed,
		};
		if !self.transition(to) {
			return false;
		}
		match outcome {
			Ok(response) => self.result = Some(response),
			Err(err) => self.error = Some(err),
		}
		true
	}
}
