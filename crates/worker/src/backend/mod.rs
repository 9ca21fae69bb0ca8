//! Execution backends.
//!
//! # Role
//!
//! A backend receives a [`ServiceCall`] whose task record already exists in the
//! [`TaskTable`] and decides *how* it runs:
//!
//! - [`ImmediateBackend`]: inline; the caller awaits a terminal result.
//! - [`EnqueueBackend`]: handed to a [`TaskQueue`]; the caller gets a pending [`TaskStatus`].
//! - [`StreamBackend`]: the caller gets a [`ChunkStream`] ending in exactly one final chunk.
//!
//! Immediate and queued execution share [`execute`], so blocking and non-blocking paths
//! cannot drift apart.

mod enqueue;
mod immediate;
mod stream;

use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
pub use enqueue::{DEFAULT_QUEUE, EnqueueBackend, JobPayload, LocalQueue, QueuedJob, TaskQueue};
pub use immediate::ImmediateBackend;
use serde::{Deserialize, Serialize};
use serde_json::Value;
pub use stream::{ChunkStream, StreamBackend};
use switchboard_invocation::Response;
use switchboard_registry::Identity;

use crate::error::{DispatchError, ExecutionError};
use crate::service::Service;
use crate::status::{CallContext, TaskId, TaskState, TaskStatus};
use crate::table::TaskTable;

/// Requested execution contract.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
	#[default]
	Sync,
	Enqueue,
	Stream,
}

impl ExecutionMode {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Sync => "sync",
			Self::Enqueue => "enqueue",
			Self::Stream => "stream",
		}
	}

	/// Built-in backend that serves this mode.
	pub fn builtin_backend(self) -> &'static str {
		match self {
			Self::Sync => ImmediateBackend::NAME,
			Self::Enqueue => EnqueueBackend::NAME,
			Self::Stream => StreamBackend::NAME,
		}
	}
}

impl fmt::Display for ExecutionMode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for ExecutionMode {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.trim().to_ascii_lowercase().as_str() {
			"sync" => Ok(Self::Sync),
			"enqueue" => Ok(Self::Enqueue),
			"stream" => Ok(Self::Stream),
			other => Err(format!("unknown execution mode {other:?}")),
		}
	}
}

/// One call handed to a backend.
pub struct ServiceCall {
	pub task: TaskId,
	pub identity: Identity,
	pub service: Arc<dyn Service>,
	pub input: Value,
	pub context: CallContext,
	pub mode: ExecutionMode,
	pub tasks: TaskTable,
}

impl fmt::Debug for ServiceCall {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ServiceCall")
			.field("task", &self.task)
			.field("identity", &self.identity.label())
			.field("mode", &self.mode)
			.finish_non_exhaustive()
	}
}

/// What a dispatch hands back, by mode.
#[derive(Debug)]
pub enum Dispatched {
	/// Terminal result of a synchronous call.
	Response(Response),
	/// Snapshot of a queued call; poll the task table for progress.
	Task(TaskStatus),
	Stream(ChunkStream),
}

impl Dispatched {
	pub fn into_response(self) -> Option<Response> {
		match self {
			Self::Response(response) => Some(response),
			_ => None,
		}
	}

	pub fn into_task(self) -> Option<TaskStatus> {
		match self {
			Self::Task(status) => Some(status),
			_ => None,
		}
	}

	pub fn into_stream(self) -> Option<ChunkStream> {
		match self {
			Self::Stream(stream) => Some(stream),
			_ => None,
		}
	}
}

#[async_trait]
pub trait ExecutionBackend: Send + Sync + 'static {
	fn name(&self) -> &str;

	fn supports(&self, mode: ExecutionMode) -> bool;

	async fn submit(&self, call: ServiceCall) -> Result<Dispatched, DispatchError>;
}

async fn with_timeout<F>(limit: Option<Duration>, fut: F) -> Result<Response, ExecutionError>
where
	F: Future<Output = Result<Response, ExecutionError>>,
{
	match limit {
		None => fut.await,
		Some(limit) => tokio::time::timeout(limit, fut).await.unwrap_or_else(|_| {
			Err(ExecutionError::Timeout {
				millis: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
			})
		}),
	}
}

/// Runs one call to a terminal state and records it.
///
/// Timeouts and cancellation trip the call's token so in-flight provider work stops.
pub(crate) async fn execute(tasks: &TaskTable, task: TaskId, service: &dyn Service, input: Value, ctx: &CallContext) -> Result<Response, ExecutionError> {
	if !tasks.start(task) {
		let status = tasks.get_status(task).map_err(|e| ExecutionError::Aborted { message: e.to_string() })?;
		return Err(status.error.unwrap_or(ExecutionError::Cancelled));
	}

	let cancel = ctx.cancel.clone();
	let outcome = tokio::select! {
		biased;
		() = cancel.cancelled() => Err(ExecutionError::Cancelled),
		result = with_timeout(ctx.timeout, service.call(input, ctx)) => result,
	};
	if matches!(outcome, Err(ExecutionError::Timeout { .. })) {
		cancel.cancel();
	}

	if !tasks.finish(task, outcome.clone()) && tasks.get_status(task).is_ok_and(|s| s.status == TaskState::Cancelled) {
		return Err(ExecutionError::Cancelled);
	}
	outcome
}
