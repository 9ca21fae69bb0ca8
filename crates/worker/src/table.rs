use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use switchboard_invocation::Response;
use tokio_util::sync::CancellationToken;

use crate::error::{DispatchError, ExecutionError};
use crate::status::{TaskId, TaskState, TaskStatus};

struct Entry {
	status: Mutex<TaskStatus>,
	cancel: CancellationToken,
}

/// In-memory table of service calls, pollable by id.
///
/// Each record has its own lock, so calls never share mutable state. With a retention
/// window set, terminal records older than the window are swept on insert, at most once
/// per window.
#[derive(Default, Clone)]
pub struct TaskTable {
	inner: Arc<RwLock<FxHashMap<TaskId, Arc<Entry>>>>,
	retention: Option<Duration>,
	last_sweep: Arc<Mutex<Option<Instant>>>,
}

impl TaskTable {
	/// A table that keeps every record until [`Self::prune_terminal`] is called.
	pub fn new() -> Self {
		Self::default()
	}

	/// A table that drops terminal records once they are older than `retention`.
	pub fn with_retention(retention: Option<Duration>) -> Self {
		Self {
			retention,
			..Self::default()
		}
	}

	pub fn retention(&self) -> Option<Duration> {
		self.retention
	}

	fn sweep(&self) {
		let Some(retention) = self.retention else {
			return;
		};
		{
			let mut last = self.last_sweep.lock();
			let now = Instant::now();
			if last.is_some_and(|at| now.duration_since(at) < retention) {
				return;
			}
			*last = Some(now);
		}
		self.prune_terminal(retention);
	}

	/// Inserts a pending record. The call context's token becomes the task's cancellation token.
	pub(crate) fn insert(&self, status: TaskStatus) -> (TaskId, CancellationToken) {
		self.sweep();
		let cancel = status.context.cancel.clone();
		let id = status.id;
		tracing::trace!(task = %id, service = %status.service, backend = %status.backend, "task.created");
		let entry = Arc::new(Entry {
			status: Mutex::new(status),
			cancel: cancel.clone(),
		});
		self.inner.write().insert(id, entry);
		(id, cancel)
	}

	fn entry(&self, id: TaskId) -> Result<Arc<Entry>, DispatchError> {
		self.inner.read().get(&id).cloned().ok_or(DispatchError::TaskNotFound { id })
	}

	pub fn get_status(&self, id: TaskId) -> Result<TaskStatus, DispatchError> {
		Ok(self.entry(id)?.status.lock().clone())
	}

	pub fn contains(&self, id: TaskId) -> bool {
		self.inner.read().contains_key(&id)
	}

	/// `pending -> running`. False when the task is gone or no longer pending.
	pub(crate) fn start(&self, id: TaskId) -> bool {
		let Ok(entry) = self.entry(id) else {
			return false;
		};
		let started = entry.status.lock().transition(TaskState::Running);
		if started {
			tracing::debug!(task = %id, "task.running");
		}
		started
	}

	/// Records the outcome. A task that is already terminal keeps its first outcome.
	pub(crate) fn finish(&self, id: TaskId, outcome: Result<Response, ExecutionError>) -> bool {
		let Ok(entry) = self.entry(id) else {
			return false;
		};
		let mut status = entry.status.lock();
		let error = outcome.as_ref().err().cloned();
		if !status.finish(outcome) {
			tracing::trace!(task = %id, state = %status.status, "task.finish.ignored");
			return false;
		}
		match error {
			None => tracing::debug!(task = %id, "task.succeeded"),
			Some(ExecutionError::Cancelled) => tracing::debug!(task = %id, "task.cancelled"),
			Some(err) => tracing::warn!(task = %id, error = %err, retryable = err.is_retryable(), "task.failed"),
		}
		true
	}

	/// Cancels a pending or running task. Returns the state after the call.
	pub fn cancel(&self, id: TaskId) -> Result<TaskState, DispatchError> {
		let entry = self.entry(id)?;
		let mut status = entry.status.lock();
		if status.finish(Err(ExecutionError::Cancelled)) {
			entry.cancel.cancel();
			tracing::debug!(task = %id, "task.cancel");
		}
		Ok(status.status)
	}

	/// All records, oldest first.
	pub fn list(&self) -> Vec<TaskStatus> {
		let entries: Vec<Arc<Entry>> = self.inner.read().values().cloned().collect();
		let mut records: Vec<TaskStatus> = entries.iter().map(|e| e.status.lock().clone()).collect();
		records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
		records
	}

	/// Drops terminal records that finished more than `older_than` ago.
	pub fn prune_terminal(&self, older_than: Duration) -> usize {
		let cutoff = chrono::Duration::from_std(older_than).map_or(chrono::DateTime::<Utc>::MIN_UTC, |d| Utc::now() - d);
		let mut inner = self.inner.write();
		let before = inner.len();
		inner.retain(|_, entry| {
			let status = entry.status.lock();
			!(status.is_terminal() && status.finished_at.is_some_and(|at| at <= cutoff))
		});
		let pruned = before - inner.len();
		if pruned > 0 {
			tracing::debug!(pruned, remaining = inner.len(), "task.prune");
		}
		pruned
	}

	pub fn len(&self) -> usize {
		self.inner.read().len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

impl std::fmt::Debug for TaskTable {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("TaskTable").field("len", &self.len()).finish()
	}
}

#[cfg(test)]
mod tests {
	use serde_json::Value;
	use switchboard_invocation::CorrelationId;
	use switchboard_registry::Identity;

	use super::*;
	use crate::backend::ExecutionMode;
	use crate::status::CallContext;

	fn pending(table: &TaskTable) -> (TaskId, CancellationToken) {
		table.insert(TaskStatus::new(
			Identity::parse("services.app.default.echo").unwrap(),
			"immediate".into(),
			ExecutionMode::Sync,
			Value::Null,
			CallContext::new(),
		))
	}

	#[test]
	fn test_unknown_task() {
		let table = TaskTable::new();
		assert!(matches!(table.get_status(TaskId::new()), Err(DispatchError::TaskNotFound { .. })));
	}

	/// Cancelling trips the token, and a late outcome does not overwrite it.
	#[test]
	fn test_cancel_is_final() {
		let table = TaskTable::new();
		let (id, token) = pending(&table);
		assert!(table.start(id));
		assert_eq!(table.cancel(id).unwrap(), TaskState::Cancelled);
		assert!(token.is_cancelled());
		assert!(!table.finish(id, Ok(Response::new(CorrelationId::new()))));
		assert_eq!(table.get_status(id).unwrap().status, TaskState::Cancelled);
	}

	#[test]
	fn test_cancel_terminal_is_noop() {
		let table = TaskTable::new();
		let (id, token) = pending(&table);
		table.start(id);
		table.finish(id, Err(ExecutionError::failed("boom")));
		assert_eq!(table.cancel(id).unwrap(), TaskState::Failed);
		assert!(!token.is_cancelled());
	}

	#[test]
	fn test_prune_keeps_live_tasks() {
		let table = TaskTable::new();
		let (done, _) = pending(&table);
		let (live, _) = pending(&table);
		table.start(done);
		table.finish(done, Err(ExecutionError::failed("x")));

		assert_eq!(table.prune_terminal(Duration::from_secs(3600)), 0);
		assert_eq!(table.prune_terminal(Duration::ZERO), 1);
		assert!(!table.contains(done));
		assert!(table.contains(live));
		assert_eq!(table.list().len(), 1);
	}

	/// With a retention window, finished records are swept when new ones arrive.
	#[test]
	fn test_retention_sweeps_on_insert() {
		let table = TaskTable::with_retention(Some(Duration::ZERO));
		for _ in 0..50 {
			let (id, _) = pending(&table);
			table.start(id);
			table.finish(id, Ok(Response::new(CorrelationId::new())));
		}
		assert_eq!(table.len(), 1);

		let (live, _) = pending(&table);
		let (next, _) = pending(&table);
		assert!(table.contains(live));
		assert!(table.contains(next));
		assert_eq!(table.len(), 2);
	}

	#[test]
	fn test_long_retention_keeps_records() {
		let table = TaskTable::with_retention(Some(Duration::from_secs(3600)));
		for _ in 0..5 {
			let (id, _) = pending(&table);
			table.start(id);
			table.finish(id, Err(ExecutionError::failed("x")));
		}
		assert_eq!(table.len(), 5);
	}
}
