//! Queued execution.
//!
//! [`EnqueueBackend`] turns a call into a [`QueuedJob`] and hands it to a [`TaskQueue`].
//! The job's [`JobPayload`] is the serializable part an out-of-process queue would ship;
//! it always carries the caller's correlation id. [`LocalQueue`] is the in-process queue:
//! one bounded channel per queue name, drained by a forwarding task that spawns each job.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use switchboard_invocation::{CorrelationId, Response};
use switchboard_registry::Identity;
use tokio::sync::mpsc;

use super::{Dispatched, ExecutionBackend, ExecutionMode, ServiceCall, execute};
use crate::error::{DispatchError, ExecutionError};
use crate::service::Service;
use crate::spawn::{TaskClass, spawn};
use crate::status::{CallContext, TaskId};
use crate::table::TaskTable;

/// Queue used when neither the caller nor the service names one.
pub const DEFAULT_QUEUE: &str = "default";

/// Serializable description of a queued call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobPayload {
	pub task: TaskId,
	pub service: Identity,
	pub queue: String,
	pub input: Value,
	pub context: CallContext,
	pub correlation_id: CorrelationId,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub not_before: Option<DateTime<Utc>>,
}

/// A queued call plus what is needed to run it in-process.
pub struct QueuedJob {
	pub payload: JobPayload,
	service: Arc<dyn Service>,
	tasks: TaskTable,
}

impl QueuedJob {
	/// Delay requested by the caller.
	pub fn delay(&self) -> Option<Duration> {
		self.payload.context.delay
	}

	/// Runs the call and records its outcome on the task.
	pub async fn run(self) -> Result<Response, ExecutionError> {
		let QueuedJob { payload, service, tasks } = self;
		tracing::debug!(task = %payload.task, queue = %payload.queue, correlation_id = %payload.correlation_id, "queue.job.run");
		execute(&tasks, payload.task, service.as_ref(), payload.input, &payload.context).await
	}

	/// Marks the task failed without running it.
	pub fn reject(self, error: ExecutionError) {
		self.tasks.finish(self.payload.task, Err(error));
	}
}

impl std::fmt::Debug for QueuedJob {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("QueuedJob").field("payload", &self.payload).finish_non_exhaustive()
	}
}

/// Destination for queued jobs.
#[async_trait]
pub trait TaskQueue: Send + Sync + 'static {
	/// Accepts a job or fails with a transport error. Must not wait for execution.
	async fn push(&self, job: QueuedJob) -> Result<(), ExecutionError>;
}

/// Hands calls to a [`TaskQueue`] and returns immediately with a pending task.
#[derive(Clone)]
pub struct EnqueueBackend {
	queue: Arc<dyn TaskQueue>,
}

impl EnqueueBackend {
	pub const NAME: &'static str = "enqueue";

	pub fn new(queue: Arc<dyn TaskQueue>) -> Self {
		Self { queue }
	}
}

#[async_trait]
impl ExecutionBackend for EnqueueBackend {
	fn name(&self) -> &str {
		Self::NAME
	}

	fn supports(&self, mode: ExecutionMode) -> bool {
		mode == ExecutionMode::Enqueue
	}

	async fn submit(&self, call: ServiceCall) -> Result<Dispatched, DispatchError> {
		let snapshot = call.tasks.get_status(call.task)?;
		let queue = call.context.queue.clone().unwrap_or_else(|| DEFAULT_QUEUE.to_string());
		let not_before = call
			.context
			.delay
			.and_then(|d| chrono::Duration::from_std(d).ok())
			.map(|d| Utc::now() + d);
		let job = QueuedJob {
			payload: JobPayload {
				task: call.task,
				service: call.identity,
				queue,
				input: call.input,
				correlation_id: call.context.correlation_id,
				context: call.context,
				not_before,
			},
			service: call.service,
			tasks: call.tasks.clone(),
		};

		if let Err(err) = self.queue.push(job).await {
			tracing::warn!(task = %call.task, error = %err, "queue.push.failed");
			call.tasks.finish(call.task, Err(err));
			return Ok(Dispatched::Task(call.tasks.get_status(call.task)?));
		}
		Ok(Dispatched::Task(snapshot))
	}
}

/// In-process queue with one bounded ingress channel per queue name.
pub struct LocalQueue {
	capacity: usize,
	queues: Mutex<FxHashMap<String, mpsc::Sender<QueuedJob>>>,
}

impl LocalQueue {
	pub const DEFAULT_CAPACITY: usize = 1024;

	pub fn new(capacity: usize) -> Self {
		Self {
			capacity: capacity.max(1),
			queues: Mutex::new(FxHashMap::default()),
		}
	}

	/// Queue names with a live ingress task.
	pub fn queues(&self) -> Vec<String> {
		let mut names: Vec<String> = self.queues.lock().keys().cloned().collect();
		names.sort();
		names
	}

	fn sender(&self, name: &str) -> Result<mpsc::Sender<QueuedJob>, ExecutionError> {
		let mut queues = self.queues.lock();
		if let Some(tx) = queues.get(name).filter(|tx| !tx.is_closed()) {
			return Ok(tx.clone());
		}
		let (tx, rx) = mpsc::channel(self.capacity);
		spawn(TaskClass::Queued, ingress(name.to_string(), rx))?;
		queues.insert(name.to_string(), tx.clone());
		tracing::debug!(queue = name, capacity = self.capacity, "queue.started");
		Ok(tx)
	}
}

impl Default for LocalQueue {
	fn default() -> Self {
		Self::new(Self::DEFAULT_CAPACITY)
	}
}

impl std::fmt::Debug for LocalQueue {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("LocalQueue").field("capacity", &self.capacity).field("queues", &self.queues()).finish()
	}
}

#[async_trait]
impl TaskQueue for LocalQueue {
	async fn push(&self, job: QueuedJob) -> Result<(), ExecutionError> {
		let name = job.payload.queue.clone();
		let tx = self.sender(&name)?;
		tx.try_send(job).map_err(|err| match err {
			mpsc::error::TrySendError::Full(_) => ExecutionError::transport(format!("queue {name:?} is full")),
			mpsc::error::TrySendError::Closed(_) => ExecutionError::transport(format!("queue {name:?} is closed")),
		})
	}
}

async fn ingress(queue: String, mut rx: mpsc::Receiver<QueuedJob>) {
	while let Some(job) = rx.recv().await {
		let task = job.payload.task;
		let cancel = job.payload.context.cancel.clone();
		let delay = job.delay();
		let spawned = spawn(TaskClass::Queued, async move {
			if let Some(delay) = delay {
				tokio::select! {
					() = tokio::time::sleep(delay) => {}
					() = cancel.cancelled() => {}
				}
			}
			let _ = job.run().await;
		});
		if let Err(err) = spawned {
			tracing::error!(%queue, %task, error = %err, "queue.job.spawn_failed");
		}
	}
	tracing::debug!(%queue, "queue.closed");
}
