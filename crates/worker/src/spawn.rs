use std::future::Future;
use std::sync::OnceLock;

use tokio::runtime::{Handle, Runtime};
use tokio::task::JoinHandle;

use crate::error::ExecutionError;

/// Scheduling class recorded on every spawned task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskClass {
	/// Queue ingress loops and enqueued jobs.
	Queued,
	/// Work submitted by blocking callers.
	Blocking,
}

impl TaskClass {
	pub(crate) const fn as_str(self) -> &'static str {
		match self {
			Self::Queued => "queued",
			Self::Blocking => "blocking",
		}
	}
}

static GLOBAL_RT: OnceLock<Runtime> = OnceLock::new();

/// Process-wide runtime used when no tokio context is available.
fn global_handle() -> Result<Handle, ExecutionError> {
	if let Some(rt) = GLOBAL_RT.get() {
		return Ok(rt.handle().clone());
	}
	let rt = tokio::runtime::Builder::new_multi_thread()
		.enable_all()
		.worker_threads(2)
		.thread_name("switchboard-worker")
		.build()
		.map_err(|e| ExecutionError::transport(format!("failed to build worker runtime: {e}")))?;
	// A concurrent initializer may win; its runtime is used and ours is dropped.
	let _ = GLOBAL_RT.set(rt);
	GLOBAL_RT
		.get()
		.map(|rt| rt.handle().clone())
		.ok_or_else(|| ExecutionError::transport("worker runtime unavailable"))
}

fn runtime_handle() -> Result<Handle, ExecutionError> {
	match Handle::try_current() {
		Ok(handle) => Ok(handle),
		Err(_) => global_handle(),
	}
}

/// Spawns onto the current runtime, or the worker runtime outside of one.
pub fn spawn<F>(class: TaskClass, fut: F) -> Result<JoinHandle<F::Output>, ExecutionError>
where
	F: Future + Send + 'static,
	F::Output: Send + 'static,
{
	tracing::trace!(worker_class = class.as_str(), "worker.spawn");
	Ok(runtime_handle()?.spawn(fut))
}

/// Runs `fut` on the worker runtime and blocks the calling thread until it finishes.
///
/// Always uses the worker runtime, so callers on a single-threaded runtime do not starve
/// their own task.
pub fn submit_and_wait<F>(fut: F) -> Result<F::Output, ExecutionError>
where
	F: Future + Send + 'static,
	F::Output: Send + 'static,
{
	tracing::trace!(worker_class = TaskClass::Blocking.as_str(), "worker.submit_and_wait");
	let handle = global_handle()?.spawn(fut);
	futures::executor::block_on(handle).map_err(|e| ExecutionError::Aborted { message: e.to_string() })
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_submit_and_wait_outside_runtime() {
		let value = submit_and_wait(async { 40 + 2 }).unwrap();
		assert_eq!(value, 42);
	}

	#[test]
	fn test_spawn_without_context_uses_worker_runtime() {
		let handle = spawn(TaskClass::Queued, async { "done" }).unwrap();
		assert_eq!(futures::executor::block_on(handle).unwrap(), "done");
	}

	#[test]
	fn test_panics_surface_as_aborted() {
		let err = submit_and_wait(async {
			if true {
				panic!("boom");
			}
		})
		.unwrap_err();
		assert!(matches!(err, ExecutionError::Aborted { .. }));
	}
}
