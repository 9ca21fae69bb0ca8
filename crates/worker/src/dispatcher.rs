//! Service dispatch.
//!
//! # Role
//!
//! [`Dispatcher::dispatch`] resolves a service identity in a component store, picks the
//! execution mode and backend, records a pending task, and submits the call.
//!
//! # Backend selection
//!
//! 1. The backend named by the caller.
//! 2. Otherwise the service's declared default, then the configured default.
//! 3. An unknown name is [`DispatchError::BackendNotFound`] unless `backend_fallback` is on,
//!    in which case the mode's built-in backend is used and a warning is logged.
//! 4. An implicitly chosen backend that cannot serve the mode is replaced by the mode's
//!    built-in backend; an explicitly named one is [`DispatchError::UnsupportedMode`].
//!
//! Services that declare `require_enqueue` never run inline: `sync` becomes `enqueue`.
//! The dispatcher never retries.

#[cfg(test)]
mod tests;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use switchboard_registry::{ComponentStore, Lookup, RegistryError};
use tracing::Instrument;

use crate::backend::{Dispatched, EnqueueBackend, ExecutionBackend, ExecutionMode, ImmediateBackend, LocalQueue, ServiceCall, StreamBackend};
use crate::error::DispatchError;
use crate::service::{ServiceHandle, ServiceOptions};
use crate::spawn::submit_and_wait;
use crate::status::{CallContext, TaskId, TaskState, TaskStatus};
use crate::table::TaskTable;

/// Dispatcher settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherConfig {
	pub default_backend: String,
	pub default_mode: ExecutionMode,
	/// Substitute the mode's built-in backend for unknown names instead of failing.
	pub backend_fallback: bool,
	/// Capacity of each local queue.
	pub queue_capacity: usize,
	/// Timeout applied when the call context sets none.
	pub default_timeout: Option<Duration>,
	/// How long terminal task records stay pollable. `None` keeps them until pruned.
	pub retain_terminal: Option<Duration>,
}

impl DispatcherConfig {
	pub const DEFAULT_RETENTION: Duration = Duration::from_secs(600);
}

impl Default for DispatcherConfig {
	fn default() -> Self {
		Self {
			default_backend: ImmediateBackend::NAME.to_string(),
			default_mode: ExecutionMode::Sync,
			backend_fallback: false,
			queue_capacity: LocalQueue::DEFAULT_CAPACITY,
			default_timeout: None,
			retain_terminal: Some(Self::DEFAULT_RETENTION),
		}
	}
}

#[derive(Clone)]
struct Inner {
	config: DispatcherConfig,
	backends: BTreeMap<String, Arc<dyn ExecutionBackend>>,
	tasks: TaskTable,
	store: Option<Arc<ComponentStore>>,
}

/// Routes service calls to execution backends. Cheap to clone.
#[derive(Clone)]
pub struct Dispatcher {
	inner: Arc<Inner>,
}

impl Default for Dispatcher {
	fn default() -> Self {
		Self::new(DispatcherConfig::default())
	}
}

impl Dispatcher {
	/// Creates a dispatcher with the immediate, local-queue and stream backends installed.
	pub fn new(config: DispatcherConfig) -> Self {
		let queue = Arc::new(LocalQueue::new(config.queue_capacity));
		let builtins: [Arc<dyn ExecutionBackend>; 3] = [Arc::new(ImmediateBackend), Arc::new(EnqueueBackend::new(queue)), Arc::new(StreamBackend)];
		let backends = builtins.into_iter().map(|b| (b.name().to_string(), b)).collect();
		let tasks = TaskTable::with_retention(config.retain_terminal);
		Self {
			inner: Arc::new(Inner {
				config,
				backends,
				tasks,
				store: None,
			}),
		}
	}

	fn inner_mut(&mut self) -> &mut Inner {
		Arc::make_mut(&mut self.inner)
	}

	/// Installs or replaces a backend under its name.
	pub fn with_backend(mut self, backend: Arc<dyn ExecutionBackend>) -> Self {
		let name = backend.name().to_string();
		tracing::debug!(backend = %name, "dispatcher.backend_installed");
		self.inner_mut().backends.insert(name, backend);
		self
	}

	/// Resolves services in `store` instead of the active store.
	pub fn with_store(mut self, store: Arc<ComponentStore>) -> Self {
		self.inner_mut().store = Some(store);
		self
	}

	pub fn config(&self) -> &DispatcherConfig {
		&self.inner.config
	}

	pub fn tasks(&self) -> &TaskTable {
		&self.inner.tasks
	}

	/// Installed backend names, sorted.
	pub fn backends(&self) -> Vec<&str> {
		self.inner.backends.keys().map(String::as_str).collect()
	}

	fn store(&self) -> Arc<ComponentStore> {
		self.inner.store.clone().unwrap_or_else(ComponentStore::current_active)
	}

	fn builtin(&self, mode: ExecutionMode) -> Result<Arc<dyn ExecutionBackend>, DispatchError> {
		let name = mode.builtin_backend();
		self.inner.backends.get(name).cloned().ok_or_else(|| DispatchError::BackendNotFound { name: name.to_string() })
	}

	/// Picks the backend for `mode`.
	///
	/// A backend the caller named for a synchronous call that was upgraded to enqueue is
	/// treated like an implicit choice, so a sync-only name cannot block the upgrade.
	fn select_backend(
		&self,
		requested: Option<&str>,
		options: &ServiceOptions,
		mode: ExecutionMode,
		upgraded: bool,
	) -> Result<Arc<dyn ExecutionBackend>, DispatchError> {
		let explicit = requested.is_some();
		let name = requested.or(options.default_backend.as_deref()).unwrap_or(&self.inner.config.default_backend);

		let Some(backend) = self.inner.backends.get(name) else {
			if !self.inner.config.backend_fallback {
				return Err(DispatchError::BackendNotFound { name: name.to_string() });
			}
			let fallback = self.builtin(mode)?;
			tracing::warn!(requested = name, fallback = fallback.name(), "dispatch.backend_fallback");
			return Ok(fallback);
		};

		if backend.supports(mode) {
			return Ok(Arc::clone(backend));
		}
		if explicit && upgraded {
			tracing::debug!(requested = name, %mode, "dispatch.upgrade_overrides_backend");
		} else if explicit {
			return Err(DispatchError::UnsupportedMode {
				backend: name.to_string(),
				mode,
			});
		}
		self.builtin(mode)
	}

	/// Dispatches one call.
	///
	/// `mode` defaults to the configured mode. Synchronous calls return
	/// [`Dispatched::Response`] or the execution error; enqueued calls return a pending
	/// [`Dispatched::Task`]; streamed calls return [`Dispatched::Stream`].
	pub async fn dispatch(
		&self,
		lookup: impl Into<Lookup>,
		input: Value,
		ctx: CallContext,
		mode: Option<ExecutionMode>,
		backend: Option<&str>,
	) -> Result<Dispatched, DispatchError> {
		self.dispatch_in(self.store(), lookup.into(), input, ctx, mode, backend).await
	}

	/// Blocking variant of [`Self::dispatch`]: submits to the worker runtime and waits.
	///
	/// The store active on the calling thread is used for resolution.
	pub fn dispatch_blocking(
		&self,
		lookup: impl Into<Lookup>,
		input: Value,
		ctx: CallContext,
		mode: Option<ExecutionMode>,
		backend: Option<&str>,
	) -> Result<Dispatched, DispatchError> {
		let this = self.clone();
		let store = self.store();
		let lookup = lookup.into();
		let backend = backend.map(str::to_string);
		submit_and_wait(async move { this.dispatch_in(store, lookup, input, ctx, mode, backend.as_deref()).await })?
	}

	async fn dispatch_in(
		&self,
		store: Arc<ComponentStore>,
		lookup: Lookup,
		input: Value,
		mut ctx: CallContext,
		mode: Option<ExecutionMode>,
		backend: Option<&str>,
	) -> Result<Dispatched, DispatchError> {
		let record = store.resolve(lookup)?;
		let identity = record.identity().clone();
		let handle = record.downcast::<ServiceHandle>().map_err(|err| match err {
			RegistryError::TypeMismatch { .. } => DispatchError::NotAService { identity: identity.clone() },
			other => other.into(),
		})?;
		let options = handle.options();

		let requested = mode.unwrap_or(self.inner.config.default_mode);
		let upgraded = options.require_enqueue && requested == ExecutionMode::Sync;
		let mode = if upgraded {
			tracing::debug!(service = %identity, "dispatch.require_enqueue");
			ExecutionMode::Enqueue
		} else {
			requested
		};
		let backend = self.select_backend(backend, &options, mode, upgraded)?;

		ctx.cancel = ctx.cancel.child_token();
		if ctx.timeout.is_none() {
			ctx.timeout = self.inner.config.default_timeout;
		}
		if ctx.queue.is_none() {
			ctx.queue = options.queue.as_deref().map(str::to_string);
		}

		let status = TaskStatus::new(identity.clone(), backend.name().to_string(), mode, input.clone(), ctx.clone());
		let (task, _) = self.inner.tasks.insert(status);
		let span = tracing::info_span!(
			"dispatch",
			service = %identity,
			backend = backend.name(),
			%mode,
			%task,
			correlation_id = %ctx.correlation_id,
		);
		let call = ServiceCall {
			task,
			identity,
			service: Arc::clone(handle.service()),
			input,
			context: ctx,
			mode,
			tasks: self.inner.tasks.clone(),
		};
		backend.submit(call).instrument(span).await
	}

	pub fn get_status(&self, id: TaskId) -> Result<TaskStatus, DispatchError> {
		self.inner.tasks.get_status(id)
	}

	pub fn cancel(&self, id: TaskId) -> Result<TaskState, DispatchError> {
		self.inner.tasks.cancel(id)
	}
}

impl std::fmt::Debug for Dispatcher {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Dispatcher")
			.field("config", &self.inner.config)
			.field("backends", &self.backends())
			.field("tasks", &self.inner.tasks)
			.finish()
	}
}
