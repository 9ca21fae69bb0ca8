use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use pretty_assertions::assert_eq;
use serde_json::json;
use switchboard_invocation::{OutputItem, Response, StreamChunk, Usage};
use switchboard_registry::{Component, ComponentDecl, Domain, Identity, IdentityHints, StoreOptions};

use super::*;
use crate::backend::{QueuedJob, TaskQueue};
use crate::error::ExecutionError;
use crate::service::{Service, ServiceStream, register_service};

struct Echo;
struct Slow;
struct Outbox;
struct Picky(Arc<AtomicUsize>);
struct Ticker;
struct Endless;
struct PlainSection;

impl Component for Echo {
	fn decl(&self) -> ComponentDecl {
		ComponentDecl::of::<Self>().domain(Domain::Services).name("echo")
	}
}

#[async_trait]
impl Service for Echo {
	async fn call(&self, input: Value, ctx: &CallContext) -> Result<Response, ExecutionError> {
		let text = input.as_str().unwrap_or_default().to_string();
		Ok(Response::new(ctx.correlation_id).with_output(OutputItem::assistant(text)))
	}
}

impl Component for Slow {
	fn decl(&self) -> ComponentDecl {
		ComponentDecl::of::<Self>().domain(Domain::Services).name("slow")
	}
}

#[async_trait]
impl Service for Slow {
	async fn call(&self, _input: Value, ctx: &CallContext) -> Result<Response, ExecutionError> {
		tokio::time::sleep(Duration::from_secs(30)).await;
		Ok(Response::new(ctx.correlation_id))
	}
}

impl Component for Outbox {
	fn decl(&self) -> ComponentDecl {
		ComponentDecl::of::<Self>().domain(Domain::Services).name("outbox")
	}
}

#[async_trait]
impl Service for Outbox {
	async fn call(&self, _input: Value, ctx: &CallContext) -> Result<Response, ExecutionError> {
		Ok(Response::new(ctx.correlation_id).with_output(OutputItem::assistant("sent")))
	}

	fn options(&self) -> ServiceOptions {
		ServiceOptions::default().require_enqueue().queue("mail")
	}
}

impl Component for Picky {
	fn decl(&self) -> ComponentDecl {
		ComponentDecl::of::<Self>().domain(Domain::Services).name("picky")
	}
}

#[async_trait]
impl Service for Picky {
	async fn call(&self, _input: Value, _ctx: &CallContext) -> Result<Response, ExecutionError> {
		self.0.fetch_add(1, Ordering::SeqCst);
		Err(ExecutionError::invalid("input rejected"))
	}
}

impl Component for Ticker {
	fn decl(&self) -> ComponentDecl {
		ComponentDecl::of::<Self>().domain(Domain::Services).name("ticker")
	}
}

#[async_trait]
impl Service for Ticker {
	async fn call(&self, _input: Value, ctx: &CallContext) -> Result<Response, ExecutionError> {
		Ok(Response::new(ctx.correlation_id))
	}

	async fn stream(&self, _input: Value, _ctx: &CallContext) -> Result<ServiceStream, ExecutionError> {
		let usage = Usage {
			input_tokens: 4,
			output_tokens: 3,
			cached_tokens: 0,
		};
		let chunks = vec![
			Ok(StreamChunk::delta("a")),
			Ok(StreamChunk {
				delta: "b".into(),
				is_final: false,
				usage: Some(usage),
			}),
			Ok(StreamChunk::delta("c")),
		];
		Ok(stream::iter(chunks).boxed())
	}
}

impl Component for Endless {
	fn decl(&self) -> ComponentDecl {
		ComponentDecl::of::<Self>().domain(Domain::Services).name("endless")
	}
}

#[async_trait]
impl Service for Endless {
	async fn call(&self, _input: Value, ctx: &CallContext) -> Result<Response, ExecutionError> {
		Ok(Response::new(ctx.correlation_id))
	}

	async fn stream(&self, _input: Value, _ctx: &CallContext) -> Result<ServiceStream, ExecutionError> {
		Ok(stream::iter([Ok(StreamChunk::delta("tick"))]).chain(stream::pending()).boxed())
	}
}

impl Component for PlainSection {
	fn decl(&self) -> ComponentDecl {
		ComponentDecl::of::<Self>().domain(Domain::Services).name("plain")
	}
}

struct Unreachable;

#[async_trait]
impl TaskQueue for Unreachable {
	async fn push(&self, job: QueuedJob) -> Result<(), ExecutionError> {
		drop(job);
		Err(ExecutionError::transport("broker unreachable"))
	}
}

fn store() -> Arc<ComponentStore> {
	Arc::new(ComponentStore::new(StoreOptions::default()))
}

fn setup<S: Service>(service: S, config: DispatcherConfig) -> (Dispatcher, Identity) {
	let store = store();
	let id = register_service(&store, service, IdentityHints::new()).unwrap();
	(Dispatcher::new(config).with_store(store), id)
}

async fn wait_terminal(dispatcher: &Dispatcher, id: TaskId) -> TaskStatus {
	for _ in 0..200 {
		let status = dispatcher.get_status(id).unwrap();
		if status.is_terminal() {
			return status;
		}
		tokio::time::sleep(Duration::from_millis(5)).await;
	}
	panic!("task {id} never finished");
}

/// Synchronous dispatch returns the result and leaves a succeeded record behind.
#[tokio::test]
async fn test_sync_dispatch_records_result() {
	let (dispatcher, id) = setup(Echo, DispatcherConfig::default());
	let ctx = CallContext::new();
	let corr = ctx.correlation_id;
	let response = dispatcher.dispatch(&id, json!("hello"), ctx, None, None).await.unwrap().into_response().unwrap();
	assert_eq!(response.text(), "hello");

	let tasks = dispatcher.tasks().list();
	assert_eq!(tasks.len(), 1);
	assert_eq!(tasks[0].status, TaskState::Succeeded);
	assert_eq!(tasks[0].backend, "immediate");
	assert_eq!(tasks[0].correlation_id, corr);
	assert_eq!(tasks[0].result.as_ref().map(Response::text), Some("hello".to_string()));
}

/// Labels resolve the same as identities.
#[tokio::test]
async fn test_dispatch_by_label() {
	let (dispatcher, id) = setup(Echo, DispatcherConfig::default());
	let dispatched = dispatcher.dispatch(id.label(), json!("x"), CallContext::new(), None, None).await.unwrap();
	assert!(matches!(dispatched, Dispatched::Response(_)));
}

/// Enqueued calls return a pending snapshot and complete in the background.
#[tokio::test]
async fn test_enqueue_returns_pending_then_succeeds() {
	let (dispatcher, id) = setup(Echo, DispatcherConfig::default());
	let task = dispatcher
		.dispatch(&id, json!("later"), CallContext::new(), Some(ExecutionMode::Enqueue), None)
		.await
		.unwrap()
		.into_task()
		.unwrap();
	assert_eq!(task.status, TaskState::Pending);
	assert_eq!(task.backend, "enqueue");

	let done = wait_terminal(&dispatcher, task.id).await;
	assert_eq!(done.status, TaskState::Succeeded);
	assert_eq!(done.result.map(|r| r.text()), Some("later".to_string()));
	assert!(done.started_at.is_some());
}

/// Services that demand queueing never run inline.
#[tokio::test]
async fn test_require_enqueue_upgrades_sync() {
	let (dispatcher, id) = setup(Outbox, DispatcherConfig::default());
	let task = dispatcher.dispatch(&id, Value::Null, CallContext::new(), Some(ExecutionMode::Sync), None).await.unwrap().into_task().unwrap();
	assert_eq!(task.mode, ExecutionMode::Enqueue);
	assert_eq!(task.context.queue.as_deref(), Some("mail"));
	assert_eq!(wait_terminal(&dispatcher, task.id).await.status, TaskState::Succeeded);
}

/// Naming a sync-only backend does not stop the upgrade to enqueue.
#[tokio::test]
async fn test_require_enqueue_overrides_sync_only_backend() {
	let (dispatcher, id) = setup(Outbox, DispatcherConfig::default());
	let task = dispatcher
		.dispatch(&id, Value::Null, CallContext::new(), Some(ExecutionMode::Sync), Some("immediate"))
		.await
		.unwrap()
		.into_task()
		.unwrap();
	assert_eq!(task.mode, ExecutionMode::Enqueue);
	assert_eq!(task.backend, "enqueue");
	assert_eq!(wait_terminal(&dispatcher, task.id).await.status, TaskState::Succeeded);
}

#[tokio::test]
async fn test_unknown_backend_is_an_error() {
	let (dispatcher, id) = setup(Echo, DispatcherConfig::default());
	let err = dispatcher.dispatch(&id, json!("x"), CallContext::new(), None, Some("celery")).await.unwrap_err();
	assert!(matches!(err, DispatchError::BackendNotFound { ref name } if name == "celery"));
	assert!(dispatcher.tasks().is_empty());
}

/// With fallback enabled an unknown backend degrades to the mode's built-in one.
#[tokio::test]
async fn test_unknown_backend_falls_back_when_enabled() {
	let config = DispatcherConfig {
		backend_fallback: true,
		..DispatcherConfig::default()
	};
	let (dispatcher, id) = setup(Echo, config);
	let response = dispatcher.dispatch(&id, json!("x"), CallContext::new(), None, Some("celery")).await.unwrap().into_response().unwrap();
	assert_eq!(response.text(), "x");
	assert_eq!(dispatcher.tasks().list()[0].backend, "immediate");
}

#[tokio::test]
async fn test_explicit_backend_must_support_mode() {
	let (dispatcher, id) = setup(Echo, DispatcherConfig::default());
	let err = dispatcher.dispatch(&id, json!("x"), CallContext::new(), Some(ExecutionMode::Sync), Some("stream")).await.unwrap_err();
	assert!(matches!(
		err,
		DispatchError::UnsupportedMode {
			mode: ExecutionMode::Sync,
			..
		}
	));
}

/// An implicit default backend that cannot serve the mode is swapped for the built-in one.
#[tokio::test]
async fn test_implicit_backend_follows_mode() {
	let (dispatcher, id) = setup(Echo, DispatcherConfig::default());
	let task = dispatcher.dispatch(&id, json!("x"), CallContext::new(), Some(ExecutionMode::Enqueue), None).await.unwrap().into_task().unwrap();
	assert_eq!(task.backend, "enqueue");
}

#[tokio::test]
async fn test_non_service_component_is_rejected() {
	let store = store();
	let id = store.register(PlainSection, IdentityHints::new()).unwrap();
	let dispatcher = Dispatcher::default().with_store(store);
	let err = dispatcher.dispatch(&id, Value::Null, CallContext::new(), None, None).await.unwrap_err();
	assert!(matches!(err, DispatchError::NotAService { identity } if identity == id));
}

#[tokio::test]
async fn test_missing_service_is_registry_error() {
	let dispatcher = Dispatcher::default().with_store(store());
	let err = dispatcher.dispatch("services.app.default.ghost", Value::Null, CallContext::new(), None, None).await.unwrap_err();
	assert!(matches!(err, DispatchError::Registry(ref e) if e.is_not_found()));
}

/// A stream without a final chunk gets exactly one synthesized; the task aggregates deltas.
#[tokio::test]
async fn test_stream_ends_with_single_final_chunk() {
	let (dispatcher, id) = setup(Ticker, DispatcherConfig::default());
	let chunks = dispatcher
		.dispatch(&id, Value::Null, CallContext::new(), Some(ExecutionMode::Stream), None)
		.await
		.unwrap()
		.into_stream()
		.unwrap();
	let task = chunks.task_id();
	let chunks: Vec<_> = chunks.collect().await;

	assert_eq!(chunks.len(), 4);
	let finals = chunks.iter().filter(|c| c.as_ref().is_ok_and(|c| c.is_final)).count();
	assert_eq!(finals, 1);
	assert!(chunks[3].as_ref().unwrap().is_final);

	let status = dispatcher.get_status(task).unwrap();
	assert_eq!(status.status, TaskState::Succeeded);
	let result = status.result.unwrap();
	assert_eq!(result.text(), "abc");
	assert_eq!(result.usage.total(), 7);
}

/// Cancelling a stream stops delivery and marks the task cancelled.
#[tokio::test]
async fn test_stream_cancel_stops_delivery() {
	let (dispatcher, id) = setup(Endless, DispatcherConfig::default());
	let mut chunks = dispatcher
		.dispatch(&id, Value::Null, CallContext::new(), Some(ExecutionMode::Stream), None)
		.await
		.unwrap()
		.into_stream()
		.unwrap();
	let first = chunks.next().await.unwrap().unwrap();
	assert_eq!(first.delta, "tick");

	chunks.cancel();
	assert!(chunks.next().await.is_none());
	assert_eq!(dispatcher.get_status(chunks.task_id()).unwrap().status, TaskState::Cancelled);
}

/// Dropping an unfinished stream cancels its task.
#[tokio::test]
async fn test_dropping_stream_cancels_task() {
	let (dispatcher, id) = setup(Endless, DispatcherConfig::default());
	let chunks = dispatcher
		.dispatch(&id, Value::Null, CallContext::new(), Some(ExecutionMode::Stream), None)
		.await
		.unwrap()
		.into_stream()
		.unwrap();
	let task = chunks.task_id();
	drop(chunks);
	assert_eq!(dispatcher.get_status(task).unwrap().status, TaskState::Cancelled);
}

/// A timeout fails the task and trips the task's token, not the caller's.
#[tokio::test]
async fn test_timeout_fails_task_and_cancels_token() {
	let (dispatcher, id) = setup(Slow, DispatcherConfig::default());
	let ctx = CallContext::new().with_timeout(Duration::from_millis(20));
	let token = ctx.cancel.clone();
	let err = dispatcher.dispatch(&id, Value::Null, ctx, None, None).await.unwrap_err();
	assert_eq!(err.execution(), Some(&ExecutionError::Timeout { millis: 20 }));
	assert!(!token.is_cancelled());

	let status = &dispatcher.tasks().list()[0];
	assert_eq!(status.status, TaskState::Failed);
	assert_eq!(status.error, Some(ExecutionError::Timeout { millis: 20 }));
	assert!(status.context.cancel.is_cancelled());
}

/// A context reused after a timeout still runs the next call.
#[tokio::test]
async fn test_timeout_does_not_cancel_sibling_calls() {
	let store = store();
	let slow = register_service(&store, Slow, IdentityHints::new()).unwrap();
	let echo = register_service(&store, Echo, IdentityHints::new()).unwrap();
	let dispatcher = Dispatcher::default().with_store(store);
	let ctx = CallContext::new().with_timeout(Duration::from_millis(10));

	let err = dispatcher.dispatch(&slow, Value::Null, ctx.clone(), None, None).await.unwrap_err();
	assert_eq!(err.execution(), Some(&ExecutionError::Timeout { millis: 10 }));

	let response = dispatcher.dispatch(&echo, json!("again"), ctx.clone(), None, None).await.unwrap().into_response().unwrap();
	assert_eq!(response.text(), "again");
}

/// Cancelling one task leaves tasks dispatched with the same context alone.
#[tokio::test]
async fn test_cancel_is_per_task() {
	let (dispatcher, id) = setup(Echo, DispatcherConfig::default());
	let ctx = CallContext::new().with_delay(Duration::from_secs(30));
	let first = dispatcher.dispatch(&id, json!("a"), ctx.clone(), Some(ExecutionMode::Enqueue), None).await.unwrap().into_task().unwrap();
	let second = dispatcher.dispatch(&id, json!("b"), ctx.clone(), Some(ExecutionMode::Enqueue), None).await.unwrap().into_task().unwrap();

	assert_eq!(dispatcher.cancel(first.id).unwrap(), TaskState::Cancelled);
	assert!(!ctx.is_cancelled());
	let second = dispatcher.get_status(second.id).unwrap();
	assert_eq!(second.status, TaskState::Pending);
	assert!(!second.context.cancel.is_cancelled());
}

/// Cancelling the caller's token still reaches calls dispatched with it.
#[tokio::test]
async fn test_caller_cancellation_reaches_task() {
	let (dispatcher, id) = setup(Echo, DispatcherConfig::default());
	let ctx = CallContext::new();
	ctx.cancel.cancel();
	let err = dispatcher.dispatch(&id, json!("x"), ctx, None, None).await.unwrap_err();
	assert_eq!(err.execution(), Some(&ExecutionError::Cancelled));
	assert_eq!(dispatcher.tasks().list()[0].status, TaskState::Cancelled);
}

#[tokio::test]
async fn test_default_timeout_applies() {
	let config = DispatcherConfig {
		default_timeout: Some(Duration::from_millis(10)),
		..DispatcherConfig::default()
	};
	let (dispatcher, id) = setup(Slow, config);
	let err = dispatcher.dispatch(&id, Value::Null, CallContext::new(), None, None).await.unwrap_err();
	assert!(matches!(err.execution(), Some(ExecutionError::Timeout { millis: 10 })));
}

/// A queue that refuses the job leaves a failed task, not a dispatch error.
#[tokio::test]
async fn test_push_failure_marks_task_failed() {
	let (dispatcher, id) = setup(Echo, DispatcherConfig::default());
	let dispatcher = dispatcher.with_backend(Arc::new(EnqueueBackend::new(Arc::new(Unreachable))));
	let task = dispatcher.dispatch(&id, json!("x"), CallContext::new(), Some(ExecutionMode::Enqueue), None).await.unwrap().into_task().unwrap();
	assert_eq!(task.status, TaskState::Failed);
	assert!(matches!(task.error, Some(ExecutionError::Transport { .. })));
}

/// Cancelling a delayed job before it runs wins; the service never executes.
#[tokio::test]
async fn test_cancel_delayed_job() {
	let (dispatcher, id) = setup(Echo, DispatcherConfig::default());
	let ctx = CallContext::new().with_delay(Duration::from_secs(30));
	let token = ctx.cancel.clone();
	let task = dispatcher.dispatch(&id, json!("x"), ctx, Some(ExecutionMode::Enqueue), None).await.unwrap().into_task().unwrap();

	assert_eq!(dispatcher.cancel(task.id).unwrap(), TaskState::Cancelled);
	assert!(!token.is_cancelled());
	let status = wait_terminal(&dispatcher, task.id).await;
	assert_eq!(status.status, TaskState::Cancelled);
	assert!(status.context.cancel.is_cancelled());
	assert!(status.result.is_none());
}

/// Finished sync calls do not accumulate past the retention window.
#[tokio::test]
async fn test_task_table_stays_bounded() {
	let config = DispatcherConfig {
		retain_terminal: Some(Duration::ZERO),
		..DispatcherConfig::default()
	};
	let (dispatcher, id) = setup(Echo, config);
	for _ in 0..100 {
		dispatcher.dispatch(&id, json!("x"), CallContext::new(), None, None).await.unwrap();
	}
	assert_eq!(dispatcher.tasks().len(), 1);
}

#[tokio::test]
async fn test_cancel_unknown_task() {
	let dispatcher = Dispatcher::default();
	let missing = TaskId::new();
	assert!(matches!(dispatcher.cancel(missing), Err(DispatchError::TaskNotFound { id }) if id == missing));
}

/// Execution errors are returned as-is; the dispatcher never retries.
#[tokio::test]
async fn test_invalid_input_is_not_retried() {
	let calls = Arc::new(AtomicUsize::new(0));
	let (dispatcher, id) = setup(Picky(Arc::clone(&calls)), DispatcherConfig::default());
	let err = dispatcher.dispatch(&id, Value::Null, CallContext::new(), None, None).await.unwrap_err();
	assert!(matches!(err.execution(), Some(ExecutionError::Invalid { .. })));
	assert_eq!(calls.load(Ordering::SeqCst), 1);
}

/// The blocking entry point works from plain threads.
#[test]
fn test_dispatch_blocking_outside_runtime() {
	let (dispatcher, id) = setup(Echo, DispatcherConfig::default());
	let response = dispatcher.dispatch_blocking(&id, json!("blocking"), CallContext::new(), None, None).unwrap().into_response().unwrap();
	assert_eq!(response.text(), "blocking");
}

/// Without an explicit store the dispatcher resolves in the active one.
#[test]
fn test_blocking_dispatch_uses_callers_active_store() {
	let store = store();
	let id = register_service(&store, Echo, IdentityHints::new()).unwrap();
	let _guard = ComponentStore::push_active(store);
	let dispatcher = Dispatcher::default();
	let response = dispatcher.dispatch_blocking(&id, json!("scoped"), CallContext::new(), None, None).unwrap().into_response().unwrap();
	assert_eq!(response.text(), "scoped");
}

#[test]
fn test_builtin_backends_installed() {
	assert_eq!(Dispatcher::default().backends(), vec!["enqueue", "immediate", "stream"]);
}
