//! Dispatchable services.

use std::borrow::Cow;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use serde_json::Value;
use switchboard_invocation::{Response, StreamChunk};
use switchboard_registry::{Component, ComponentDecl, ComponentStore, Identity, IdentityHints, RegistryError};

use crate::error::ExecutionError;
use crate::status::CallContext;

/// Chunk sequence produced by a streaming service.
pub type ServiceStream = BoxStream<'static, Result<StreamChunk, ExecutionError>>;

/// Per-service execution preferences.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceOptions {
	/// Backend used when the caller names none.
	pub default_backend: Option<Cow<'static, str>>,
	/// Never run inline; synchronous requests are upgraded to enqueue.
	pub require_enqueue: bool,
	/// Queue used for enqueued calls when the caller names none.
	pub queue: Option<Cow<'static, str>>,
}

impl ServiceOptions {
	pub fn require_enqueue(mut self) -> Self {
		self.require_enqueue = true;
		self
	}

	pub fn default_backend(mut self, name: impl Into<Cow<'static, str>>) -> Self {
		self.default_backend = Some(name.into());
		self
	}

	pub fn queue(mut self, name: impl Into<Cow<'static, str>>) -> Self {
		self.queue = Some(name.into());
		self
	}
}

/// An invocable service.
#[async_trait]
pub trait Service: Component {
	async fn call(&self, input: Value, ctx: &CallContext) -> Result<Response, ExecutionError>;

	/// Streams the result. The default runs [`Self::call`] and replays its text as one delta.
	async fn stream(&self, input: Value, ctx: &CallContext) -> Result<ServiceStream, ExecutionError> {
		let response = self.call(input, ctx).await?;
		let text = response.text();
		let mut chunks = Vec::with_capacity(2);
		if !text.is_empty() {
			chunks.push(Ok(StreamChunk::delta(text)));
		}
		chunks.push(Ok(StreamChunk::final_chunk(Some(response.usage))));
		Ok(stream::iter(chunks).boxed())
	}

	fn options(&self) -> ServiceOptions {
		ServiceOptions::default()
	}
}

/// Registry component wrapping a service trait object.
///
/// The declaration is the inner service's, so identity derivation and same-component
/// checks see the concrete service type.
#[derive(Clone)]
pub struct ServiceHandle {
	inner: Arc<dyn Service>,
}

impl ServiceHandle {
	pub fn new<S: Service>(service: S) -> Self {
		Self { inner: Arc::new(service) }
	}

	pub fn from_arc(inner: Arc<dyn Service>) -> Self {
		Self { inner }
	}

	pub fn service(&self) -> &Arc<dyn Service> {
		&self.inner
	}

	pub fn options(&self) -> ServiceOptions {
		self.inner.options()
	}
}

impl Component for ServiceHandle {
	fn decl(&self) -> ComponentDecl {
		self.inner.decl()
	}
}

impl std::fmt::Debug for ServiceHandle {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_tuple("ServiceHandle").field(&self.inner.decl().type_name).finish()
	}
}

/// Registers `service` in `store` so the dispatcher can find it.
#[track_caller]
pub fn register_service<S: Service>(store: &ComponentStore, service: S, hints: IdentityHints) -> Result<Identity, RegistryError> {
	let identity = store.register(ServiceHandle::new(service), hints)?;
	tracing::debug!(%identity, "service.registered");
	Ok(identity)
}
