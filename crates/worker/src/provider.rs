//! Provider-backed services.
//!
//! [`ProviderService`] exposes a [`Provider`] as a dispatchable [`Service`]: the input is
//! either a prompt string or a request object, and the call context's correlation id is
//! stamped on the outgoing request.

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;
use switchboard_invocation::{OutputSchema, Provider, Request, Response, Role};
use switchboard_registry::{Component, ComponentDecl, Domain};

use crate::error::ExecutionError;
use crate::service::{Service, ServiceOptions, ServiceStream};
use crate::status::CallContext;

/// A [`Service`] that forwards to one provider and model.
///
/// Generic over the provider so each adapter type registers under its own identity.
pub struct ProviderService<P: Provider> {
	provider: Arc<P>,
	model: String,
	output_schema: Option<OutputSchema>,
	options: ServiceOptions,
}

impl<P: Provider> ProviderService<P> {
	pub fn new(provider: P, model: impl Into<String>) -> Self {
		Self::from_arc(Arc::new(provider), model)
	}

	pub fn from_arc(provider: Arc<P>, model: impl Into<String>) -> Self {
		Self {
			provider,
			model: model.into(),
			output_schema: None,
			options: ServiceOptions::default(),
		}
	}

	pub fn with_output_schema(mut self, schema: OutputSchema) -> Self {
		self.output_schema = Some(schema);
		self
	}

	pub fn with_options(mut self, options: ServiceOptions) -> Self {
		self.options = options;
		self
	}

	pub fn provider(&self) -> &Arc<P> {
		&self.provider
	}

	pub fn model(&self) -> &str {
		&self.model
	}

	/// Builds the outgoing request from a prompt string or a request object.
	pub fn build_request(&self, input: Value, ctx: &CallContext) -> Result<Request, ExecutionError> {
		let mut request = match input {
			Value::String(prompt) => Request::new(self.model.clone()).with_message(Role::User, prompt),
			Value::Object(mut map) => {
				map.entry("model").or_insert_with(|| Value::String(self.model.clone()));
				serde_json::from_value::<Request>(Value::Object(map)).map_err(|e| ExecutionError::invalid(format!("malformed request: {e}")))?
			}
			other => {
				return Err(ExecutionError::invalid(format!(
					"expected a prompt string or request object, got {}",
					json_kind(&other)
				)));
			}
		};
		request.correlation_id = ctx.correlation_id;
		if request.output_schema.is_none() {
			request.output_schema = self.output_schema.clone();
		}
		Ok(request)
	}
}

fn json_kind(value: &Value) -> &'static str {
	match value {
		Value::Null => "null",
		Value::Bool(_) => "boolean",
		Value::Number(_) => "number",
		Value::String(_) => "string",
		Value::Array(_) => "array",
		Value::Object(_) => "object",
	}
}

impl<P: Provider> Component for ProviderService<P> {
	fn decl(&self) -> ComponentDecl {
		ComponentDecl::of::<Self>().named_after::<P>().domain(Domain::Services)
	}
}

#[async_trait]
impl<P: Provider> Service for ProviderService<P> {
	async fn call(&self, input: Value, ctx: &CallContext) -> Result<Response, ExecutionError> {
		let request = Arc::new(self.build_request(input, ctx)?);
		tracing::debug!(provider = self.provider.name(), model = %request.model, correlation_id = %request.correlation_id, "provider.complete");
		let mut response = self.provider.complete(Arc::clone(&request)).await?;
		response.correlation_id = request.correlation_id;
		response.request = Some(request);
		Ok(response)
	}

	async fn stream(&self, input: Value, ctx: &CallContext) -> Result<ServiceStream, ExecutionError> {
		let request = Arc::new(self.build_request(input, ctx)?.with_stream(true));
		tracing::debug!(provider = self.provider.name(), model = %request.model, correlation_id = %request.correlation_id, "provider.stream");
		let chunks = self.provider.stream(request).await?;
		Ok(chunks.map(|chunk| chunk.map_err(ExecutionError::from)).boxed())
	}

	fn options(&self) -> ServiceOptions {
		self.options.clone()
	}
}

#[cfg(test)]
mod tests {
	use futures::TryStreamExt;
	use pretty_assertions::assert_eq;
	use serde_json::json;
	use switchboard_invocation::{CorrelationId, OutputItem, ProviderError, Usage};
	use switchboard_registry::{ComponentStore, IdentityHints};

	use super::*;
	use crate::dispatcher::Dispatcher;
	use crate::service::register_service;

	struct Parrot;

	impl Component for Parrot {
		fn decl(&self) -> ComponentDecl {
			ComponentDecl::of::<Self>().domain(Domain::Providers)
		}
	}

	#[async_trait]
	impl Provider for Parrot {
		fn name(&self) -> &str {
			"parrot"
		}

		async fn complete(&self, request: Arc<Request>) -> Result<Response, ProviderError> {
			let said = request.input.iter().flat_map(|item| item.content.iter()).filter_map(|part| part.as_text()).collect::<Vec<_>>().join(" ");
			if said == "fail" {
				return Err(ProviderError::transient("parrot", "squawk"));
			}
			Ok(Response::new(CorrelationId::new())
				.with_output(OutputItem::assistant(format!("{}: {said}", request.model)))
				.with_usage(Usage {
					input_tokens: 2,
					output_tokens: 3,
					cached_tokens: 0,
				}))
		}
	}

	fn service() -> ProviderService<Parrot> {
		ProviderService::new(Parrot, "parrot-1")
	}

	/// A prompt string becomes one user message and carries the context's correlation id.
	#[test]
	fn test_prompt_string_builds_request() {
		let ctx = CallContext::new();
		let request = service().build_request(json!("hello"), &ctx).unwrap();
		assert_eq!(request.model, "parrot-1");
		assert_eq!(request.input.len(), 1);
		assert_eq!(request.input[0].role, Role::User);
		assert_eq!(request.correlation_id, ctx.correlation_id);
	}

	/// Request objects keep their own model; a missing model is filled in.
	#[test]
	fn test_request_object_model_defaulting() {
		let ctx = CallContext::new();
		let own = service().build_request(json!({"model": "other", "input": []}), &ctx).unwrap();
		assert_eq!(own.model, "other");
		let filled = service().build_request(json!({"input": []}), &ctx).unwrap();
		assert_eq!(filled.model, "parrot-1");
	}

	#[test]
	fn test_rejects_non_request_input() {
		let err = service().build_request(json!(42), &CallContext::new()).unwrap_err();
		assert!(matches!(err, ExecutionError::Invalid { .. }));
		assert!(!err.is_retryable());
	}

	/// The adapter keeps its own type identity but is named after the provider.
	#[test]
	fn test_declares_adapter_type_named_after_provider() {
		let decl = service().decl();
		assert_eq!(decl.type_id, std::any::TypeId::of::<ProviderService<Parrot>>());
		assert_eq!(decl.short_name(), "Parrot");
		assert_eq!(decl.domain, Some(Domain::Services));
	}

	/// Registering the provider itself does not capture the adapter's identity.
	#[tokio::test]
	async fn test_provider_and_adapter_register_separately() {
		let store = Arc::new(ComponentStore::default());
		let provider_id = store.register(Parrot, IdentityHints::new()).unwrap();
		let service_id = register_service(&store, service(), IdentityHints::new()).unwrap();
		assert_eq!(provider_id.label(), "providers.switchboard-worker.default.parrot");
		assert_eq!(service_id.label(), "services.switchboard-worker.default.parrot");

		let dispatcher = Dispatcher::default().with_store(store);
		let dispatched = dispatcher.dispatch(&service_id, json!("hi"), CallContext::new(), None, None).await.unwrap();
		assert_eq!(dispatched.into_response().map(|r| r.text()), Some("parrot-1: hi".to_string()));
	}

	#[tokio::test]
	async fn test_call_stamps_correlation_and_request() {
		let ctx = CallContext::new();
		let response = service().call(json!("hi"), &ctx).await.unwrap();
		assert_eq!(response.text(), "parrot-1: hi");
		assert_eq!(response.correlation_id, ctx.correlation_id);
		assert_eq!(response.request.as_ref().map(|r| r.correlation_id), Some(ctx.correlation_id));
	}

	#[tokio::test]
	async fn test_provider_errors_keep_retryability() {
		let err = service().call(json!("fail"), &CallContext::new()).await.unwrap_err();
		assert!(err.is_retryable());
		assert!(matches!(err, ExecutionError::Provider { ref provider, .. } if provider == "parrot"));
	}

	#[tokio::test]
	async fn test_stream_replays_completion() {
		let chunks: Vec<_> = service().stream(json!("hi"), &CallContext::new()).await.unwrap().try_collect().await.unwrap();
		assert_eq!(chunks.len(), 2);
		assert_eq!(chunks[0].delta, "parrot-1: hi");
		assert!(chunks[1].is_final);
		assert_eq!(chunks[1].usage.map(|u| u.total()), Some(5));
	}
}
