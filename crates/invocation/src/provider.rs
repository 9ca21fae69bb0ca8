//! The contract every provider adapter satisfies.
//!
//! Adapters translate [`Request`] into a vendor call and the vendor reply back into
//! [`Response`] or a [`StreamChunk`] sequence. Transport encoding stays inside the adapter.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};

use crate::request::Request;
use crate::response::{Response, StreamChunk};

/// Chunk stream produced by a provider.
pub type ProviderStream = BoxStream<'static, Result<StreamChunk, ProviderError>>;

/// Provider call failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("provider {provider}: {message}")]
pub struct ProviderError {
	pub provider: String,
	pub message: String,
	/// Transient failure (rate limit, connection reset); the same request may succeed later.
	pub retryable: bool,
}

impl ProviderError {
	pub fn transient(provider: impl Into<String>, message: impl Into<String>) -> Self {
		Self {
			provider: provider.into(),
			message: message.into(),
			retryable: true,
		}
	}

	pub fn permanent(provider: impl Into<String>, message: impl Into<String>) -> Self {
		Self {
			provider: provider.into(),
			message: message.into(),
			retryable: false,
		}
	}
}

#[async_trait]
pub trait Provider: Send + Sync + 'static {
	/// Stable adapter name used in logs and errors.
	fn name(&self) -> &str;

	async fn complete(&self, request: Arc<Request>) -> Result<Response, ProviderError>;

	/// Streams the reply. The default completes the request and replays it as one delta
	/// followed by the final chunk.
	async fn stream(&self, request: Arc<Request>) -> Result<ProviderStream, ProviderError> {
		let response = self.complete(request).await?;
		let usage = response.usage;
		let text = response.text();
		let mut chunks = Vec::with_capacity(2);
		if !text.is_empty() {
			chunks.push(Ok(StreamChunk::delta(text)));
		}
		chunks.push(Ok(StreamChunk::final_chunk(Some(usage))));
		Ok(stream::iter(chunks).boxed())
	}
}
