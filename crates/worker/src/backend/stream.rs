use std::pin::Pin;
use std::task::{Context, Poll, ready};

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use switchboard_invocation::{CorrelationId, OutputItem, Response, StreamChunk, Usage};
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};

use super::{Dispatched, ExecutionBackend, ExecutionMode, ServiceCall};
use crate::error::{DispatchError, ExecutionError};
use crate::service::ServiceStream;
use crate::status::TaskId;
use crate::table::TaskTable;

/// Streams service output chunk by chunk.
#[derive(Debug, Clone, Copy, Default)]
pub struct StreamBackend;

impl StreamBackend {
	pub const NAME: &'static str = "stream";
}

#[async_trait]
impl ExecutionBackend for StreamBackend {
	fn name(&self) -> &str {
		Self::NAME
	}

	fn supports(&self, mode: ExecutionMode) -> bool {
		mode == ExecutionMode::Stream
	}

	async fn submit(&self, call: ServiceCall) -> Result<Dispatched, DispatchError> {
		let ServiceCall {
			task,
			service,
			input,
			context,
			tasks,
			..
		} = call;
		if !tasks.start(task) {
			return Err(ExecutionError::Cancelled.into());
		}
		let opened = tokio::select! {
			biased;
			() = context.cancel.cancelled() => Err(ExecutionError::Cancelled),
			opened = service.stream(input, &context) => opened,
		};
		match opened {
			Ok(inner) => Ok(Dispatched::Stream(ChunkStream::new(task, inner, tasks, context.cancel.clone(), context.correlation_id))),
			Err(err) => {
				tasks.finish(task, Err(err.clone()));
				Err(err.into())
			}
		}
	}
}

/// Consumer side of a streamed call.
///
/// Yields the service's chunks and guarantees the sequence ends with exactly one final
/// chunk; a missing final chunk is synthesized. After [`ChunkStream::cancel`] (or dropping
/// the stream) no further chunks are produced and the task is marked cancelled. On
/// completion the task result holds the concatenated deltas and the last reported usage.
pub struct ChunkStream {
	task: TaskId,
	inner: ServiceStream,
	tasks: TaskTable,
	cancel: CancellationToken,
	cancelled: Pin<Box<WaitForCancellationFutureOwned>>,
	correlation_id: CorrelationId,
	text: String,
	usage: Option<Usage>,
	done: bool,
}

impl ChunkStream {
	fn new(task: TaskId, inner: ServiceStream, tasks: TaskTable, cancel: CancellationToken, correlation_id: CorrelationId) -> Self {
		Self {
			task,
			inner,
			tasks,
			cancelled: Box::pin(cancel.clone().cancelled_owned()),
			cancel,
			correlation_id,
			text: String::new(),
			usage: None,
			done: false,
		}
	}

	pub fn task_id(&self) -> TaskId {
		self.task
	}

	/// Stops the stream; the producer observes it before its next chunk.
	pub fn cancel(&self) {
		if self.tasks.cancel(self.task).is_err() {
			self.cancel.cancel();
		}
	}

	fn aggregate(&self) -> Response {
		Response::new(self.correlation_id).with_output(OutputItem::assistant(self.text.clone())).with_usage(self.usage.unwrap_or_default())
	}

	fn complete(&mut self, outcome: Result<Response, ExecutionError>) {
		self.done = true;
		self.tasks.finish(self.task, outcome);
	}
}

impl Stream for ChunkStream {
	type Item = Result<StreamChunk, ExecutionError>;

	fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
		let this = &mut *self;
		if this.done {
			return Poll::Ready(None);
		}
		if this.cancelled.as_mut().poll(cx).is_ready() {
			tracing::debug!(task = %this.task, "stream.cancelled");
			this.complete(Err(ExecutionError::Cancelled));
			return Poll::Ready(None);
		}

		match ready!(this.inner.poll_next_unpin(cx)) {
			Some(Ok(chunk)) => {
				this.text.push_str(&chunk.delta);
				if chunk.usage.is_some() {
					this.usage = chunk.usage;
				}
				if chunk.is_final {
					let response = this.aggregate();
					this.complete(Ok(response));
				}
				Poll::Ready(Some(Ok(chunk)))
			}
			Some(Err(err)) => {
				this.complete(Err(err.clone()));
				Poll::Ready(Some(Err(err)))
			}
			None => {
				tracing::trace!(task = %this.task, "stream.synthesized_final");
				let response = this.aggregate();
				this.complete(Ok(response));
				Poll::Ready(Some(Ok(StreamChunk::final_chunk(this.usage))))
			}
		}
	}
}

impl Drop for ChunkStream {
	fn drop(&mut self) {
		if !self.done {
			let _ = self.tasks.cancel(self.task);
		}
	}
}

impl std::fmt::Debug for ChunkStream {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ChunkStream").field("task", &self.task).field("done", &self.done).finish_non_exhaustive()
	}
}
