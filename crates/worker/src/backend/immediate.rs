use async_trait::async_trait;

use super::{Dispatched, ExecutionBackend, ExecutionMode, ServiceCall, execute};
use crate::error::DispatchError;

/// Runs the service inline; the caller receives a terminal result.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImmediateBackend;

impl ImmediateBackend {
	pub const NAME: &'static str = "immediate";
}

#[async_trait]
impl ExecutionBackend for ImmediateBackend {
	fn name(&self) -> &str {
		Self::NAME
	}

	fn supports(&self, mode: ExecutionMode) -> bool {
		mode == ExecutionMode::Sync
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
		let response = execute(&tasks, task, service.as_ref(), input, &context).await?;
		Ok(Dispatched::Response(response))
	}
}
