//! Service dispatch and execution.
//!
//! # Role
//!
//! Services are registry components that can be invoked. The [`Dispatcher`] resolves a
//! service identity, records the call in a [`TaskTable`], and hands it to an
//! [`ExecutionBackend`] according to the requested [`ExecutionMode`]:
//!
//! - `sync`: runs inline and returns a terminal [`switchboard_invocation::Response`].
//! - `enqueue`: hands the call to a [`TaskQueue`] and returns a pending [`TaskStatus`].
//! - `stream`: returns a [`ChunkStream`] that ends with exactly one final chunk.
//!
//! # Invariants
//!
//! - Every dispatched call has exactly one task record; its state only moves forward
//!   (`pending -> running -> succeeded | failed | cancelled`).
//! - The caller's correlation id is carried on the task, the queued payload and the result.
//! - Timeouts and cancellation trip the call's [`tokio_util::sync::CancellationToken`].
//! - Nothing in this crate retries.

mod backend;
mod dispatcher;
mod error;
mod provider;
mod service;
mod spawn;
mod status;
mod table;

pub use backend::{
	ChunkStream, DEFAULT_QUEUE, Dispatched, EnqueueBackend, ExecutionBackend, ExecutionMode, ImmediateBackend, JobPayload, LocalQueue, QueuedJob, ServiceCall,
	StreamBackend, TaskQueue,
};
pub use dispatcher::{Dispatcher, DispatcherConfig};
pub use error::{DispatchError, ExecutionError};
pub use provider::ProviderService;
pub use service::{Service, ServiceHandle, ServiceOptions, ServiceStream, register_service};
pub use spawn::{TaskClass, spawn, submit_and_wait};
pub use status::{CallContext, TaskId, TaskState, TaskStatus};
pub use table::TaskTable;
