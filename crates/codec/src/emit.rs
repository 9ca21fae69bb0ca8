//! Post-commit side effects.

use async_trait::async_trait;
use serde::Serialize;
use switchboard_invocation::CorrelationId;
use switchboard_registry::Identity;
use tokio::sync::broadcast;

use crate::error::EmitError;
use crate::record::DomainRecord;

/// What a successful pipeline run committed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Committed {
	/// Identity of the codec that produced the records, when it was resolved from a store.
	pub codec: Option<Identity>,
	pub correlation_id: CorrelationId,
	pub records: Vec<DomainRecord>,
}

/// Receives committed records, e.g. to notify connected clients.
#[async_trait]
pub trait Emitter: Send + Sync + 'static {
	fn name(&self) -> &str;

	async fn emit(&self, committed: &Committed) -> Result<(), EmitError>;
}

/// Fans committed batches out to in-process subscribers.
#[derive(Debug, Clone)]
pub struct BroadcastEmitter {
	tx: broadcast::Sender<Committed>,
}

impl BroadcastEmitter {
	pub const NAME: &'static str = "broadcast";

	pub fn new(capacity: usize) -> Self {
		let (tx, _) = broadcast::channel(capacity.max(1));
		Self { tx }
	}

	pub fn subscribe(&self) -> broadcast::Receiver<Committed> {
		self.tx.subscribe()
	}
}

#[async_trait]
impl Emitter for BroadcastEmitter {
	fn name(&self) -> &str {
		Self::NAME
	}

	/// Fails when nobody is subscribed.
	async fn emit(&self, committed: &Committed) -> Result<(), EmitError> {
		self.tx.send(committed.clone()).map(|_| ()).map_err(|_| EmitError::new(Self::NAME, "no subscribers"))
	}
}
