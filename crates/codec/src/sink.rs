//! Persistence contract for the persist stage.
//!
//! # Invariants
//!
//! - Records written to a [`Transaction`] are invisible to readers until `commit` returns.
//! - After `rollback` nothing the transaction wrote is visible.
//! - A transaction holds exclusive write access to the sink for its whole lifetime and only then.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::SinkError;
use crate::record::{DomainRecord, EntityKind};

/// Store that accepts domain records in atomic batches.
#[async_trait]
pub trait Sink: Send + Sync + 'static {
	async fn begin(&self) -> Result<Box<dyn Transaction>, SinkError>;
}

/// One atomic write batch.
#[async_trait]
pub trait Transaction: Send {
	async fn write(&mut self, record: &DomainRecord) -> Result<(), SinkError>;

	/// Publishes every write at once. A failed commit publishes nothing.
	async fn commit(self: Box<Self>) -> Result<(), SinkError>;

	async fn rollback(self: Box<Self>) -> Result<(), SinkError>;
}

/// Sink backed by process memory.
#[derive(Clone, Default)]
pub struct InMemorySink {
	committed: Arc<RwLock<Vec<DomainRecord>>>,
	writer: Arc<Mutex<()>>,
}

impl InMemorySink {
	pub fn new() -> Self {
		Self::default()
	}

	/// Committed records in commit order.
	pub fn records(&self) -> Vec<DomainRecord> {
		self.committed.read().clone()
	}

	pub fn records_of(&self, kind: &EntityKind) -> Vec<DomainRecord> {
		self.committed.read().iter().filter(|r| &r.kind == kind).cloned().collect()
	}

	pub fn len(&self) -> usize {
		self.committed.read().len()
	}

	pub fn is_empty(&self) -> bool {
		self.committed.read().is_empty()
	}
}

impl std::fmt::Debug for InMemorySink {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("InMemorySink").field("committed", &self.len()).finish()
	}
}

#[async_trait]
impl Sink for InMemorySink {
	async fn begin(&self) -> Result<Box<dyn Transaction>, SinkError> {
		let guard = Arc::clone(&self.writer).lock_owned().await;
		Ok(Box::new(MemoryTransaction {
			staged: Vec::new(),
			committed: Arc::clone(&self.committed),
			_guard: guard,
		}))
	}
}

struct MemoryTransaction {
	staged: Vec<DomainRecord>,
	committed: Arc<RwLock<Vec<DomainRecord>>>,
	_guard: OwnedMutexGuard<()>,
}

#[async_trait]
impl Transaction for MemoryTransaction {
	async fn write(&mut self, record: &DomainRecord) -> Result<(), SinkError> {
		self.staged.push(record.clone());
		Ok(())
	}

	async fn commit(self: Box<Self>) -> Result<(), SinkError> {
		let MemoryTransaction { staged, committed, _guard } = *self;
		committed.write().extend(staged);
		Ok(())
	}

	async fn rollback(self: Box<Self>) -> Result<(), SinkError> {
		tracing::trace!(discarded = self.staged.len(), "sink.memory.rollback");
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;
	use switchboard_invocation::CorrelationId;

	use super::*;

	fn record(n: i64) -> DomainRecord {
		DomainRecord::new(EntityKind::MESSAGE, "messages", json!({ "n": n }), CorrelationId::new())
	}

	#[tokio::test]
	async fn test_staged_writes_invisible_until_commit() {
		let sink = InMemorySink::new();
		let mut tx = sink.begin().await.unwrap();
		tx.write(&record(1)).await.unwrap();
		tx.write(&record(2)).await.unwrap();
		assert!(sink.is_empty());
		tx.commit().await.unwrap();
		assert_eq!(sink.len(), 2);
	}

	#[tokio::test]
	async fn test_rollback_discards() {
		let sink = InMemorySink::new();
		let mut tx = sink.begin().await.unwrap();
		tx.write(&record(1)).await.unwrap();
		tx.rollback().await.unwrap();
		assert!(sink.is_empty());

		// The writer lock is released, so a new transaction can start.
		let tx = sink.begin().await.unwrap();
		tx.commit().await.unwrap();
	}
}
