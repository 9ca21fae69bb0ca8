//! Single-domain registry with an open/frozen lifecycle.
//!
//! # Concurrency
//!
//! - **Writes:** serialized by one mutex per registry; each accepted write publishes a new
//!   immutable table.
//! - **Reads:** lock-free atomic load of the current table. After [`Registry::freeze`] the
//!   table never changes again.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::collision::{CollisionPolicy, CollisionRecord, Outcome};
use crate::component::RegistrationRecord;
use crate::error::RegistryError;
use crate::identity::{Domain, Identity};

type Table = FxHashMap<Identity, Arc<RegistrationRecord>>;

/// Identity-keyed store for one [`Domain`].
pub struct Registry {
	domain: Domain,
	policy: CollisionPolicy,
	table: ArcSwap<Table>,
	write: Mutex<()>,
	frozen: AtomicBool,
	collisions: Mutex<Vec<CollisionRecord>>,
}

impl Registry {
	/// Creates an open, empty registry.
	pub fn new(domain: Domain, policy: CollisionPolicy) -> Self {
		Self {
			domain,
			policy,
			table: ArcSwap::from_pointee(Table::default()),
			write: Mutex::new(()),
			frozen: AtomicBool::new(false),
			collisions: Mutex::new(Vec::new()),
		}
	}

	pub fn domain(&self) -> Domain {
		self.domain
	}

	pub fn policy(&self) -> CollisionPolicy {
		self.policy
	}

	/// Inserts a record after collision evaluation.
	pub fn register(&self, record: RegistrationRecord) -> Result<Outcome, RegistryError> {
		let identity = record.identity().clone();
		if identity.domain() != self.domain {
			return Err(RegistryError::DomainMismatch {
				expected: self.domain,
				identity,
			});
		}

		let _guard = self.write.lock();
		if self.frozen.load(Ordering::Acquire) {
			return Err(RegistryError::Frozen { domain: self.domain });
		}

		let current = self.table.load_full();
		let existing = current.get(&identity);
		let outcome = self.policy.evaluate(&record, existing.map(Arc::as_ref));

		match outcome {
			Outcome::NoOpSame => {
				tracing::trace!(%identity, "registry.register.noop");
				return Ok(outcome);
			}
			Outcome::CollisionStrict => {
				let existing = existing.map_or("<unknown>", |e| e.type_name());
				tracing::error!(%identity, existing, incoming = record.type_name(), "registry.collision.strict");
				return Err(RegistryError::Collision {
					identity,
					existing,
					incoming: record.type_name(),
				});
			}
			Outcome::CollisionLenient => {
				if let Some(existing) = existing {
					let entry = CollisionRecord::new(&record, existing, outcome);
					tracing::warn!(
						%identity,
						existing = entry.existing,
						incoming = entry.incoming,
						"registry.collision.lenient: last registration wins"
					);
					self.collisions.lock().push(entry);
				}
			}
			Outcome::Accept => {
				tracing::debug!(%identity, type_name = record.type_name(), "registry.register");
			}
		}

		let mut next = Table::clone(&current);
		next.insert(identity, Arc::new(record));
		self.table.store(Arc::new(next));
		Ok(outcome)
	}

	/// Looks up a record without locking.
	pub fn get(&self, identity: &Identity) -> Result<Arc<RegistrationRecord>, RegistryError> {
		self.table.load().get(identity).cloned().ok_or_else(|| RegistryError::NotFound { label: identity.label() })
	}

	pub fn contains(&self, identity: &Identity) -> bool {
		self.table.load().contains_key(identity)
	}

	/// Makes the registry read-only. Irreversible.
	pub fn freeze(&self) {
		let _guard = self.write.lock();
		if !self.frozen.swap(true, Ordering::AcqRel) {
			tracing::debug!(domain = %self.domain, entries = self.len(), "registry.freeze");
		}
	}

	pub fn is_frozen(&self) -> bool {
		self.frozen.load(Ordering::Acquire)
	}

	/// Registered identities in label order.
	pub fn identities(&self) -> Vec<Identity> {
		let mut ids: Vec<Identity> = self.table.load().keys().cloned().collect();
		ids.sort();
		ids
	}

	/// Registered records in label order.
	pub fn snapshot(&self) -> Vec<Arc<RegistrationRecord>> {
		let table = self.table.load_full();
		let mut records: Vec<_> = table.values().cloned().collect();
		records.sort_by(|a, b| a.identity().cmp(b.identity()));
		records
	}

	/// Lenient-mode collisions in the order they happened.
	pub fn collisions(&self) -> Vec<CollisionRecord> {
		self.collisions.lock().clone()
	}

	pub fn len(&self) -> usize {
		self.table.load().len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

impl std::fmt::Debug for Registry {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Registry")
			.field("domain", &self.domain)
			.field("policy", &self.policy)
			.field("frozen", &self.is_frozen())
			.field("len", &self.len())
			.finish()
	}
}
