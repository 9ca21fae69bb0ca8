//! Active-store stack.
//!
//! # Role
//!
//! Each thread keeps a stack of pushed stores. [`ActiveStoreGuard`] pops on drop, so the
//! previous store comes back on every exit path including panics. [`Scoped`] pushes its
//! store around each poll of one future, which gives async tasks their own store even when
//! they share worker threads.
//!
//! # Invariants
//!
//! - A guard is `!Send`; it pops the stack of the thread that pushed it.
//! - A sibling context never observes another context's pushed store.

use std::cell::RefCell;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::{Arc, LazyLock};
use std::task::{Context, Poll};

use super::ComponentStore;

thread_local! {
	static STACK: RefCell<Vec<Arc<ComponentStore>>> = const { RefCell::new(Vec::new()) };
}

static DEFAULT_STORE: LazyLock<Arc<ComponentStore>> = LazyLock::new(|| Arc::new(ComponentStore::default()));

/// Restores the previously active store when dropped.
#[must_use = "the store is only active while the guard is alive"]
pub struct ActiveStoreGuard {
	depth: usize,
	_not_send: PhantomData<*const ()>,
}

impl Drop for ActiveStoreGuard {
	fn drop(&mut self) {
		STACK.with(|stack| {
			let mut stack = stack.borrow_mut();
			if stack.len() != self.depth {
				tracing::debug!(expected = self.depth, actual = stack.len(), "active_store.out_of_order_pop");
			}
			stack.truncate(self.depth.saturating_sub(1));
		});
	}
}

/// Future wrapper that makes one store active while the inner future runs.
#[must_use = "futures do nothing unless polled"]
pub struct Scoped<F> {
	store: Arc<ComponentStore>,
	fut: Pin<Box<F>>,
}

impl<F: Future> Future for Scoped<F> {
	type Output = F::Output;

	fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
		let _guard = ComponentStore::push_active(Arc::clone(&self.store));
		self.fut.as_mut().poll(cx)
	}
}

impl ComponentStore {
	/// Makes `store` the active store for the current thread until the guard drops.
	pub fn push_active(store: Arc<ComponentStore>) -> ActiveStoreGuard {
		let depth = STACK.with(|stack| {
			let mut stack = stack.borrow_mut();
			stack.push(store);
			stack.len()
		});
		ActiveStoreGuard {
			depth,
			_not_send: PhantomData,
		}
	}

	/// Runs `fut` with `store` active for every poll.
	pub fn scope<F: Future>(store: Arc<ComponentStore>, fut: F) -> Scoped<F> {
		Scoped { store, fut: Box::pin(fut) }
	}

	/// Returns the innermost active store, or the process default store.
	pub fn current_active() -> Arc<ComponentStore> {
		STACK
			.with(|stack| stack.borrow().last().cloned())
			.unwrap_or_else(|| Arc::clone(&DEFAULT_STORE))
	}

	/// Returns the process default store used when nothing is pushed.
	pub fn process_default() -> Arc<ComponentStore> {
		Arc::clone(&DEFAULT_STORE)
	}
}
