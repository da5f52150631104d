//! Cross-context mutual-exclusion contracts and the in-process fallback.

// self
use crate::_prelude::*;

/// Boxed future returned by [`LockBackend::acquire`].
pub type LockFuture<'a> = Pin<Box<dyn Future<Output = Result<LockGuard, LockError>> + 'a + Send>>;

/// Mutual-exclusion contract guarding the refresh decision across contexts.
///
/// Acquisition suspends until the named lock is free; queuing must be fair so
/// no context starves. Release happens when the returned guard drops, or when
/// the holding context terminates - that last property is the backend's
/// responsibility, the coordinator imposes no timeout of its own.
pub trait LockBackend
where
	Self: Send + Sync,
{
	/// Acquires the named lock, resolving once this caller holds it.
	fn acquire<'a>(&'a self, name: &'a str) -> LockFuture<'a>;
}

/// RAII lease over a named lock; dropping it releases the lock.
pub struct LockGuard(Box<dyn Any + Send>);
impl LockGuard {
	/// Wraps whatever backend-specific token keeps the lock held.
	pub fn new(lease: impl Any + Send) -> Self {
		Self(Box::new(lease))
	}
}
impl Debug for LockGuard {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("LockGuard(..)")
	}
}

/// Error type produced by [`LockBackend`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum LockError {
	/// Backend-level failure while acquiring the lock.
	#[error("Lock backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}

type GuardRegistry = Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>;

/// Per-name async mutexes shared by every clone of this backend.
///
/// Correct only within one process: contexts in other processes do not see
/// these locks. Hosts with a real cross-process primitive should implement
/// [`LockBackend`] over it and treat this as the degraded fallback.
#[derive(Clone, Debug, Default)]
pub struct ProcessLockBackend(GuardRegistry);
impl ProcessLockBackend {
	/// Returns (and creates on demand) the mutex registered under `name`.
	fn named(&self, name: &str) -> Arc<AsyncMutex<()>> {
		let mut registry = self.0.lock();

		registry.entry(name.to_owned()).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
	}
}
impl LockBackend for ProcessLockBackend {
	fn acquire<'a>(&'a self, name: &'a str) -> LockFuture<'a> {
		let mutex = self.named(name);

		Box::pin(async move { Ok(LockGuard::new(mutex.lock_arc().await)) })
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::sync::atomic::{AtomicU32, Ordering};
	// self
	use super::*;

	#[tokio::test]
	async fn guard_drop_releases_the_lock() {
		let backend = ProcessLockBackend::default();
		let guard = backend.acquire("gate").await.expect("First acquisition should succeed.");

		drop(guard);

		let _reacquired =
			backend.acquire("gate").await.expect("Reacquisition after drop should succeed.");
	}

	#[tokio::test]
	async fn distinct_names_do_not_contend() {
		let backend = ProcessLockBackend::default();
		let _a = backend.acquire("a").await.expect("Acquiring lock a should succeed.");
		let _b = backend.acquire("b").await.expect("Acquiring lock b should succeed.");
	}

	#[tokio::test]
	async fn clones_guard_the_same_names() {
		let backend = ProcessLockBackend::default();
		let peer = backend.clone();
		let entered = Arc::new(AtomicU32::new(0));
		let guard = backend.acquire("gate").await.expect("Initial acquisition should succeed.");
		let waiter = {
			let entered = entered.clone();

			tokio::spawn(async move {
				let _guard =
					peer.acquire("gate").await.expect("Queued acquisition should succeed.");

				entered.fetch_add(1, Ordering::SeqCst);
			})
		};

		tokio::task::yield_now().await;

		assert_eq!(entered.load(Ordering::SeqCst), 0);

		drop(guard);
		waiter.await.expect("Queued task should complete.");

		assert_eq!(entered.load(Ordering::SeqCst), 1);
	}
}
