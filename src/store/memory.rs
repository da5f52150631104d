//! Thread-safe in-memory [`StatusBackend`] for simulated contexts and tests.

// self
use crate::{
	_prelude::*,
	store::{BackendFuture, StatusBackend},
};

type Cell = Arc<RwLock<HashMap<String, String>>>;

/// In-process key-value backend; clone handles to share one cell across
/// simulated contexts the way tabs share origin storage.
#[derive(Clone, Debug, Default)]
pub struct MemoryBackend(Cell);
impl MemoryBackend {
	fn load_now(cell: Cell, key: String) -> Option<String> {
		cell.read().get(&key).cloned()
	}

	fn store_now(cell: Cell, key: String, value: String) {
		cell.write().insert(key, value);
	}

	fn remove_now(cell: Cell, key: String) {
		cell.write().remove(&key);
	}
}
impl StatusBackend for MemoryBackend {
	fn load<'a>(&'a self, key: &'a str) -> BackendFuture<'a, Option<String>> {
		let cell = self.0.clone();
		let key = key.to_owned();

		Box::pin(async move { Ok(Self::load_now(cell, key)) })
	}

	fn store<'a>(&'a self, key: &'a str, value: &'a str) -> BackendFuture<'a, ()> {
		let cell = self.0.clone();
		let key = key.to_owned();
		let value = value.to_owned();

		Box::pin(async move {
			Self::store_now(cell, key, value);

			Ok(())
		})
	}

	fn remove<'a>(&'a self, key: &'a str) -> BackendFuture<'a, ()> {
		let cell = self.0.clone();
		let key = key.to_owned();

		Box::pin(async move {
			Self::remove_now(cell, key);

			Ok(())
		})
	}
}
#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[tokio::test]
	async fn clones_share_one_cell() {
		let origin = MemoryBackend::default();
		let peer = origin.clone();

		origin.store("k", "v").await.expect("Storing into the memory backend should succeed.");

		let seen = peer.load("k").await.expect("Loading from a clone should succeed.");

		assert_eq!(seen.as_deref(), Some("v"));

		peer.remove("k").await.expect("Removing through a clone should succeed.");

		let gone = origin.load("k").await.expect("Loading after removal should succeed.");

		assert_eq!(gone, None);
	}
}
