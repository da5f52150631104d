//! File-backed [`StatusBackend`] for processes sharing a session on one machine.

// std
use std::{
	fs::{self, File},
	io::Write,
	path::{Path, PathBuf},
};
// self
use crate::{
	_prelude::*,
	store::{BackendFuture, StatusBackend, StoreError},
};

/// Persists key-value pairs to a single JSON file, re-reading it on every
/// load so writes from sibling processes are picked up.
///
/// Replacement goes through a temporary file plus rename, so readers never
/// observe a half-written snapshot. The internal mutex only serializes
/// writers within this process; cross-process write races resolve to
/// last-rename-wins.
#[derive(Clone, Debug)]
pub struct FileBackend {
	path: PathBuf,
	write_guard: Arc<Mutex<()>>,
}
impl FileBackend {
	/// Opens a backend at the provided path, creating parent directories on demand.
	pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
		let path = path.into();

		Self::ensure_parent_exists(&path)?;

		Ok(Self { path, write_guard: Arc::new(Mutex::new(())) })
	}

	fn ensure_parent_exists(path: &Path) -> Result<(), StoreError> {
		if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
			fs::create_dir_all(parent).map_err(|e| StoreError::Backend {
				message: format!("Failed to create store directory {}: {e}", parent.display()),
			})?;
		}
		Ok(())
	}

	fn load_snapshot(&self) -> Result<HashMap<String, String>, StoreError> {
		if !self.path.exists() {
			return Ok(HashMap::new());
		}

		let metadata = self.path.metadata().map_err(|e| StoreError::Backend {
			message: format!("Failed to inspect {}: {e}", self.path.display()),
		})?;

		if metadata.len() == 0 {
			return Ok(HashMap::new());
		}

		let bytes = fs::read(&self.path).map_err(|e| StoreError::Backend {
			message: format!("Failed to read {}: {e}", self.path.display()),
		})?;

		serde_json::from_slice(&bytes).map_err(|e| StoreError::Serialization {
			message: format!("Failed to parse {}: {e}", self.path.display()),
		})
	}

	fn persist_snapshot(&self, snapshot: &HashMap<String, String>) -> Result<(), StoreError> {
		Self::ensure_parent_exists(&self.path)?;

		let serialized =
			serde_json::to_vec_pretty(snapshot).map_err(|e| StoreError::Serialization {
				message: format!("Failed to serialize store snapshot: {e}"),
			})?;
		let mut tmp_path = self.path.clone();

		tmp_path.set_extension("tmp");

		{
			let mut file = File::create(&tmp_path).map_err(|e| StoreError::Backend {
				message: format!("Failed to create {}: {e}", tmp_path.display()),
			})?;

			file.write_all(&serialized).map_err(|e| StoreError::Backend {
				message: format!("Failed to write {}: {e}", tmp_path.display()),
			})?;
			file.sync_all().map_err(|e| StoreError::Backend {
				message: format!("Failed to sync {}: {e}", tmp_path.display()),
			})?;
		}

		fs::rename(&tmp_path, &self.path).map_err(|e| StoreError::Backend {
			message: format!("Failed to replace {}: {e}", self.path.display()),
		})
	}

	fn mutate(
		&self,
		apply: impl FnOnce(&mut HashMap<String, String>) -> bool,
	) -> Result<(), StoreError> {
		let _guard = self.write_guard.lock();
		let mut snapshot = self.load_snapshot()?;

		if apply(&mut snapshot) {
			self.persist_snapshot(&snapshot)?;
		}

		Ok(())
	}
}
impl StatusBackend for FileBackend {
	fn load<'a>(&'a self, key: &'a str) -> BackendFuture<'a, Option<String>> {
		Box::pin(async move { Ok(self.load_snapshot()?.remove(key)) })
	}

	fn store<'a>(&'a self, key: &'a str, value: &'a str) -> BackendFuture<'a, ()> {
		Box::pin(async move {
			self.mutate(|snapshot| {
				snapshot.insert(key.to_owned(), value.to_owned());

				true
			})
		})
	}

	fn remove<'a>(&'a self, key: &'a str) -> BackendFuture<'a, ()> {
		Box::pin(async move { self.mutate(|snapshot| snapshot.remove(key).is_some()) })
	}
}
