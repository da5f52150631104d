//! Storage contracts and the status store shared by every context.

pub mod file;
pub mod memory;

pub use file::FileBackend;
pub use memory::MemoryBackend;

// self
use crate::{
	_prelude::*,
	session::{Status, Tokens},
};

/// Boxed future returned by [`StatusBackend`] operations.
pub type BackendFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Well-known key the status record lives under when the host does not override it.
pub const DEFAULT_STORAGE_KEY: &str = "session_coordinator.status";
/// Version tag stamped into every persisted record so future layouts can migrate.
pub const SCHEMA_VERSION: u32 = 1;

/// Key-value persistence contract shared by all contexts of one origin.
///
/// Writes must be visible to every other context as soon as the returned
/// future resolves. The backend stores opaque strings; record layout belongs
/// to [`StatusStore`].
pub trait StatusBackend
where
	Self: Send + Sync,
{
	/// Fetches the raw value under `key`, if present.
	fn load<'a>(&'a self, key: &'a str) -> BackendFuture<'a, Option<String>>;

	/// Writes `value` under `key` as one atomic replacement.
	fn store<'a>(&'a self, key: &'a str, value: &'a str) -> BackendFuture<'a, ()>;

	/// Removes `key` so absence is observable, as opposed to an explicit empty value.
	fn remove<'a>(&'a self, key: &'a str) -> BackendFuture<'a, ()>;
}

/// Error type produced by [`StatusBackend`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failures surfaced by the backend or the record codec.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}

/// Wire form of the persisted record: one JSON blob under one well-known key.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct PersistedStatus {
	#[serde(default)]
	schema: u32,
	#[serde(flatten)]
	tokens: Tokens,
}

/// Reads and writes the single shared status record through a [`StatusBackend`].
///
/// There is no trusted in-memory copy. Every read goes back to the backend and
/// recomputes the derived validity flags, so a record mutated by another
/// context between reads is always picked up.
#[derive(Clone)]
pub struct StatusStore {
	backend: Arc<dyn StatusBackend>,
	key: String,
}
impl StatusStore {
	/// Creates a store over the provided backend and storage key.
	pub fn new(backend: Arc<dyn StatusBackend>, key: impl Into<String>) -> Self {
		Self { backend, key: key.into() }
	}

	/// Returns the storage key this store reads and writes.
	pub fn key(&self) -> &str {
		&self.key
	}

	/// Replaces the storage key, keeping the backend.
	pub fn with_key(mut self, key: impl Into<String>) -> Self {
		self.key = key.into();

		self
	}

	/// Reads the shared record and derives validity flags at the current instant.
	pub async fn status(&self) -> Result<Status, StoreError> {
		self.status_at(OffsetDateTime::now_utc()).await
	}

	/// Reads the shared record and derives validity flags at an explicit instant.
	///
	/// An absent, unparsable, or unknown-schema record yields the empty
	/// logged-out record rather than an error; malformed state self-heals on
	/// the next write.
	pub async fn status_at(&self, instant: OffsetDateTime) -> Result<Status, StoreError> {
		let raw = self.backend.load(&self.key).await?;
		let tokens = raw.map(|blob| Self::decode(&blob)).unwrap_or_default();

		Ok(Status::derive_at(tokens, instant))
	}

	/// Serializes and writes the tokens as one schema-tagged blob.
	pub async fn save_status(&self, tokens: &Tokens) -> Result<(), StoreError> {
		let record = PersistedStatus { schema: SCHEMA_VERSION, tokens: tokens.clone() };
		let blob = serde_json::to_string(&record).map_err(|e| StoreError::Serialization {
			message: format!("Failed to serialize status record: {e}"),
		})?;

		self.backend.store(&self.key, &blob).await
	}

	/// Removes the record entirely.
	pub async fn clear_status(&self) -> Result<(), StoreError> {
		self.backend.remove(&self.key).await
	}

	fn decode(blob: &str) -> Tokens {
		let deserializer = &mut serde_json::Deserializer::from_str(blob);

		match serde_path_to_error::deserialize::<_, PersistedStatus>(deserializer) {
			Ok(record) if record.schema == SCHEMA_VERSION => record.tokens,
			Ok(record) => {
				#[cfg(feature = "tracing")]
				tracing::warn!(schema = record.schema, "discarding status record with unknown schema");
				#[cfg(not(feature = "tracing"))]
				let _ = record;

				Tokens::default()
			},
			Err(e) => {
				#[cfg(feature = "tracing")]
				tracing::warn!(path = %e.path(), error = %e, "discarding malformed status record");
				#[cfg(not(feature = "tracing"))]
				let _ = e;

				Tokens::default()
			},
		}
	}
}
impl Debug for StatusStore {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("StatusStore").field("key", &self.key).finish()
	}
}
