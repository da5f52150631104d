//! Coordinator assembly: the public surface every context talks to.

mod access;
mod metrics;

pub use metrics::GateMetrics;

// self
use crate::{
	_prelude::*,
	hub::SubscriptionHub,
	lock::LockBackend,
	refresh::{ExchangeSlot, RefreshExchange},
	session::{Status, Tokens},
	store::{DEFAULT_STORAGE_KEY, StatusBackend, StatusStore},
};

/// Coordinates one shared session across every context of an origin.
///
/// The coordinator owns no session state of its own; the persisted status
/// record behind the injected [`StatusBackend`] is the single source of
/// truth, and the injected [`LockBackend`] serializes refresh decisions so a
/// refresh token is exchanged at most once per validity window no matter how
/// many contexts race. Construct one instance per context, all wired to the
/// same backends.
pub struct Coordinator {
	/// Shared counters for gate outcomes.
	pub gate_metrics: Arc<GateMetrics>,
	pub(crate) store: StatusStore,
	pub(crate) lock: Arc<dyn LockBackend>,
	pub(crate) lock_name: String,
	pub(crate) hub: SubscriptionHub,
	pub(crate) slot: ExchangeSlot,
}
impl Coordinator {
	/// Creates a coordinator over the provided backends with the default storage key.
	pub fn new(status_backend: Arc<dyn StatusBackend>, lock_backend: Arc<dyn LockBackend>) -> Self {
		Self {
			gate_metrics: Default::default(),
			store: StatusStore::new(status_backend, DEFAULT_STORAGE_KEY),
			lock: lock_backend,
			lock_name: lock_name_for(DEFAULT_STORAGE_KEY),
			hub: SubscriptionHub::default(),
			slot: ExchangeSlot::default(),
		}
	}

	/// Replaces the storage key; the gate lock name follows the key so every
	/// context configured with the same key contends on the same lock.
	pub fn with_storage_key(mut self, key: impl Into<String>) -> Self {
		let key = key.into();

		self.lock_name = lock_name_for(&key);
		self.store = self.store.with_key(key);

		self
	}

	/// Registers the host's refresh exchange, resuming any parked
	/// [`access_token`](Self::access_token) callers.
	///
	/// The first registration wins; later calls are no-ops returning `false`.
	pub fn set_refresh_exchange(&self, exchange: Arc<dyn RefreshExchange>) -> bool {
		self.slot.register(exchange)
	}

	/// Persists the provided tokens and notifies local subscribers.
	///
	/// Hosts call this after login or any out-of-band refresh (for example
	/// the leader scheduler's proactive exchange).
	pub async fn set_status(&self, tokens: Tokens) -> Result<()> {
		self.store.save_status(&tokens).await?;
		self.emit_status().await
	}

	/// Clears the persisted record and notifies local subscribers. Idempotent.
	pub async fn set_logged_out(&self) -> Result<()> {
		self.store.clear_status().await?;
		self.emit_status().await
	}

	/// Returns the current derived status.
	pub async fn status(&self) -> Result<Status> {
		Ok(self.store.status().await?)
	}

	/// Registers a status listener and delivers the current status to it immediately.
	pub async fn subscribe_status_updates(
		&self,
		listener: impl Fn(&Status) + Send + Sync + 'static,
	) -> Result<()> {
		let current = self.store.status().await?;

		self.hub.subscribe(listener, &current);

		Ok(())
	}

	/// Re-reads the shared record and notifies local subscribers.
	///
	/// Peers reacting to a cross-context broadcast call this so their own
	/// listeners observe a change another context persisted.
	pub async fn emit_status(&self) -> Result<()> {
		let status = self.store.status().await?;

		self.hub.notify(&status);

		Ok(())
	}
}
impl Debug for Coordinator {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Coordinator")
			.field("store", &self.store)
			.field("lock_name", &self.lock_name)
			.field("hub", &self.hub)
			.field("slot", &self.slot)
			.finish()
	}
}

fn lock_name_for(storage_key: &str) -> String {
	format!("{storage_key}.gate")
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::{lock::ProcessLockBackend, store::MemoryBackend};

	fn coordinator() -> Coordinator {
		Coordinator::new(
			Arc::new(MemoryBackend::default()),
			Arc::new(ProcessLockBackend::default()),
		)
	}

	fn fresh_tokens() -> Tokens {
		let epoch = OffsetDateTime::now_utc().unix_timestamp();

		Tokens::new("A1", epoch + 3_600, "R1", epoch + 86_400)
	}

	#[tokio::test]
	async fn set_status_round_trips_through_storage() {
		let coordinator = coordinator();

		coordinator.set_status(fresh_tokens()).await.expect("Setting status should succeed.");

		let status = coordinator.status().await.expect("Reading status should succeed.");

		assert_eq!(status.access_token(), "A1");
		assert_eq!(status.refresh_token(), "R1");
		assert!(status.logged_in);
		assert!(status.access_token_valid);
	}

	#[tokio::test]
	async fn set_logged_out_is_idempotent() {
		let coordinator = coordinator();

		coordinator.set_status(fresh_tokens()).await.expect("Setting status should succeed.");
		coordinator.set_logged_out().await.expect("First logout should succeed.");

		let first = coordinator.status().await.expect("Reading status should succeed.");

		coordinator.set_logged_out().await.expect("Second logout should succeed.");

		let second = coordinator.status().await.expect("Reading status should succeed.");

		assert_eq!(first, second);
		assert_eq!(second, Status::logged_out());
	}

	#[tokio::test]
	async fn subscribers_get_the_current_status_then_every_change() {
		let coordinator = coordinator();
		let seen = Arc::new(Mutex::new(Vec::new()));
		let sink = seen.clone();

		coordinator
			.subscribe_status_updates(move |status| sink.lock().push(status.logged_in))
			.await
			.expect("Subscribing should succeed.");
		coordinator.set_status(fresh_tokens()).await.expect("Setting status should succeed.");
		coordinator.set_logged_out().await.expect("Logout should succeed.");

		assert_eq!(*seen.lock(), vec![false, true, false]);
	}

	#[tokio::test]
	async fn storage_key_scopes_the_record() {
		let backend = Arc::new(MemoryBackend::default());
		let locks = Arc::new(ProcessLockBackend::default());
		let a = Coordinator::new(backend.clone(), locks.clone()).with_storage_key("app_a.status");
		let b = Coordinator::new(backend, locks).with_storage_key("app_b.status");

		a.set_status(fresh_tokens()).await.expect("Setting status for app A should succeed.");

		let status_b = b.status().await.expect("Reading app B status should succeed.");

		assert!(!status_b.logged_in);
	}
}
