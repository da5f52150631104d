// std
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters for gate outcomes.
#[derive(Debug, Default)]
pub struct GateMetrics {
	attempts: AtomicU64,
	fast_path_hits: AtomicU64,
	exchanges: AtomicU64,
	successes: AtomicU64,
	failures: AtomicU64,
}
impl GateMetrics {
	/// Returns the total number of `access_token` calls.
	pub fn attempts(&self) -> u64 {
		self.attempts.load(Ordering::Relaxed)
	}

	/// Returns the number of calls served from the persisted record without an exchange.
	pub fn fast_path_hits(&self) -> u64 {
		self.fast_path_hits.load(Ordering::Relaxed)
	}

	/// Returns the number of refresh exchange invocations.
	pub fn exchanges(&self) -> u64 {
		self.exchanges.load(Ordering::Relaxed)
	}

	/// Returns the number of calls that produced a token.
	pub fn successes(&self) -> u64 {
		self.successes.load(Ordering::Relaxed)
	}

	/// Returns the number of calls that failed.
	pub fn failures(&self) -> u64 {
		self.failures.load(Ordering::Relaxed)
	}

	pub(crate) fn record_attempt(&self) {
		self.attempts.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_fast_path(&self) {
		self.fast_path_hits.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_exchange(&self) {
		self.exchanges.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_success(&self) {
		self.successes.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_failure(&self) {
		self.failures.fetch_add(1, Ordering::Relaxed);
	}
}
