//! The refresh gate: lock-guarded access token retrieval with single-flight
//! refresh across contexts.
//!
//! [`Coordinator::access_token`] acquires the cross-context lock around the
//! entire decide-and-maybe-refresh sequence, because a bare read-then-write
//! is not atomic and two contexts could otherwise both observe "invalid" and
//! both exchange the same refresh token. While one holder is inside the
//! guarded section no other context can enter it; by the time the lock is
//! released the persisted record already reflects the exchange, so the next
//! acquirer short-circuits on the fast path.

// self
use crate::{
	_prelude::*,
	coordinator::Coordinator,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	refresh::{LogoutHandle, RefreshVerdict},
};

/// Outcome of one pass through the guarded section.
enum GatePass {
	/// A currently-valid token was observed.
	Token(String),
	/// An exchange was persisted; re-read in a fresh guarded section.
	Retry,
}

impl Coordinator {
	/// Returns a currently-valid access token for this session.
	///
	/// Serves the persisted token without any exchange when it still has
	/// [`MIN_TTL`](crate::session::MIN_TTL) of life. Otherwise the refresh
	/// exchange runs under the lock, at most once per guarded section, and
	/// the call re-reads the persisted record rather than trusting the
	/// exchange's literal return value.
	///
	/// # Errors
	/// - [`Error::LoggedOut`] when no valid refresh token exists or the
	///   exchange explicitly denied the refresh; the record is cleared.
	/// - [`Error::RefreshFailed`] for any other exchange failure; the record
	///   is untouched and the host's error rides along as the source.
	///
	/// Calls made before [`set_refresh_exchange`](Self::set_refresh_exchange)
	/// suspend at the exchange point until registration occurs.
	pub async fn access_token(&self) -> Result<String> {
		const KIND: FlowKind = FlowKind::AccessToken;

		let span = FlowSpan::new(KIND, "access_token");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);
		self.gate_metrics.record_attempt();

		let result = span
			.instrument(async move {
				loop {
					match self.guarded_pass().await? {
						GatePass::Token(token) => return Ok(token),
						GatePass::Retry => continue,
					}
				}
			})
			.await;

		match &result {
			Ok(_) => {
				self.gate_metrics.record_success();
				obs::record_flow_outcome(KIND, FlowOutcome::Success);
			},
			Err(_) => {
				self.gate_metrics.record_failure();
				obs::record_flow_outcome(KIND, FlowOutcome::Failure);
			},
		}

		result
	}

	async fn guarded_pass(&self) -> Result<GatePass> {
		let _guard = self.lock.acquire(&self.lock_name).await?;
		let status = self.store.status().await?;

		if status.access_token_valid {
			self.gate_metrics.record_fast_path();

			return Ok(GatePass::Token(status.access_token().to_owned()));
		}
		if !status.logged_in {
			return Err(Error::LoggedOut);
		}

		// The first caller may race application start-up; park here until the
		// host registers its exchange. The lock stays held so a sibling
		// context cannot slip in an exchange of the same token meanwhile.
		let exchange = self.slot.wait().await;

		self.gate_metrics.record_exchange();

		let logout = LogoutHandle::default();
		let outcome = exchange.exchange(status.refresh_token(), &logout).await;

		match RefreshVerdict::classify(outcome, &logout) {
			RefreshVerdict::Exchanged(tokens) => {
				self.store.save_status(&tokens).await?;
				self.emit_status().await?;

				Ok(GatePass::Retry)
			},
			RefreshVerdict::Denied => {
				self.store.clear_status().await?;
				self.emit_status().await?;

				Err(Error::LoggedOut)
			},
			RefreshVerdict::Failed(source) => Err(Error::RefreshFailed { source }),
		}
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::sync::atomic::AtomicU64;
	// self
	use super::*;
	use crate::{
		lock::ProcessLockBackend,
		refresh::{ExchangeFuture, RefreshExchange},
		session::Tokens,
		store::MemoryBackend,
	};

	#[derive(Debug, ThisError)]
	#[error("exchange unavailable")]
	struct Unavailable;

	struct CountingExchange {
		invocations: AtomicU64,
		next: Mutex<Option<Tokens>>,
		deny: bool,
	}
	impl CountingExchange {
		fn succeeding(tokens: Tokens) -> Self {
			Self { invocations: AtomicU64::new(0), next: Mutex::new(Some(tokens)), deny: false }
		}

		fn denying() -> Self {
			Self { invocations: AtomicU64::new(0), next: Mutex::new(None), deny: true }
		}

		fn failing() -> Self {
			Self { invocations: AtomicU64::new(0), next: Mutex::new(None), deny: false }
		}

		fn invocations(&self) -> u64 {
			self.invocations.load(Ordering::SeqCst)
		}
	}
	impl RefreshExchange for CountingExchange {
		fn exchange<'a>(
			&'a self,
			_refresh_token: &'a str,
			logout: &'a LogoutHandle,
		) -> ExchangeFuture<'a> {
			Box::pin(async move {
				self.invocations.fetch_add(1, Ordering::SeqCst);

				if self.deny {
					logout.signal();

					return Err(Box::new(Unavailable) as BoxError);
				}

				match self.next.lock().take() {
					Some(tokens) => Ok(tokens),
					None => Err(Box::new(Unavailable) as BoxError),
				}
			})
		}
	}

	fn coordinator() -> Coordinator {
		Coordinator::new(
			Arc::new(MemoryBackend::default()),
			Arc::new(ProcessLockBackend::default()),
		)
	}

	fn epoch() -> i64 {
		OffsetDateTime::now_utc().unix_timestamp()
	}

	#[tokio::test]
	async fn valid_token_takes_the_fast_path() {
		let coordinator = coordinator();
		let exchange = Arc::new(CountingExchange::failing());

		coordinator.set_refresh_exchange(exchange.clone());
		coordinator
			.set_status(Tokens::new("A1", epoch() + 3_600, "R1", epoch() + 86_400))
			.await
			.expect("Seeding status should succeed.");

		let token = coordinator.access_token().await.expect("Fast path should succeed.");

		assert_eq!(token, "A1");
		assert_eq!(exchange.invocations(), 0);
		assert_eq!(coordinator.gate_metrics.fast_path_hits(), 1);
	}

	#[tokio::test]
	async fn expired_access_token_is_refreshed_once() {
		let coordinator = coordinator();
		let exchange = Arc::new(CountingExchange::succeeding(Tokens::new(
			"A2",
			epoch() + 3_600,
			"R1",
			epoch() + 86_400,
		)));

		coordinator.set_refresh_exchange(exchange.clone());
		coordinator
			.set_status(Tokens::new("A1", epoch() + 3, "R1", epoch() + 86_400))
			.await
			.expect("Seeding status should succeed.");

		let token = coordinator.access_token().await.expect("Refresh path should succeed.");

		assert_eq!(token, "A2");
		assert_eq!(exchange.invocations(), 1);
	}

	#[tokio::test]
	async fn logged_out_session_fails_without_an_exchange() {
		let coordinator = coordinator();
		let exchange = Arc::new(CountingExchange::failing());

		coordinator.set_refresh_exchange(exchange.clone());

		let result = coordinator.access_token().await;

		assert!(matches!(result, Err(Error::LoggedOut)));
		assert_eq!(exchange.invocations(), 0);
	}

	#[tokio::test]
	async fn denial_clears_the_session() {
		let coordinator = coordinator();
		let exchange = Arc::new(CountingExchange::denying());

		coordinator.set_refresh_exchange(exchange.clone());
		coordinator
			.set_status(Tokens::new("", 0, "R1", epoch() + 86_400))
			.await
			.expect("Seeding status should succeed.");

		let result = coordinator.access_token().await;

		assert!(matches!(result, Err(Error::LoggedOut)));

		let status = coordinator.status().await.expect("Reading status should succeed.");

		assert!(!status.logged_in);
		assert_eq!(exchange.invocations(), 1);
	}

	#[tokio::test]
	async fn transient_failure_preserves_the_session() {
		let coordinator = coordinator();
		let exchange = Arc::new(CountingExchange::failing());

		coordinator.set_refresh_exchange(exchange.clone());
		coordinator
			.set_status(Tokens::new("", 0, "R1", epoch() + 86_400))
			.await
			.expect("Seeding status should succeed.");

		let result = coordinator.access_token().await;

		assert!(matches!(result, Err(Error::RefreshFailed { .. })));

		let status = coordinator.status().await.expect("Reading status should succeed.");

		assert!(status.logged_in);
	}
}
