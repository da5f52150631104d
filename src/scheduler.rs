//! Optional leader scheduler that refreshes the session ahead of expiry.
//!
//! One elected context (the holder of a dedicated long-held lock) watches the
//! access token's remaining lifetime and performs an out-of-band exchange a
//! fixed margin before expiry, so no request ever has to wait on a lazy
//! refresh. Everything goes through the coordinator's public surface
//! (`status`/`set_status`/`set_logged_out`/`emit_status`), and the exchange
//! itself runs under the same gate lock as the lazy path, so leadership is a
//! liveness optimization only - a context that never becomes leader still
//! refreshes correctly through [`Coordinator::access_token`].

// std
use std::time::Duration as StdDuration;
// crates.io
use tokio::{sync::Notify, task::JoinHandle, time::Instant};
// self
use crate::{
	_prelude::*,
	broadcast::{BroadcastBackend, PeerMessage},
	coordinator::Coordinator,
	lock::LockBackend,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	refresh::{LogoutHandle, RefreshExchange, RefreshVerdict},
	session::Status,
};

/// Single-shot timers cap out near 2^31 - 1 ms on some platforms; longer
/// waits sleep in chunks until the cumulative elapsed time reaches the target.
const MAX_SLEEP_CHUNK: StdDuration = StdDuration::from_millis(i32::MAX as u64);
/// Delay before re-evaluating after a failed proactive attempt.
const RETRY_DELAY: StdDuration = StdDuration::from_secs(5);
/// Re-evaluation horizon while logged out; a status change restarts sooner.
const IDLE_DELAY: StdDuration = StdDuration::from_secs(3_600);

/// Proactive refresh scheduler layered on the coordinator's public surface.
pub struct LeaderScheduler {
	coordinator: Arc<Coordinator>,
	exchange: Arc<dyn RefreshExchange>,
	broadcast: Arc<dyn BroadcastBackend>,
	lock: Arc<dyn LockBackend>,
	election_name: String,
	margin: Duration,
	timer: RestartableTimer,
}
impl LeaderScheduler {
	const DEFAULT_MARGIN: Duration = Duration::seconds(60);

	/// Creates a scheduler for one context, wired to the same backends as its
	/// coordinator.
	pub fn new(
		coordinator: Arc<Coordinator>,
		exchange: Arc<dyn RefreshExchange>,
		broadcast: Arc<dyn BroadcastBackend>,
		lock: Arc<dyn LockBackend>,
	) -> Self {
		let election_name = format!("{}.leader", coordinator.store.key());

		Self {
			coordinator,
			exchange,
			broadcast,
			lock,
			election_name,
			margin: Self::DEFAULT_MARGIN,
			timer: RestartableTimer::default(),
		}
	}

	/// Overrides how far ahead of expiry the leader refreshes (defaults to 60 seconds).
	pub fn with_margin(mut self, margin: Duration) -> Self {
		self.margin = if margin.is_negative() { Duration::ZERO } else { margin };

		self
	}

	/// Wires up peer handling and spawns the scheduler task.
	///
	/// Must be called inside a Tokio runtime. The returned handle can be
	/// aborted to simulate this context terminating; a surviving peer then
	/// inherits leadership through the election lock's fair queue.
	pub async fn start(self: Arc<Self>) -> Result<JoinHandle<()>> {
		// Peer side: a broadcast status change re-notifies local subscribers
		// and reschedules this context's timer.
		{
			let scheduler = self.clone();

			self.broadcast.on_message(Arc::new(move |message| {
				if matches!(message, PeerMessage::StatusChanged) {
					scheduler.timer.restart();

					let coordinator = scheduler.coordinator.clone();

					tokio::spawn(async move {
						let _ = coordinator.emit_status().await;
					});
				}
			}));
		}

		// Local side: any observed change reschedules the timer and is
		// announced to peers. Announcing only on a changed value bounds the
		// relay: a peer that merely re-emitted an already-seen status stays
		// silent.
		{
			let scheduler = self.clone();
			let baseline: Mutex<Option<Status>> = Mutex::new(None);

			self.coordinator
				.subscribe_status_updates(move |status| {
					scheduler.timer.restart();

					let mut seen = baseline.lock();

					match &*seen {
						None => *seen = Some(status.clone()),
						Some(previous) if previous != status => {
							*seen = Some(status.clone());

							let _ = scheduler.broadcast.publish(&PeerMessage::StatusChanged);
						},
						Some(_) => {},
					}
				})
				.await?;
		}

		let scheduler = self.clone();

		Ok(tokio::spawn(async move { scheduler.run().await }))
	}

	async fn run(self: Arc<Self>) {
		// Leadership is acquisition of a dedicated long-held lock; fair
		// queuing hands it to a surviving peer when the holder terminates.
		let _leadership = match self.lock.acquire(&self.election_name).await {
			Ok(guard) => guard,
			Err(_) => return,
		};
		let mut pending_retry = None;

		loop {
			let delay = match pending_retry.take() {
				Some(delay) => delay,
				None => self.next_delay().await,
			};

			if matches!(self.timer.sleep(delay).await, TimerWake::Restarted) {
				continue;
			}

			pending_retry = self.tick().await;
		}
	}

	/// Time until the access token enters the refresh margin.
	async fn next_delay(&self) -> StdDuration {
		match self.coordinator.status().await {
			Ok(status) if status.logged_in => {
				let remaining = status.tokens.access_ttl_at(OffsetDateTime::now_utc());
				// Bounded so a garbage far-future expiry cannot overflow the
				// sleep deadline; the timer restarts on any status change.
				let lead = (remaining - self.margin.whole_seconds()).min(i64::from(u32::MAX));

				if lead <= 0 { StdDuration::ZERO } else { StdDuration::from_secs(lead as u64) }
			},
			Ok(_) => IDLE_DELAY,
			Err(_) => RETRY_DELAY,
		}
	}

	/// Runs one proactive attempt; returns a retry delay on failure.
	async fn tick(&self) -> Option<StdDuration> {
		const KIND: FlowKind = FlowKind::ProactiveRefresh;

		// Same gate lock as the lazy path: the refresh token is exchanged by
		// at most one holder per cycle no matter which strategy fires first.
		let _guard = match self.lock.acquire(&self.coordinator.lock_name).await {
			Ok(guard) => guard,
			Err(_) => return Some(RETRY_DELAY),
		};
		let status = match self.coordinator.status().await {
			Ok(status) => status,
			Err(_) => return Some(RETRY_DELAY),
		};

		if !status.logged_in {
			return None;
		}

		let remaining = status.tokens.access_ttl_at(OffsetDateTime::now_utc());

		if Duration::seconds(remaining) > self.margin {
			// A sibling already refreshed while we queued on the lock.
			return None;
		}

		let span = FlowSpan::new(KIND, "tick");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async {
				let logout = LogoutHandle::default();
				let outcome = self.exchange.exchange(status.refresh_token(), &logout).await;

				match RefreshVerdict::classify(outcome, &logout) {
					RefreshVerdict::Exchanged(tokens) => {
						self.coordinator.set_status(tokens).await?;

						Ok(())
					},
					RefreshVerdict::Denied => {
						self.coordinator.set_logged_out().await?;

						Err(Error::LoggedOut)
					},
					RefreshVerdict::Failed(source) => Err(Error::RefreshFailed { source }),
				}
			})
			.await;

		match result {
			Ok(()) => {
				obs::record_flow_outcome(KIND, FlowOutcome::Success);

				None
			},
			Err(e) => {
				obs::record_flow_outcome(KIND, FlowOutcome::Failure);

				// A denial parks the scheduler until the next login; anything
				// else re-evaluates shortly.
				if matches!(e, Error::LoggedOut) { None } else { Some(RETRY_DELAY) }
			},
		}
	}
}
impl Debug for LeaderScheduler {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("LeaderScheduler")
			.field("election_name", &self.election_name)
			.field("margin", &self.margin)
			.finish()
	}
}

/// Wake reason reported by [`RestartableTimer::sleep`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TimerWake {
	/// The full target duration elapsed.
	Elapsed,
	/// [`RestartableTimer::restart`] fired; the caller should recompute its delay.
	Restarted,
}

/// Chunked, restartable sleep.
#[derive(Debug, Default)]
struct RestartableTimer {
	notify: Notify,
}
impl RestartableTimer {
	/// Interrupts an in-flight [`sleep`](Self::sleep); a restart with no
	/// sleeper in flight is remembered and consumed by the next call.
	fn restart(&self) {
		self.notify.notify_one();
	}

	async fn sleep(&self, total: StdDuration) -> TimerWake {
		self.sleep_with_chunk(total, MAX_SLEEP_CHUNK).await
	}

	async fn sleep_with_chunk(&self, total: StdDuration, chunk: StdDuration) -> TimerWake {
		let deadline = Instant::now() + total;

		loop {
			let now = Instant::now();

			if now >= deadline {
				return TimerWake::Elapsed;
			}

			let step = (deadline - now).min(chunk);

			tokio::select! {
				_ = tokio::time::sleep(step) => {},
				_ = self.notify.notified() => return TimerWake::Restarted,
			}
		}
	}
}
