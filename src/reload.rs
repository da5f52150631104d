//! Cosmetic peer-reload helper reacting to login/logout transitions.
//!
//! Purely cosmetic: omitting both halves changes nothing about refresh
//! correctness. The publishing half watches the coordinator's `logged_in`
//! flag and announces flips; the peer half reacts to an announcement by
//! invoking whatever "reload this context" means for the host.

// self
use crate::{
	_prelude::*,
	broadcast::{BroadcastBackend, PeerMessage},
	coordinator::Coordinator,
};

/// Publishes a [`PeerMessage::Reload`] whenever the logged-in flag flips.
///
/// The initial status delivered on subscribe only seeds the baseline; a
/// message goes out starting with the first actual transition, in either
/// direction. Publish failures are swallowed - peers that miss the message
/// merely keep their current view.
pub async fn announce_login_transitions(
	coordinator: &Coordinator,
	broadcast: Arc<dyn BroadcastBackend>,
) -> Result<()> {
	let baseline: Mutex<Option<bool>> = Mutex::new(None);

	coordinator
		.subscribe_status_updates(move |status| {
			let mut seen = baseline.lock();

			match *seen {
				None => *seen = Some(status.logged_in),
				Some(previous) if previous != status.logged_in => {
					*seen = Some(status.logged_in);

					let _ = broadcast.publish(&PeerMessage::Reload);
				},
				Some(_) => {},
			}
		})
		.await
}

/// Installs the peer-side handler that reloads this context on demand.
pub fn install_reload_handler(
	broadcast: &dyn BroadcastBackend,
	action: impl Fn() + Send + Sync + 'static,
) {
	let action = Arc::new(action);

	broadcast.on_message(Arc::new(move |message| {
		if matches!(message, PeerMessage::Reload) {
			action();
		}
	}));
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::{
		broadcast::MemoryBroadcast, lock::ProcessLockBackend, session::Tokens,
		store::MemoryBackend,
	};

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
	async fn reload_fires_once_per_flip_and_never_on_subscribe() {
		let hub = MemoryBroadcast::default();
		let publisher = hub.handle();
		let peer = hub.handle();
		let reloads = Arc::new(Mutex::new(0_u32));
		let coordinator = coordinator();

		{
			let count = reloads.clone();

			install_reload_handler(&peer, move || *count.lock() += 1);
		}

		announce_login_transitions(&coordinator, Arc::new(publisher))
			.await
			.expect("Installing the announcer should succeed.");

		assert_eq!(*reloads.lock(), 0);

		coordinator.set_status(fresh_tokens()).await.expect("Login should succeed.");

		assert_eq!(*reloads.lock(), 1);

		// A second login while already logged in is not a transition.
		coordinator.set_status(fresh_tokens()).await.expect("Re-login should succeed.");

		assert_eq!(*reloads.lock(), 1);

		coordinator.set_logged_out().await.expect("Logout should succeed.");

		assert_eq!(*reloads.lock(), 2);
	}

	#[tokio::test]
	async fn non_reload_messages_are_ignored() {
		let hub = MemoryBroadcast::default();
		let publisher = hub.handle();
		let peer = hub.handle();
		let reloads = Arc::new(Mutex::new(0_u32));

		{
			let count = reloads.clone();

			install_reload_handler(&peer, move || *count.lock() += 1);
		}

		publisher.publish(&PeerMessage::StatusChanged).expect("Publishing should succeed.");

		assert_eq!(*reloads.lock(), 0);
	}
}
