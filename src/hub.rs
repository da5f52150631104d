//! In-process listener registry delivering status snapshots to subscribers.

// self
use crate::{_prelude::*, session::Status};

/// Shared status listener invoked on subscribe and after every mutation.
pub type StatusListener = Arc<dyn Fn(&Status) + Send + Sync>;

/// Registry of status listeners local to one context.
///
/// Listeners are delivered in registration order, and the snapshot handed to
/// them is always a fresh read performed by the caller, never a copy closed
/// over at mutation time.
#[derive(Default)]
pub struct SubscriptionHub {
	listeners: Mutex<Vec<StatusListener>>,
}
impl SubscriptionHub {
	/// Registers a listener, then delivers `current` to it immediately so
	/// subscribers never special-case "no status yet."
	pub fn subscribe(&self, listener: impl Fn(&Status) + Send + Sync + 'static, current: &Status) {
		let listener: StatusListener = Arc::new(listener);

		self.listeners.lock().push(listener.clone());
		listener(current);
	}

	/// Delivers `status` to every listener in registration order.
	///
	/// The registry lock is not held across listener invocations, so a
	/// listener may itself subscribe without deadlocking.
	pub fn notify(&self, status: &Status) {
		let snapshot: Vec<StatusListener> = self.listeners.lock().clone();

		for listener in snapshot {
			listener(status);
		}
	}

	/// Returns the number of registered listeners.
	pub fn len(&self) -> usize {
		self.listeners.lock().len()
	}

	/// Returns `true` when no listener is registered.
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}
impl Debug for SubscriptionHub {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SubscriptionHub").field("listeners", &self.len()).finish()
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn subscribe_delivers_the_current_status_once() {
		let hub = SubscriptionHub::default();
		let seen = Arc::new(Mutex::new(Vec::new()));
		let sink = seen.clone();

		hub.subscribe(move |status| sink.lock().push(status.logged_in), &Status::logged_out());

		assert_eq!(*seen.lock(), vec![false]);
	}

	#[test]
	fn notify_preserves_registration_order() {
		let hub = SubscriptionHub::default();
		let order = Arc::new(Mutex::new(Vec::new()));

		for tag in ["first", "second", "third"] {
			let order = order.clone();

			hub.subscribe(move |_| order.lock().push(tag), &Status::logged_out());
		}

		order.lock().clear();
		hub.notify(&Status::logged_out());

		assert_eq!(*order.lock(), vec!["first", "second", "third"]);
	}

	#[test]
	fn a_listener_may_subscribe_reentrantly() {
		let hub = Arc::new(SubscriptionHub::default());
		let reentrant = hub.clone();
		let fired = Arc::new(Mutex::new(0_u32));
		let count = fired.clone();

		hub.subscribe(
			move |_| {
				let count = count.clone();

				reentrant.subscribe(move |_| *count.lock() += 1, &Status::logged_out());
			},
			&Status::logged_out(),
		);

		assert_eq!(hub.len(), 2);
	}
}
