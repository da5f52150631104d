//! Cross-context broadcast contracts and the in-process hub implementation.

// self
use crate::_prelude::*;

/// Shared handler invoked for every message published by a peer context.
pub type MessageHandler = Arc<dyn Fn(&PeerMessage) + Send + Sync>;

/// Cross-context messaging contract (BroadcastChannel semantics).
///
/// Each context holds its own handle; a published message reaches every peer
/// handle of the same channel but never the publisher's own handlers.
/// Delivery is best-effort - correctness of the refresh path never depends
/// on a broadcast arriving.
pub trait BroadcastBackend
where
	Self: Send + Sync,
{
	/// Publishes a message to every peer context.
	fn publish(&self, message: &PeerMessage) -> Result<(), BroadcastError>;

	/// Registers a handler for messages published by peers.
	fn on_message(&self, handler: MessageHandler);
}

/// Error type produced by [`BroadcastBackend`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum BroadcastError {
	/// Backend-level failure while publishing.
	#[error("Broadcast backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}

/// Message exchanged between peer contexts.
///
/// The wire form is schema-tagged JSON; peers ignore kinds they do not know
/// so newer contexts can publish alongside older ones.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PeerMessage {
	/// The shared status record changed; peers should re-read and reschedule.
	///
	/// Carries no payload: the persisted record is the single source of
	/// truth, so a missed or reordered broadcast can never desynchronize a
	/// peer that re-reads.
	StatusChanged,
	/// A login/logout transition happened; peers should fully reload.
	Reload,
	/// A kind this version does not understand.
	#[serde(other)]
	Unknown,
}
impl PeerMessage {
	/// Serializes the message to its JSON wire form.
	pub fn to_wire(&self) -> Result<String, BroadcastError> {
		serde_json::to_string(self).map_err(|e| BroadcastError::Backend {
			message: format!("Failed to serialize peer message: {e}"),
		})
	}

	/// Parses the JSON wire form, mapping unparsable input to [`PeerMessage::Unknown`].
	pub fn from_wire(raw: &str) -> Self {
		serde_json::from_str(raw).unwrap_or(Self::Unknown)
	}
}

type PeerRegistry = Arc<RwLock<HashMap<u64, Vec<MessageHandler>>>>;

/// In-process broadcast channel for tests and single-process hosts.
///
/// Clone the hub freely; call [`MemoryBroadcast::handle`] once per simulated
/// context to get that context's [`BroadcastBackend`].
#[derive(Clone, Default)]
pub struct MemoryBroadcast {
	peers: PeerRegistry,
}
impl MemoryBroadcast {
	/// Registers a new context and returns its backend handle.
	pub fn handle(&self) -> MemoryBroadcastHandle {
		let id = rand::random::<u64>();

		self.peers.write().insert(id, Vec::new());

		MemoryBroadcastHandle { hub: self.clone(), id }
	}
}
impl Debug for MemoryBroadcast {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("MemoryBroadcast").field("peers", &self.peers.read().len()).finish()
	}
}

/// Per-context handle produced by [`MemoryBroadcast::handle`].
pub struct MemoryBroadcastHandle {
	hub: MemoryBroadcast,
	id: u64,
}
impl BroadcastBackend for MemoryBroadcastHandle {
	fn publish(&self, message: &PeerMessage) -> Result<(), BroadcastError> {
		// Round-trip through the wire form so the in-process hub exercises
		// the same codec as a real channel.
		let delivered = PeerMessage::from_wire(&message.to_wire()?);
		let handlers: Vec<MessageHandler> = self
			.hub
			.peers
			.read()
			.iter()
			.filter(|(peer, _)| **peer != self.id)
			.flat_map(|(_, handlers)| handlers.iter().cloned())
			.collect();

		for handler in handlers {
			handler(&delivered);
		}

		Ok(())
	}

	fn on_message(&self, handler: MessageHandler) {
		if let Some(handlers) = self.hub.peers.write().get_mut(&self.id) {
			handlers.push(handler);
		}
	}
}
impl Drop for MemoryBroadcastHandle {
	fn drop(&mut self) {
		self.hub.peers.write().remove(&self.id);
	}
}
impl Debug for MemoryBroadcastHandle {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("MemoryBroadcastHandle").field("id", &self.id).finish()
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn wire_round_trip_preserves_known_kinds() {
		let wire = PeerMessage::Reload.to_wire().expect("Serializing a message should succeed.");

		assert_eq!(PeerMessage::from_wire(&wire), PeerMessage::Reload);
	}

	#[test]
	fn unknown_kinds_parse_as_unknown() {
		assert_eq!(PeerMessage::from_wire(r#"{"kind":"hologram"}"#), PeerMessage::Unknown);
		assert_eq!(PeerMessage::from_wire("not json"), PeerMessage::Unknown);
	}

	#[test]
	fn publishers_do_not_hear_themselves() {
		let hub = MemoryBroadcast::default();
		let alice = hub.handle();
		let bob = hub.handle();
		let alice_heard = Arc::new(Mutex::new(0_u32));
		let bob_heard = Arc::new(Mutex::new(0_u32));

		{
			let count = alice_heard.clone();

			alice.on_message(Arc::new(move |_| *count.lock() += 1));
		}
		{
			let count = bob_heard.clone();

			bob.on_message(Arc::new(move |_| *count.lock() += 1));
		}

		alice.publish(&PeerMessage::StatusChanged).expect("Publishing should succeed.");

		assert_eq!(*alice_heard.lock(), 0);
		assert_eq!(*bob_heard.lock(), 1);
	}

	#[test]
	fn dropped_handles_stop_receiving() {
		let hub = MemoryBroadcast::default();
		let alice = hub.handle();
		let bob = hub.handle();
		let bob_heard = Arc::new(Mutex::new(0_u32));

		{
			let count = bob_heard.clone();

			bob.on_message(Arc::new(move |_| *count.lock() += 1));
		}

		drop(bob);
		alice.publish(&PeerMessage::Reload).expect("Publishing should succeed.");

		assert_eq!(*bob_heard.lock(), 0);
	}
}
