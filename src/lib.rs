//! Cross-context session coordinator - serve cached access tokens fast, serialize refresh-token
//! exchanges to at-most-once per cycle, and keep every tab of an origin on the same session.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod broadcast;
pub mod coordinator;
pub mod error;
pub mod hub;
pub mod lock;
pub mod obs;
pub mod refresh;
pub mod reload;
#[cfg(feature = "scheduler")]
pub mod scheduler;
pub mod session;
pub mod store;
#[cfg(any(test, feature = "test"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests; enabled via `cfg(test)` or the
	//! `test` crate feature.

	pub use crate::_prelude::*;

	// self
	use crate::{
		coordinator::Coordinator, lock::ProcessLockBackend, session::Tokens, store::MemoryBackend,
	};

	/// Shared backends simulating one origin's storage plus its lock table.
	pub fn shared_origin() -> (Arc<MemoryBackend>, Arc<ProcessLockBackend>) {
		(Arc::new(MemoryBackend::default()), Arc::new(ProcessLockBackend::default()))
	}

	/// Builds one simulated context wired to the shared origin backends.
	pub fn build_context(
		storage: &Arc<MemoryBackend>,
		locks: &Arc<ProcessLockBackend>,
	) -> Coordinator {
		Coordinator::new(storage.clone(), locks.clone())
	}

	/// Token fixture valid for an hour (access) and a day (refresh) from now.
	pub fn fresh_tokens(access: &str, refresh: &str) -> Tokens {
		let epoch = OffsetDateTime::now_utc().unix_timestamp();

		Tokens::new(access, epoch + 3_600, refresh, epoch + 86_400)
	}
}

mod _prelude {
	pub use std::{
		any::Any,
		collections::HashMap,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		sync::{
			Arc,
			atomic::{AtomicBool, Ordering},
		},
	};

	pub use async_lock::{Mutex as AsyncMutex, OnceCell};
	pub use parking_lot::{Mutex, RwLock};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};

	pub use crate::{
		error::{BoxError, Error, Result},
		session::TokenSecret,
	};
}

#[cfg(test)] use color_eyre as _;
