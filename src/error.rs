//! Coordinator-level error types shared across the gate, stores, and locks.

// self
use crate::_prelude::*;

/// Coordinator-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Boxed source error carried by transient refresh failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical coordinator error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Storage-layer failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Cross-context lock failure.
	#[error(transparent)]
	Lock(#[from] crate::lock::LockError),

	/// No valid session exists, or the refresh was explicitly denied.
	///
	/// Terminal: the persisted status has been cleared by the time this is
	/// returned. Callers must send the user back through login.
	#[error("Session is logged out.")]
	LoggedOut,
	/// The refresh exchange failed for a reason other than denial.
	///
	/// The session is preserved and the host's original error is carried
	/// unchanged as the source; retry policy belongs to the host.
	#[error("Refresh exchange failed; the session is preserved.")]
	RefreshFailed {
		/// Host-supplied exchange failure.
		#[source]
		source: BoxError,
	},
}
impl Error {
	/// Wraps a host exchange failure without reclassifying it.
	pub fn refresh_failed(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::RefreshFailed { source: Box::new(src) }
	}

	/// Returns `true` for failures that preserve the session and may be retried by the host.
	pub fn is_transient(&self) -> bool {
		matches!(self, Self::RefreshFailed { .. })
	}
}
