//! Pluggable refresh exchange contract and outcome classification.

// self
use crate::{_prelude::*, session::Tokens};

/// Boxed future returned by [`RefreshExchange::exchange`].
pub type ExchangeFuture<'a> = Pin<Box<dyn Future<Output = Result<Tokens, BoxError>> + 'a + Send>>;

/// Host-supplied network exchange turning a refresh token into a new pair.
///
/// The gate invokes this at most once per guarded section, always under the
/// cross-context lock, so a given refresh token is exchanged by at most one
/// holder per cycle. Implementations signal `logout` when the provider
/// explicitly denied the refresh (typically an authorization-denied
/// response); every other failure is treated as transient and preserved for
/// the caller.
pub trait RefreshExchange
where
	Self: Send + Sync,
{
	/// Exchanges `refresh_token` for a fresh token pair.
	fn exchange<'a>(&'a self, refresh_token: &'a str, logout: &'a LogoutHandle)
	-> ExchangeFuture<'a>;
}

/// Handle the exchange uses to classify its failure as an explicit denial.
#[derive(Debug, Default)]
pub struct LogoutHandle(AtomicBool);
impl LogoutHandle {
	/// Marks the in-flight exchange as an authorization denial.
	pub fn signal(&self) {
		self.0.store(true, Ordering::SeqCst);
	}

	/// Returns `true` once the exchange has signaled a denial.
	pub fn is_signaled(&self) -> bool {
		self.0.load(Ordering::SeqCst)
	}
}

/// Single decision value the gate consumes after an exchange attempt.
#[derive(Debug)]
pub(crate) enum RefreshVerdict {
	/// The provider issued a fresh token pair.
	Exchanged(Tokens),
	/// The provider explicitly denied the refresh; the session is over.
	Denied,
	/// The exchange failed for some other reason; the session is preserved.
	Failed(BoxError),
}
impl RefreshVerdict {
	/// Collapses the exchange result and the logout handle into one verdict.
	///
	/// A signaled handle wins over everything else, including a nominally
	/// successful return value.
	pub(crate) fn classify(result: Result<Tokens, BoxError>, logout: &LogoutHandle) -> Self {
		if logout.is_signaled() {
			return Self::Denied;
		}

		match result {
			Ok(tokens) => Self::Exchanged(tokens),
			Err(source) => Self::Failed(source),
		}
	}
}

/// Registration slot that parks refresh attempts until an exchange exists.
///
/// The first caller of [`access_token`](crate::coordinator::Coordinator::access_token)
/// may race application start-up; instead of failing, the gate waits here
/// until the host registers its exchange.
#[derive(Default)]
pub(crate) struct ExchangeSlot(OnceCell<Arc<dyn RefreshExchange>>);
impl ExchangeSlot {
	/// Registers the exchange. The first registration wins; later calls are
	/// no-ops returning `false`.
	pub(crate) fn register(&self, exchange: Arc<dyn RefreshExchange>) -> bool {
		self.0.set_blocking(exchange).is_ok()
	}

	/// Returns the registered exchange, suspending until registration occurs.
	pub(crate) async fn wait(&self) -> Arc<dyn RefreshExchange> {
		self.0.wait().await.clone()
	}

	/// Returns `true` once an exchange has been registered.
	pub(crate) fn is_registered(&self) -> bool {
		self.0.is_initialized()
	}
}
impl Debug for ExchangeSlot {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ExchangeSlot").field("registered", &self.is_registered()).finish()
	}
}
