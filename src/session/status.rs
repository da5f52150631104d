//! Token lifetimes and the derived status record shared by every context.

// self
use crate::_prelude::*;

/// Minimum remaining lifetime for a token to count as usable.
///
/// A token whose remaining TTL equals this value exactly is still valid; one
/// second less is not. Tokens closer to expiry than this are treated as
/// already dead so a request issued "now" cannot arrive with an expired
/// credential.
pub const MIN_TTL: Duration = Duration::seconds(5);

/// Raw token material produced by the host after login or a refresh exchange.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tokens {
	/// Short-lived credential authorizing resource requests.
	#[serde(default)]
	pub access_token: TokenSecret,
	/// Access token expiry as Unix epoch seconds.
	#[serde(default)]
	pub access_token_exp: i64,
	/// Single-use credential exchanged for a new token pair.
	#[serde(default)]
	pub refresh_token: TokenSecret,
	/// Refresh token expiry as Unix epoch seconds.
	#[serde(default)]
	pub refresh_token_exp: i64,
}
impl Tokens {
	/// Creates a token pair from raw credential strings and epoch expiries.
	pub fn new(
		access_token: impl Into<String>,
		access_token_exp: i64,
		refresh_token: impl Into<String>,
		refresh_token_exp: i64,
	) -> Self {
		Self {
			access_token: TokenSecret::new(access_token),
			access_token_exp,
			refresh_token: TokenSecret::new(refresh_token),
			refresh_token_exp,
		}
	}

	/// Remaining whole seconds until the access token expires, floored at zero.
	pub fn access_ttl_at(&self, instant: OffsetDateTime) -> i64 {
		remaining_seconds(self.access_token_exp, instant)
	}

	/// Remaining whole seconds until the refresh token expires, floored at zero.
	pub fn refresh_ttl_at(&self, instant: OffsetDateTime) -> i64 {
		remaining_seconds(self.refresh_token_exp, instant)
	}
}

/// Remaining whole seconds until `exp`, floored at zero.
fn remaining_seconds(exp: i64, instant: OffsetDateTime) -> i64 {
	(exp - instant.unix_timestamp()).max(0)
}

/// The shared status record: raw tokens plus validity flags derived on read.
///
/// The flags are never trusted from storage. Every read recomputes them from
/// the raw expiry timestamps and the clock, so the passage of time between a
/// write and a read is always reflected.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Status {
	/// Raw token material, with the access token blanked when it is no longer valid.
	pub tokens: Tokens,
	/// `true` while a refresh token with at least [`MIN_TTL`] of life remains.
	pub logged_in: bool,
	/// `true` while the access token is non-empty with at least [`MIN_TTL`] of life.
	pub access_token_valid: bool,
}
impl Status {
	/// Derives validity flags for the provided tokens at an explicit instant.
	///
	/// Invariant: the returned record never carries a stale-but-present access
	/// token string; an invalid access token is replaced with the empty secret.
	pub fn derive_at(tokens: Tokens, instant: OffsetDateTime) -> Self {
		let access_token_valid =
			!tokens.access_token.is_empty() && tokens.access_ttl_at(instant) >= MIN_TTL.whole_seconds();
		let logged_in = !tokens.refresh_token.is_empty()
			&& tokens.refresh_ttl_at(instant) >= MIN_TTL.whole_seconds();
		let tokens = if access_token_valid {
			tokens
		} else {
			Tokens { access_token: TokenSecret::default(), ..tokens }
		};

		Self { tokens, logged_in, access_token_valid }
	}

	/// Derives validity flags using the current UTC clock.
	pub fn derive_now(tokens: Tokens) -> Self {
		Self::derive_at(tokens, OffsetDateTime::now_utc())
	}

	/// The canonical logged-out record.
	pub fn logged_out() -> Self {
		Self { tokens: Tokens::default(), logged_in: false, access_token_valid: false }
	}

	/// Returns the access token value. Callers must avoid logging this string.
	pub fn access_token(&self) -> &str {
		self.tokens.access_token.expose()
	}

	/// Returns the refresh token value. Callers must avoid logging this string.
	pub fn refresh_token(&self) -> &str {
		self.tokens.refresh_token.expose()
	}
}
