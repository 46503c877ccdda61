//! The cached bearer token and the expiry instant it is valid until.

// self
use crate::{_prelude::*, auth::BearerToken};

/// Buffer subtracted from a credential's expiry before it stops being handed out.
pub const SAFETY_MARGIN: Duration = Duration::seconds(60);

/// Bearer token paired with its absolute expiry.
///
/// The two fields only ever change together: the cache swaps whole `Credential` values and
/// never edits one in place.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
	/// Bearer token secret; callers must avoid logging it.
	pub token: BearerToken,
	/// Instant the issuer stops honoring the token.
	#[serde(with = "time::serde::timestamp")]
	pub expires_at: OffsetDateTime,
}
impl Credential {
	/// Pairs a token with an absolute expiry.
	pub fn new(token: BearerToken, expires_at: OffsetDateTime) -> Self {
		Self { token, expires_at }
	}

	/// Builds a credential from a token and a unix-seconds expiry (fractions allowed).
	///
	/// Values outside the representable range collapse to the unix epoch, which reads as
	/// already expired.
	pub fn from_unix_expiry(token: BearerToken, expiry_secs: f64) -> Self {
		let expires_at = if expiry_secs.is_finite() {
			OffsetDateTime::from_unix_timestamp_nanos((expiry_secs * 1e9) as i128)
				.unwrap_or(OffsetDateTime::UNIX_EPOCH)
		} else {
			OffsetDateTime::UNIX_EPOCH
		};

		Self::new(token, expires_at)
	}

	/// Last instant (exclusive) at which the token may still be handed out.
	pub fn usable_until(&self) -> OffsetDateTime {
		self.expires_at.checked_sub(SAFETY_MARGIN).unwrap_or(self.expires_at)
	}

	/// Returns `true` if the token is still outside the safety margin at `instant`.
	pub fn is_usable_at(&self, instant: OffsetDateTime) -> bool {
		!self.token.is_blank() && instant < self.usable_until()
	}
}
impl Debug for Credential {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Credential")
			.field("token", &"<redacted>")
			.field("expires_at", &self.expires_at)
			.finish()
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;

	fn credential(expires_at: OffsetDateTime) -> Credential {
		Credential::new(BearerToken::new("T"), expires_at)
	}

	#[test]
	fn safety_margin_bounds_usability() {
		let issued = macros::datetime!(2025-01-01 00:00 UTC);
		let record = credential(issued + Duration::seconds(3600));

		assert!(record.is_usable_at(issued));
		assert!(record.is_usable_at(issued + Duration::seconds(3539)));
		assert!(!record.is_usable_at(issued + Duration::seconds(3540)));
		assert!(!record.is_usable_at(issued + Duration::seconds(3600)));
	}

	#[test]
	fn blank_tokens_are_never_usable() {
		let now = macros::datetime!(2025-01-01 00:00 UTC);
		let record = Credential::new(BearerToken::new(""), now + Duration::hours(1));

		assert!(!record.is_usable_at(now));
	}

	#[test]
	fn unix_expiry_accepts_fractions_and_rejects_garbage() {
		let record = Credential::from_unix_expiry(BearerToken::new("T"), 1_735_689_600.5);

		assert_eq!(record.expires_at.unix_timestamp(), 1_735_689_600);
		assert_eq!(record.expires_at.millisecond(), 500);

		let broken = Credential::from_unix_expiry(BearerToken::new("T"), f64::NAN);

		assert_eq!(broken.expires_at, OffsetDateTime::UNIX_EPOCH);
	}

	#[test]
	fn persisted_form_uses_unix_seconds() {
		let record = credential(macros::datetime!(2025-01-01 00:00 UTC));
		let json = serde_json::to_value(&record).expect("Credential should serialize.");

		assert_eq!(json, serde_json::json!({ "token": "T", "expires_at": 1_735_689_600 }));

		let back: Credential =
			serde_json::from_value(json).expect("Persisted credential should deserialize.");

		assert_eq!(back, record);
		assert!(!format!("{back:?}").contains("\"T\""));
	}
}
