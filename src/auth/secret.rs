//! Redacting wrappers for the IBM Cloud API key and the bearer tokens minted from it.

// crates.io
use sha2::{Digest, Sha256};
// self
use crate::_prelude::*;

macro_rules! def_secret {
	($name:ident, $doc:literal) => {
		#[doc = $doc]
		#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
		pub struct $name(String);
		impl $name {
			/// Wraps a new secret string.
			pub fn new(value: impl Into<String>) -> Self {
				Self(value.into())
			}

			/// Returns the inner value. Callers must avoid logging this string.
			pub fn expose(&self) -> &str {
				&self.0
			}

			/// Returns `true` when the wrapped value is empty or whitespace.
			pub fn is_blank(&self) -> bool {
				self.0.trim().is_empty()
			}
		}
		impl AsRef<str> for $name {
			fn as_ref(&self) -> &str {
				self.expose()
			}
		}
		impl Debug for $name {
			fn fmt(&self, f: &mut Formatter) -> FmtResult {
				f.debug_tuple(stringify!($name)).field(&"<redacted>").finish()
			}
		}
		impl Display for $name {
			fn fmt(&self, f: &mut Formatter) -> FmtResult {
				f.write_str("<redacted>")
			}
		}
	};
}

def_secret!(ApiKey, "Long-lived IBM Cloud API key exchanged for bearer tokens.");
def_secret!(BearerToken, "Short-lived bearer token presented to the upstream endpoint.");

impl ApiKey {
	/// Short SHA-256 prefix identifying the key in logs without revealing it.
	pub fn fingerprint(&self) -> String {
		let digest = Sha256::digest(self.0.as_bytes());

		digest.iter().take(6).map(|byte| format!("{byte:02x}")).collect()
	}
}
