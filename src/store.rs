//! Persistence contract and built-in stores for the cached credential.
//!
//! Without a store the gateway starts cold and mints a token on its first request. With one,
//! the last minted credential survives restarts and is reused while it is still usable.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

// self
use crate::{_prelude::*, auth::Credential};

/// Boxed future returned by [`CredentialStore`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Storage backend contract implemented by credential stores.
pub trait CredentialStore
where
	Self: Send + Sync,
{
	/// Returns the persisted credential, if any.
	fn load(&self) -> StoreFuture<'_, Option<Credential>>;

	/// Persists or replaces the credential.
	fn save(&self, credential: Credential) -> StoreFuture<'_, ()>;
}

/// Error type produced by [`CredentialStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failures surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}
