//! In-process [`CredentialStore`] for tests and embedders that persist elsewhere.

// self
use crate::{
	_prelude::*,
	auth::Credential,
	store::{CredentialStore, StoreFuture},
};

/// Thread-safe store that keeps the credential in memory and counts writes.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
	slot: Arc<RwLock<Option<Credential>>>,
	saves: Arc<Mutex<u64>>,
}
impl MemoryStore {
	/// Returns the stored credential without going through the async contract.
	pub fn current(&self) -> Option<Credential> {
		self.slot.read().clone()
	}

	/// Number of successful [`CredentialStore::save`] calls.
	pub fn save_count(&self) -> u64 {
		*self.saves.lock()
	}
}
impl CredentialStore for MemoryStore {
	fn load(&self) -> StoreFuture<'_, Option<Credential>> {
		let slot = self.slot.clone();

		Box::pin(async move { Ok(slot.read().clone()) })
	}

	fn save(&self, credential: Credential) -> StoreFuture<'_, ()> {
		let slot = self.slot.clone();
		let saves = self.saves.clone();

		Box::pin(async move {
			*slot.write() = Some(credential);
			*saves.lock() += 1;

			Ok(())
		})
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;
	use crate::auth::BearerToken;

	#[tokio::test]
	async fn save_replaces_and_counts() {
		let store = MemoryStore::default();
		let expires_at = macros::datetime!(2025-01-01 01:00 UTC);

		assert!(store.load().await.expect("Empty load should succeed.").is_none());

		store
			.save(Credential::new(BearerToken::new("first"), expires_at))
			.await
			.expect("First save should succeed.");
		store
			.save(Credential::new(BearerToken::new("second"), expires_at))
			.await
			.expect("Second save should succeed.");

		let loaded = store.load().await.expect("Load should succeed.").expect("Value expected.");

		assert_eq!(loaded.token.expose(), "second");
		assert_eq!(store.save_count(), 2);
	}
}
