//! Credential caching with a single-flight refresh guard.
//!
//! [`CredentialCache::get_token`] hands out the cached bearer token while it is outside the
//! 60-second safety margin and only contacts the issuer once the token is missing or stale.
//! The freshness check runs twice: once on a cheap read lock, and again after the caller has
//! taken the async single-flight guard. Concurrent callers that observe a stale token therefore
//! queue behind a single in-flight refresh and pick up its result instead of stampeding the
//! token endpoint.
//!
//! A token the upstream refused can be reported through [`CredentialCache::refresh_rejected`].
//! Reports for a token that has already been replaced are answered with the replacement, so a
//! burst of refusals for one token costs a single issuer call.

// std
use std::sync::atomic::{AtomicU64, Ordering};
// self
use crate::{
	_prelude::*,
	auth::{BearerToken, Credential},
	clock::Clock,
	error::CredentialAcquisitionError,
	issuer::TokenIssuer,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	store::CredentialStore,
};

/// Process-wide owner of the current bearer token.
pub struct CredentialCache {
	issuer: TokenIssuer,
	clock: Arc<dyn Clock>,
	store: Option<Arc<dyn CredentialStore>>,
	current: RwLock<Option<Credential>>,
	refresh_guard: AsyncMutex<()>,
	metrics: RefreshMetrics,
}
impl CredentialCache {
	/// Creates an empty cache that mints tokens through `issuer`.
	pub fn new(issuer: TokenIssuer, clock: Arc<dyn Clock>) -> Self {
		Self {
			issuer,
			clock,
			store: None,
			current: RwLock::new(None),
			refresh_guard: AsyncMutex::new(()),
			metrics: RefreshMetrics::default(),
		}
	}

	/// Pre-seeds the cache, typically with a token carried over from a previous run.
	///
	/// A seed that is already inside the safety margin is kept but never handed out; the first
	/// caller replaces it through a refresh.
	pub fn with_seed(self, seed: Option<Credential>) -> Self {
		*self.current.write() = seed;

		self
	}

	/// Persists every refreshed credential to `store`.
	pub fn with_store(mut self, store: Arc<dyn CredentialStore>) -> Self {
		self.store = Some(store);

		self
	}

	/// Returns a usable bearer token, refreshing it first when needed.
	pub async fn get_token(&self) -> Result<BearerToken, CredentialAcquisitionError> {
		if let Some(token) = self.usable_token() {
			return Ok(token);
		}

		self.refresh(Reuse::IfUsable).await
	}

	/// Replaces `rejected` unless another caller already did.
	///
	/// When the cached token differs from `rejected` and is still usable it is returned as-is;
	/// otherwise a new token is minted.
	pub async fn refresh_rejected(
		&self,
		rejected: &BearerToken,
	) -> Result<BearerToken, CredentialAcquisitionError> {
		self.refresh(Reuse::UnlessRejected(rejected)).await
	}

	/// Mints a new token even if the cached one still looks usable.
	///
	/// The call still queues behind any in-flight refresh, so forced refreshes never overlap.
	pub async fn force_refresh(&self) -> Result<BearerToken, CredentialAcquisitionError> {
		self.refresh(Reuse::Never).await
	}

	/// Copy of the cached credential, usable or not.
	pub fn snapshot(&self) -> Option<Credential> {
		self.current.read().clone()
	}

	/// Counters for issuer calls made by this cache.
	pub fn metrics(&self) -> &RefreshMetrics {
		&self.metrics
	}

	fn usable_token(&self) -> Option<BearerToken> {
		let now = self.clock.now();

		self.current
			.read()
			.as_ref()
			.filter(|credential| credential.is_usable_at(now))
			.map(|credential| credential.token.clone())
	}

	async fn refresh(&self, reuse: Reuse<'_>) -> Result<BearerToken, CredentialAcquisitionError> {
		const KIND: FlowKind = FlowKind::Refresh;

		let _singleflight = self.refresh_guard.lock().await;

		if let Some(token) = self.usable_token().filter(|token| reuse.accepts(token)) {
			self.metrics.coalesced.fetch_add(1, Ordering::Relaxed);

			return Ok(token);
		}

		let span = FlowSpan::new(KIND, "refresh");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async move {
				#[cfg(feature = "tracing")]
				tracing::info!(
					issuer = %self.issuer.endpoint(),
					api_key = %self.issuer.api_key().fingerprint(),
					"requesting a new bearer token"
				);

				let credential = self.issuer.exchange(self.clock.as_ref()).await?;

				*self.current.write() = Some(credential.clone());

				#[cfg(feature = "tracing")]
				tracing::info!(
					expires_at = %credential.expires_at,
					lifetime_secs = (credential.expires_at - self.clock.now()).whole_seconds(),
					"bearer token refreshed"
				);

				self.persist(&credential).await;

				Ok::<_, CredentialAcquisitionError>(credential.token)
			})
			.await;

		match &result {
			Ok(_) => {
				self.metrics.issued.fetch_add(1, Ordering::Relaxed);
				obs::record_flow_outcome(KIND, FlowOutcome::Success);
			},
			Err(_e) => {
				#[cfg(feature = "tracing")]
				tracing::warn!(error = %_e, "bearer token refresh failed");

				self.metrics.failed.fetch_add(1, Ordering::Relaxed);
				obs::record_flow_outcome(KIND, FlowOutcome::Failure);
			},
		}

		result
	}

	async fn persist(&self, credential: &Credential) {
		let Some(store) = &self.store else {
			return;
		};

		if let Err(_e) = store.save(credential.clone()).await {
			#[cfg(feature = "tracing")]
			tracing::warn!(error = %_e, "failed to persist refreshed bearer token");
		}
	}
}
impl Debug for CredentialCache {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("CredentialCache")
			.field("issuer", &self.issuer)
			.field("current", &*self.current.read())
			.field("store_set", &self.store.is_some())
			.field("metrics", &self.metrics)
			.finish()
	}
}

/// Issuer traffic counters for one [`CredentialCache`].
#[derive(Debug, Default)]
pub struct RefreshMetrics {
	issued: AtomicU64,
	failed: AtomicU64,
	coalesced: AtomicU64,
}
impl RefreshMetrics {
	/// Issuer calls made, successful or not.
	pub fn attempts(&self) -> u64 {
		self.successes() + self.failures()
	}

	/// Issuer calls that produced a credential.
	pub fn successes(&self) -> u64 {
		self.issued.load(Ordering::Relaxed)
	}

	/// Issuer calls that failed.
	pub fn failures(&self) -> u64 {
		self.failed.load(Ordering::Relaxed)
	}

	/// Callers that waited on the refresh guard and then reused the token another caller minted.
	pub fn coalesced(&self) -> u64 {
		self.coalesced.load(Ordering::Relaxed)
	}
}

/// Which cached token a caller holding the refresh guard may take instead of minting.
#[derive(Clone, Copy)]
enum Reuse<'a> {
	IfUsable,
	UnlessRejected(&'a BearerToken),
	Never,
}
impl Reuse<'_> {
	fn accepts(self, cached: &BearerToken) -> bool {
		match self {
			Reuse::IfUsable => true,
			Reuse::UnlessRejected(rejected) => cached != rejected,
			Reuse::Never => false,
		}
	}
}
