//! Credential-caching gateway for IBM watsonx.ai deployments: mints IBM Cloud IAM bearer
//! tokens on demand, reuses them until they near expiry, and relays `POST /ask` payloads to a
//! single upstream deployment with the token attached.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod forwarder;
pub mod issuer;
pub mod obs;
pub mod server;
pub mod store;
#[doc(hidden)]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests.

	pub use crate::{_prelude::*, clock::Clock};

	// std
	use std::time::Duration as StdDuration;
	// self
	use crate::{
		auth::ApiKey,
		cache::CredentialCache,
		clock::ManualClock,
		forwarder::Forwarder,
		issuer::TokenIssuer,
	};

	/// API key used by every test fixture.
	pub const TEST_API_KEY: &str = "test-api-key";
	/// Deployment identifier used by every test fixture.
	pub const TEST_DEPLOYMENT_ID: &str = "deployment-under-test";

	/// Builds a reqwest client with a short timeout so failing tests never hang.
	pub fn test_reqwest_client() -> ReqwestClient {
		test_reqwest_client_with_timeout(StdDuration::from_secs(5))
	}

	/// Builds a reqwest client that gives up after `timeout`.
	pub fn test_reqwest_client_with_timeout(timeout: StdDuration) -> ReqwestClient {
		ReqwestClient::builder()
			.timeout(timeout)
			.build()
			.expect("Failed to build Reqwest client for tests.")
	}

	/// Returns a manual clock pinned to a fixed, readable instant.
	pub fn test_clock() -> ManualClock {
		ManualClock::new(time::macros::datetime!(2025-06-01 12:00 UTC))
	}

	/// Constructs a [`TokenIssuer`] that talks to `token_url` with the fixture API key.
	pub fn build_test_issuer(token_url: &str) -> TokenIssuer {
		let endpoint = Url::parse(token_url).expect("Mock token endpoint should parse.");

		TokenIssuer::new(endpoint, ApiKey::new(TEST_API_KEY), test_reqwest_client())
	}

	/// Constructs an empty [`CredentialCache`] driven by `clock`.
	pub fn build_test_cache(token_url: &str, clock: &ManualClock) -> CredentialCache {
		let clock: Arc<dyn Clock> = Arc::new(clock.clone());

		CredentialCache::new(build_test_issuer(token_url), clock)
	}

	/// Constructs a [`Forwarder`] targeting `upstream_base` for the fixture deployment.
	pub fn build_test_forwarder(cache: Arc<CredentialCache>, upstream_base: &str) -> Forwarder {
		let base = Url::parse(upstream_base).expect("Mock upstream base should parse.");

		Forwarder::for_deployment(cache, &base, TEST_DEPLOYMENT_ID, test_reqwest_client())
			.expect("Fixture deployment should yield a valid upstream URL.")
	}
}

mod _prelude {
	pub use std::{
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		sync::Arc,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError, StatusCode};
	pub use serde::{Deserialize, Serialize};
	pub use serde_json::Value;
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

pub use reqwest;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _};
