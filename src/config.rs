//! Process configuration.
//!
//! [`GatewayArgs`] is parsed from CLI flags with environment fallbacks and validated into a
//! [`GatewayConfig`] once at startup. Handlers never read the environment.
//!
//! | Flag | Env | Default |
//! |------|-----|---------|
//! | `--api-key` | `API_KEY` | required |
//! | `--deployment-id` | `DEPLOYMENT_ID` | required |
//! | `--access-token` | `ACCESS_TOKEN` | none |
//! | `--token-expiry` | `TOKEN_EXPIRY` | none |
//! | `--listen` | `GATEWAY_LISTEN` | `127.0.0.1:8000` |
//! | `--token-url` | `IAM_TOKEN_URL` | `https://iam.cloud.ibm.com/identity/token` |
//! | `--upstream-base-url` | `WATSONX_BASE_URL` | `https://us-south.ml.cloud.ibm.com` |
//! | `--issuer-timeout-secs` | `ISSUER_TIMEOUT_SECS` | `30` |
//! | `--upstream-timeout-secs` | `UPSTREAM_TIMEOUT_SECS` | `120` |
//! | `--token-cache` | `TOKEN_CACHE_PATH` | none |
//! | `--refresh-on-unauthorized` | `REFRESH_ON_UNAUTHORIZED` | `false` |

// std
use std::{net::SocketAddr, path::PathBuf, time::Duration as StdDuration};
// crates.io
use clap::Parser;
// self
use crate::{
	_prelude::*,
	auth::{ApiKey, BearerToken, Credential},
	error::ConfigError,
	forwarder::{self, DEFAULT_UPSTREAM_BASE_URL},
	issuer::IAM_TOKEN_URL,
};

/// Credential-caching gateway for a watsonx.ai deployment.
#[derive(Clone, Parser)]
#[command(name = "iam-gateway", version, about)]
pub struct GatewayArgs {
	/// IBM Cloud API key exchanged for bearer tokens.
	#[arg(long, env = "API_KEY", hide_env_values = true)]
	pub api_key: String,

	/// watsonx.ai deployment identifier requests are forwarded to.
	#[arg(long, env = "DEPLOYMENT_ID")]
	pub deployment_id: String,

	/// Bearer token to seed the cache with, skipping the first refresh while it is valid.
	#[arg(long, env = "ACCESS_TOKEN", hide_env_values = true)]
	pub access_token: Option<String>,

	/// Expiry of the seeded token in unix seconds; unparseable values read as expired.
	#[arg(long, env = "TOKEN_EXPIRY")]
	pub token_expiry: Option<String>,

	/// Address the HTTP server binds to.
	#[arg(long, env = "GATEWAY_LISTEN", default_value = "127.0.0.1:8000")]
	pub listen: SocketAddr,

	/// Token endpoint the API key is exchanged at.
	#[arg(long, env = "IAM_TOKEN_URL", default_value = IAM_TOKEN_URL)]
	pub token_url: String,

	/// Regional host of the upstream inference service.
	#[arg(long, env = "WATSONX_BASE_URL", default_value = DEFAULT_UPSTREAM_BASE_URL)]
	pub upstream_base_url: String,

	/// Timeout for token requests, in seconds.
	#[arg(long, env = "ISSUER_TIMEOUT_SECS", default_value_t = 30)]
	pub issuer_timeout_secs: u64,

	/// Timeout for upstream requests, in seconds.
	#[arg(long, env = "UPSTREAM_TIMEOUT_SECS", default_value_t = 120)]
	pub upstream_timeout_secs: u64,

	/// JSON file the latest credential is persisted to and reloaded from.
	#[arg(long, env = "TOKEN_CACHE_PATH")]
	pub token_cache: Option<PathBuf>,

	/// Replace the cached token after upstream rejects it with 401.
	#[arg(long, env = "REFRESH_ON_UNAUTHORIZED")]
	pub refresh_on_unauthorized: bool,
}
impl GatewayArgs {
	/// Validates the raw arguments.
	pub fn into_config(self) -> Result<GatewayConfig, ConfigError> {
		let api_key = ApiKey::new(self.api_key);

		if api_key.is_blank() {
			return Err(ConfigError::Empty { name: "API key" });
		}

		let token_url = parse_url("token", &self.token_url)?;
		let upstream_base_url = parse_url("upstream base", &self.upstream_base_url)?;
		let upstream_url = forwarder::upstream_url(&upstream_base_url, &self.deployment_id)?;
		let seed = seed_credential(self.access_token, self.token_expiry.as_deref());

		Ok(GatewayConfig {
			api_key,
			deployment_id: self.deployment_id.trim().to_owned(),
			seed,
			listen: self.listen,
			token_url,
			upstream_url,
			issuer_timeout: timeout("issuer", self.issuer_timeout_secs)?,
			upstream_timeout: timeout("upstream", self.upstream_timeout_secs)?,
			token_cache: self.token_cache,
			refresh_on_unauthorized: self.refresh_on_unauthorized,
		})
	}
}
impl Debug for GatewayArgs {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("GatewayArgs")
			.field("api_key", &"<redacted>")
			.field("deployment_id", &self.deployment_id)
			.field("access_token_set", &self.access_token.is_some())
			.field("token_expiry", &self.token_expiry)
			.field("listen", &self.listen)
			.field("token_url", &self.token_url)
			.field("upstream_base_url", &self.upstream_base_url)
			.field("issuer_timeout_secs", &self.issuer_timeout_secs)
			.field("upstream_timeout_secs", &self.upstream_timeout_secs)
			.field("token_cache", &self.token_cache)
			.field("refresh_on_unauthorized", &self.refresh_on_unauthorized)
			.finish()
	}
}

/// Validated gateway configuration.
#[derive(Clone, Debug)]
pub struct GatewayConfig {
	/// Static API key.
	pub api_key: ApiKey,
	/// Deployment identifier.
	pub deployment_id: String,
	/// Credential seeded from the environment, if any.
	pub seed: Option<Credential>,
	/// Bind address.
	pub listen: SocketAddr,
	/// Token endpoint.
	pub token_url: Url,
	/// Fully built upstream URL, including the version query.
	pub upstream_url: Url,
	/// Token request timeout.
	pub issuer_timeout: StdDuration,
	/// Upstream request timeout.
	pub upstream_timeout: StdDuration,
	/// Optional credential snapshot file.
	pub token_cache: Option<PathBuf>,
	/// Whether an upstream 401 replaces the cached token.
	pub refresh_on_unauthorized: bool,
}
impl GatewayConfig {
	/// HTTP client used for token requests.
	///
	/// Token endpoints answer directly, so redirects are not followed.
	pub fn issuer_client(&self) -> Result<ReqwestClient, ConfigError> {
		Ok(ReqwestClient::builder()
			.timeout(self.issuer_timeout)
			.redirect(reqwest::redirect::Policy::none())
			.build()?)
	}

	/// HTTP client used for upstream requests.
	pub fn upstream_client(&self) -> Result<ReqwestClient, ConfigError> {
		Ok(ReqwestClient::builder().timeout(self.upstream_timeout).build()?)
	}
}

fn parse_url(name: &'static str, raw: &str) -> Result<Url, ConfigError> {
	Url::parse(raw.trim()).map_err(|source| ConfigError::InvalidUrl { name, source })
}

fn timeout(name: &'static str, secs: u64) -> Result<StdDuration, ConfigError> {
	if secs == 0 {
		return Err(ConfigError::ZeroTimeout { name });
	}

	Ok(StdDuration::from_secs(secs))
}

fn seed_credential(token: Option<String>, expiry: Option<&str>) -> Option<Credential> {
	let token = BearerToken::new(token?);

	if token.is_blank() {
		return None;
	}

	let expiry_secs = expiry.and_then(|raw| raw.trim().parse::<f64>().ok()).unwrap_or(0.);

	Some(Credential::from_unix_expiry(token, expiry_secs))
}
