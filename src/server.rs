//! Axum HTTP surface.
//!
//! Exposes `POST /ask` (the forwarded operation) and `GET /health` (liveness). All request
//! semantics live in [`Forwarder`]; this module only adapts bytes in and [`Reply`] out.

// crates.io
use axum::{
	Json, Router,
	body::Bytes,
	extract::State,
	response::{IntoResponse, Response},
	routing::{get, post},
};
use tokio::net::TcpListener;
// self
use crate::{
	_prelude::*,
	auth::Credential,
	cache::CredentialCache,
	clock::{Clock, SystemClock},
	config::GatewayConfig,
	forwarder::{Forwarder, Reply, ReplyBody},
	issuer::TokenIssuer,
	store::{CredentialStore, FileStore},
};

/// State shared across all handlers.
#[derive(Clone, Debug)]
pub struct AppState {
	forwarder: Arc<Forwarder>,
}
impl AppState {
	/// Wraps a forwarder for use as router state.
	pub fn new(forwarder: Arc<Forwarder>) -> Self {
		Self { forwarder }
	}
}

/// Builds the gateway router.
pub fn router(forwarder: Arc<Forwarder>) -> Router {
	Router::new()
		.route("/ask", post(ask))
		.route("/health", get(health))
		.with_state(AppState::new(forwarder))
}

/// Assembles the credential cache and forwarder described by `config`.
///
/// When a token cache file is configured, its credential competes with the environment seed
/// and the one expiring later wins.
pub async fn build_forwarder(config: &GatewayConfig) -> Result<Forwarder> {
	let clock: Arc<dyn Clock> = Arc::new(SystemClock);
	let issuer =
		TokenIssuer::new(config.token_url.clone(), config.api_key.clone(), config.issuer_client()?);
	let mut seed = config.seed.clone();
	let mut store: Option<Arc<dyn CredentialStore>> = None;

	if let Some(path) = &config.token_cache {
		let file_store = FileStore::open(path)?;

		match file_store.load().await {
			Ok(persisted) => seed = latest(seed, persisted),
			Err(_e) => {
				#[cfg(feature = "tracing")]
				tracing::warn!(
					error = %_e,
					path = %path.display(),
					"ignoring unreadable token cache"
				);
			},
		}

		store = Some(Arc::new(file_store));
	}

	#[cfg(feature = "tracing")]
	tracing::info!(
		api_key = %config.api_key.fingerprint(),
		deployment = %config.deployment_id,
		seeded = seed.as_ref().is_some_and(|credential| credential.is_usable_at(clock.now())),
		"credential cache configured"
	);

	let mut cache = CredentialCache::new(issuer, clock).with_seed(seed);

	if let Some(store) = store {
		cache = cache.with_store(store);
	}

	Ok(Forwarder::new(Arc::new(cache), config.upstream_url.clone(), config.upstream_client()?)
		.with_refresh_on_unauthorized(config.refresh_on_unauthorized))
}

/// Serves `app` on `listener` until Ctrl-C.
pub async fn serve(listener: TcpListener, app: Router) -> Result<()> {
	#[cfg(feature = "tracing")]
	if let Ok(addr) = listener.local_addr() {
		tracing::info!(address = %addr, "gateway listening");
	}

	axum::serve(listener, app)
		.with_graceful_shutdown(shutdown_signal())
		.await
		.map_err(|source| Error::Server { source })
}

/// Binds `config.listen` and serves the gateway on it.
pub async fn run(config: GatewayConfig) -> Result<()> {
	let forwarder = build_forwarder(&config).await?;
	let listener =
		TcpListener::bind(config.listen).await.map_err(|source| Error::Server { source })?;

	serve(listener, router(Arc::new(forwarder))).await
}

async fn ask(State(state): State<AppState>, body: Bytes) -> Reply {
	state.forwarder.handle(&body).await
}

async fn health(State(state): State<AppState>) -> Json<Value> {
	let cached = state.forwarder.credentials().snapshot().is_some();

	Json(serde_json::json!({ "status": "ok", "credential_cached": cached }))
}

async fn shutdown_signal() {
	if tokio::signal::ctrl_c().await.is_err() {
		// Without a signal handler the server runs until the process is killed.
		std::future::pending::<()>().await;
	}

	#[cfg(feature = "tracing")]
	tracing::info!("shutdown signal received");
}

fn latest(a: Option<Credential>, b: Option<Credential>) -> Option<Credential> {
	match (a, b) {
		(Some(a), Some(b)) => Some(if b.expires_at > a.expires_at { b } else { a }),
		(a, b) => a.or(b),
	}
}

impl IntoResponse for Reply {
	fn into_response(self) -> Response {
		match self.body {
			ReplyBody::Json(value) => (self.status, Json(value)).into_response(),
			ReplyBody::Text(text) => (self.status, text).into_response(),
			ReplyBody::Binary(raw) => (self.status, raw).into_response(),
		}
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;
	use crate::auth::BearerToken;

	fn credential(token: &str, expires_at: OffsetDateTime) -> Credential {
		Credential::new(BearerToken::new(token), expires_at)
	}

	#[test]
	fn latest_prefers_the_later_expiry() {
		let early = credential("early", macros::datetime!(2025-01-01 00:00 UTC));
		let late = credential("late", macros::datetime!(2025-01-01 01:00 UTC));

		assert_eq!(latest(Some(early.clone()), Some(late.clone())), Some(late.clone()));
		assert_eq!(latest(Some(late.clone()), Some(early.clone())), Some(late));
		assert_eq!(latest(None, Some(early.clone())), Some(early));
		assert_eq!(latest(None, None), None);
	}

	#[test]
	fn text_replies_keep_status_and_content_type() {
		let reply = Reply {
			status: StatusCode::SERVICE_UNAVAILABLE,
			body: ReplyBody::Text("service unavailable".into()),
		};
		let response = reply.into_response();

		assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
		assert_eq!(
			response.headers().get(axum::http::header::CONTENT_TYPE).map(|v| v.as_bytes()),
			Some(&b"text/plain; charset=utf-8"[..])
		);
	}

	#[test]
	fn binary_replies_are_octet_streams() {
		let reply = Reply {
			status: StatusCode::BAD_GATEWAY,
			body: ReplyBody::Binary(Bytes::from_static(&[0xff, 0x00])),
		};
		let response = reply.into_response();

		assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
		assert_eq!(
			response.headers().get(axum::http::header::CONTENT_TYPE).map(|v| v.as_bytes()),
			Some(&b"application/octet-stream"[..])
		);
	}

	#[test]
	fn json_replies_are_tagged_as_json() {
		let reply = Reply { status: StatusCode::OK, body: ReplyBody::Json(serde_json::json!([])) };
		let response = reply.into_response();

		assert_eq!(response.status(), StatusCode::OK);
		assert_eq!(
			response.headers().get(axum::http::header::CONTENT_TYPE).map(|v| v.as_bytes()),
			Some(&b"application/json"[..])
		);
	}
}
