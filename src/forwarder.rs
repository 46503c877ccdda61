//! Single-operation forwarding to the watsonx.ai deployment endpoint.
//!
//! A request moves through [`ForwardStage`]s in a fixed order: a token is obtained first, the
//! payload is validated second, and only then is upstream contacted. Either early failure
//! short-circuits, so no upstream traffic is spent on requests that cannot succeed. Upstream
//! answers (including non-2xx ones) are relayed with their original status; the gateway only
//! speaks for itself when the failure is its own.

// crates.io
use axum::body::Bytes;
// self
use crate::{
	_prelude::*,
	auth::BearerToken,
	cache::CredentialCache,
	error::{ConfigError, InvalidPayloadError, UpstreamResponseError, UpstreamTransportError},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
};

/// Default watsonx.ai regional host.
pub const DEFAULT_UPSTREAM_BASE_URL: &str = "https://us-south.ml.cloud.ibm.com";
/// API version pinned on every upstream call.
pub const API_VERSION: &str = "2021-05-01";

/// Builds `<base>/ml/v4/deployments/<deployment_id>/ai_service?version=<API_VERSION>`.
pub fn upstream_url(base: &Url, deployment_id: &str) -> Result<Url, ConfigError> {
	let deployment_id = deployment_id.trim();

	if deployment_id.is_empty() {
		return Err(ConfigError::Empty { name: "deployment id" });
	}

	let mut url = base.clone();

	url.path_segments_mut()
		.map_err(|_| ConfigError::CannotBeBase { name: "upstream base" })?
		.pop_if_empty()
		.extend(["ml", "v4", "deployments", deployment_id, "ai_service"]);
	url.set_fragment(None);
	url.query_pairs_mut().clear().append_pair("version", API_VERSION);

	Ok(url)
}

/// Parses an inbound body and checks that it is a JSON object carrying `messages`.
///
/// The `messages` value itself is not inspected; the payload is forwarded unchanged.
pub fn validate_payload(raw: &[u8]) -> Result<Value, InvalidPayloadError> {
	if raw.iter().all(u8::is_ascii_whitespace) {
		return Err(InvalidPayloadError::Empty);
	}

	let payload: Value = serde_json::from_slice(raw)
		.map_err(|source| InvalidPayloadError::Malformed { source })?;

	match &payload {
		Value::Object(fields) if fields.contains_key("messages") => Ok(payload),
		Value::Object(_) => Err(InvalidPayloadError::MissingMessages),
		_ => Err(InvalidPayloadError::NotAnObject),
	}
}

/// Per-request forwarding states.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ForwardStage {
	/// Request accepted by the gateway.
	Start,
	/// Bearer token obtained.
	TokenAcquired,
	/// Payload validated.
	Validated,
	/// Upstream call issued.
	UpstreamCalled,
	/// Upstream answer relayed to the caller.
	Relayed,
	/// Terminal: no token could be obtained.
	RejectedNoToken,
	/// Terminal: payload failed validation.
	RejectedBadPayload,
}
impl ForwardStage {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			ForwardStage::Start => "start",
			ForwardStage::TokenAcquired => "token_acquired",
			ForwardStage::Validated => "validated",
			ForwardStage::UpstreamCalled => "upstream_called",
			ForwardStage::Relayed => "relayed",
			ForwardStage::RejectedNoToken => "rejected_no_token",
			ForwardStage::RejectedBadPayload => "rejected_bad_payload",
		}
	}
}
impl Display for ForwardStage {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Body relayed to the caller.
#[derive(Clone, Debug, PartialEq)]
pub enum ReplyBody {
	/// Body that parsed as JSON.
	Json(Value),
	/// UTF-8 body that did not parse as JSON, kept verbatim.
	Text(String),
	/// Body that is neither JSON nor UTF-8, kept byte for byte.
	Binary(Bytes),
}
impl ReplyBody {
	/// Classifies a raw upstream body without decoding or re-encoding it.
	pub fn from_bytes(raw: Bytes) -> Self {
		if let Ok(value) = serde_json::from_slice(&raw) {
			return Self::Json(value);
		}

		match std::str::from_utf8(&raw) {
			Ok(text) => Self::Text(text.to_owned()),
			Err(_) => Self::Binary(raw),
		}
	}

	/// Gateway-authored error body: `{"error": <message>}`.
	pub fn error(message: impl Into<String>) -> Self {
		Self::Json(serde_json::json!({ "error": message.into() }))
	}
}

/// Status + body pair returned by upstream.
#[derive(Clone, Debug, PartialEq)]
pub struct UpstreamResponse {
	/// Status code returned by upstream.
	pub status: StatusCode,
	/// Body returned by upstream.
	pub body: ReplyBody,
}
impl UpstreamResponse {
	/// Returns `true` for 2xx answers.
	pub fn is_success(&self) -> bool {
		self.status.is_success()
	}

	/// Splits non-2xx answers into [`UpstreamResponseError`] for callers that branch on them.
	pub fn into_result(self) -> Result<Self, UpstreamResponseError> {
		if self.is_success() {
			Ok(self)
		} else {
			Err(UpstreamResponseError { status: self.status, body: self.body })
		}
	}
}

/// What the gateway sends back for one inbound request.
#[derive(Clone, Debug, PartialEq)]
pub struct Reply {
	/// Response status.
	pub status: StatusCode,
	/// Response body.
	pub body: ReplyBody,
}
impl Reply {
	/// Maps a gateway error to the reply the caller receives.
	pub fn from_error(err: &Error) -> Self {
		let body = match err {
			Error::InvalidPayload(_) => ReplyBody::error(InvalidPayloadError::REJECTION),
			Error::UpstreamResponse(e) => e.body.clone(),
			_ => ReplyBody::error(err.to_string()),
		};

		Self { status: err.status(), body }
	}
}
impl From<UpstreamResponse> for Reply {
	fn from(response: UpstreamResponse) -> Self {
		Self { status: response.status, body: response.body }
	}
}

/// Validates, authenticates, and relays requests to one fixed upstream URL.
#[derive(Debug)]
pub struct Forwarder {
	credentials: Arc<CredentialCache>,
	http: ReqwestClient,
	endpoint: Url,
	refresh_on_unauthorized: bool,
}
impl Forwarder {
	/// Creates a forwarder posting to `endpoint` verbatim.
	pub fn new(credentials: Arc<CredentialCache>, endpoint: Url, http: ReqwestClient) -> Self {
		Self { credentials, http, endpoint, refresh_on_unauthorized: false }
	}

	/// Creates a forwarder for `deployment_id` under `base`; see [`upstream_url`].
	pub fn for_deployment(
		credentials: Arc<CredentialCache>,
		base: &Url,
		deployment_id: &str,
		http: ReqwestClient,
	) -> Result<Self, ConfigError> {
		Ok(Self::new(credentials, upstream_url(base, deployment_id)?, http))
	}

	/// On an upstream 401, replace the rejected token before relaying; see
	/// [`CredentialCache::refresh_rejected`].
	pub fn with_refresh_on_unauthorized(mut self, enabled: bool) -> Self {
		self.refresh_on_unauthorized = enabled;

		self
	}

	/// Upstream URL every request is posted to.
	pub fn endpoint(&self) -> &Url {
		&self.endpoint
	}

	/// Credential cache backing this forwarder.
	pub fn credentials(&self) -> &Arc<CredentialCache> {
		&self.credentials
	}

	/// Runs the full forwarding protocol for one inbound body.
	pub async fn handle(&self, raw_body: &[u8]) -> Reply {
		const KIND: FlowKind = FlowKind::Forward;

		let span = FlowSpan::new(KIND, "handle");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let (stage, result) = span.instrument(self.process(raw_body)).await;

		obs::record_forward_stage(stage);

		match result {
			Ok(response) => {
				obs::record_flow_outcome(KIND, FlowOutcome::Success);

				response.into()
			},
			Err(e) => {
				#[cfg(feature = "tracing")]
				tracing::warn!(stage = stage.as_str(), error = %e, "request rejected");

				obs::record_flow_outcome(KIND, FlowOutcome::Failure);

				Reply::from_error(&e)
			},
		}
	}

	/// Posts `payload` to upstream with `token` attached; no validation, no retries.
	pub async fn forward(
		&self,
		token: &BearerToken,
		payload: &Value,
	) -> Result<UpstreamResponse, UpstreamTransportError> {
		let response = self
			.http
			.post(self.endpoint.clone())
			.bearer_auth(token.expose())
			.json(payload)
			.send()
			.await?;
		let status = response.status();
		let raw = response.bytes().await?;

		Ok(UpstreamResponse { status, body: ReplyBody::from_bytes(raw) })
	}

	async fn process(&self, raw_body: &[u8]) -> (ForwardStage, Result<UpstreamResponse>) {
		let mut stage = ForwardStage::Start;

		obs::trace_stage(stage);

		let token = match self.credentials.get_token().await {
			Ok(token) => token,
			Err(e) => return (ForwardStage::RejectedNoToken, Err(e.into())),
		};

		advance(&mut stage, ForwardStage::TokenAcquired);

		let payload = match validate_payload(raw_body) {
			Ok(payload) => payload,
			Err(e) => return (ForwardStage::RejectedBadPayload, Err(e.into())),
		};

		advance(&mut stage, ForwardStage::Validated);
		advance(&mut stage, ForwardStage::UpstreamCalled);

		let response = match self.forward(&token, &payload).await {
			Ok(response) => response,
			Err(e) => return (stage, Err(e.into())),
		};

		if self.refresh_on_unauthorized && response.status == StatusCode::UNAUTHORIZED {
			// A failed refresh leaves the rejected token cached; the next request retries it.
			if let Err(_e) = self.credentials.refresh_rejected(&token).await {
				#[cfg(feature = "tracing")]
				tracing::warn!(error = %_e, "refresh after upstream 401 failed");
			}
		}

		advance(&mut stage, ForwardStage::Relayed);

		(stage, Ok(response))
	}
}

fn advance(stage: &mut ForwardStage, next: ForwardStage) {
	*stage = next;

	obs::trace_stage(next);
}
