//! Gateway-level error types shared across the credential cache, forwarder, and server.

// self
use crate::_prelude::*;

/// Gateway-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical gateway error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Bearer token could not be obtained from the token issuer.
	#[error(transparent)]
	CredentialAcquisition(#[from] CredentialAcquisitionError),
	/// Inbound payload failed validation.
	#[error(transparent)]
	InvalidPayload(#[from] InvalidPayloadError),
	/// Upstream inference endpoint could not be reached.
	#[error(transparent)]
	UpstreamTransport(#[from] UpstreamTransportError),
	/// Upstream inference endpoint answered with a non-success status.
	#[error(transparent)]
	UpstreamResponse(#[from] UpstreamResponseError),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Credential persistence failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Listener could not be bound or the server loop failed.
	#[error("HTTP server failed: {source}.")]
	Server {
		/// Underlying IO failure.
		#[source]
		source: std::io::Error,
	},
}
impl Error {
	/// HTTP status the gateway answers with when this error ends a request.
	pub fn status(&self) -> StatusCode {
		match self {
			Self::InvalidPayload(_) => StatusCode::BAD_REQUEST,
			Self::UpstreamTransport(e) if e.is_timeout() => StatusCode::GATEWAY_TIMEOUT,
			Self::UpstreamTransport(_) => StatusCode::BAD_GATEWAY,
			Self::UpstreamResponse(e) => e.status,
			Self::CredentialAcquisition(_)
			| Self::Config(_)
			| Self::Storage(_)
			| Self::Server { .. } => StatusCode::INTERNAL_SERVER_ERROR,
		}
	}
}

/// Failures raised while exchanging the API key for a bearer token.
#[derive(Debug, ThisError)]
pub enum CredentialAcquisitionError {
	/// Issuer answered with a non-success status.
	#[error("Failed to get IBM Cloud access token: issuer returned status {status}: {body}")]
	Rejected {
		/// HTTP status code returned by the issuer.
		status: u16,
		/// Raw response body returned by the issuer.
		body: String,
	},
	/// Issuer did not answer within the configured timeout.
	#[error("Failed to get IBM Cloud access token: request to the issuer timed out.")]
	Timeout,
	/// Issuer could not be reached.
	#[error("Failed to get IBM Cloud access token: {source}")]
	Transport {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Issuer responded with a body that is not a valid token response.
	#[error("Failed to get IBM Cloud access token: issuer returned malformed JSON ({source}).")]
	MalformedResponse {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
		/// HTTP status code returned by the issuer.
		status: u16,
	},
	/// Issuer responded with an empty `access_token`.
	#[error("Failed to get IBM Cloud access token: issuer returned an empty access_token.")]
	EmptyAccessToken,
	/// Issuer responded with a non-positive `expires_in`.
	#[error("Failed to get IBM Cloud access token: expires_in must be positive, got {0}.")]
	NonPositiveExpiresIn(i64),
	/// Issuer responded with an `expires_in` that overflows the supported time range.
	#[error("Failed to get IBM Cloud access token: expires_in {0} exceeds the supported range.")]
	ExpiresInOutOfRange(i64),
}
impl CredentialAcquisitionError {
	/// Wraps a transport-specific network error.
	pub fn transport(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Transport { source: Box::new(src) }
	}

	/// HTTP status reported by the issuer, when one was received.
	pub fn issuer_status(&self) -> Option<u16> {
		match self {
			Self::Rejected { status, .. } | Self::MalformedResponse { status, .. } => Some(*status),
			_ => None,
		}
	}
}
impl From<ReqwestError> for CredentialAcquisitionError {
	fn from(e: ReqwestError) -> Self {
		if e.is_timeout() { Self::Timeout } else { Self::transport(e) }
	}
}

/// Reasons an inbound payload is refused before reaching upstream.
#[derive(Debug, ThisError)]
pub enum InvalidPayloadError {
	/// Request carried no body.
	#[error("Request body is empty.")]
	Empty,
	/// Request body is not JSON.
	#[error("Request body is not valid JSON: {source}.")]
	Malformed {
		/// Underlying JSON parsing failure.
		#[source]
		source: serde_json::Error,
	},
	/// Request body is JSON but not an object.
	#[error("Request body must be a JSON object.")]
	NotAnObject,
	/// Request body has no `messages` field.
	#[error("Request body is missing the `messages` field.")]
	MissingMessages,
}
impl InvalidPayloadError {
	/// Fixed message returned to callers for every validation failure.
	pub const REJECTION: &'static str =
		"Payload must include a 'messages' array with at least one message having role/content.";
}

/// Network failures while calling the upstream inference endpoint.
#[derive(Debug, ThisError)]
pub enum UpstreamTransportError {
	/// Upstream did not answer within the configured timeout.
	#[error("Request to the upstream inference endpoint timed out.")]
	Timeout,
	/// Upstream could not be reached or the response could not be read.
	#[error("Failed to reach the upstream inference endpoint: {source}")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
}
impl UpstreamTransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}

	/// Returns `true` when the failure was a timeout.
	pub fn is_timeout(&self) -> bool {
		matches!(self, Self::Timeout)
	}
}
impl From<ReqwestError> for UpstreamTransportError {
	fn from(e: ReqwestError) -> Self {
		if e.is_timeout() { Self::Timeout } else { Self::network(e) }
	}
}

/// Upstream answered with a non-success status; relayed to callers verbatim.
#[derive(Debug, ThisError)]
#[error("Upstream inference endpoint returned status {status}.")]
pub struct UpstreamResponseError {
	/// Status code returned by upstream.
	pub status: StatusCode,
	/// Body returned by upstream.
	pub body: crate::forwarder::ReplyBody,
}

/// Configuration and validation failures raised at startup.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// A configured endpoint is not a valid URL.
	#[error("The {name} URL is invalid.")]
	InvalidUrl {
		/// Configuration field name.
		name: &'static str,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// A configured endpoint cannot carry path segments.
	#[error("The {name} URL cannot be used as a base URL.")]
	CannotBeBase {
		/// Configuration field name.
		name: &'static str,
	},
	/// A required value is empty.
	#[error("The {name} setting must not be empty.")]
	Empty {
		/// Configuration field name.
		name: &'static str,
	},
	/// A timeout was configured as zero.
	#[error("The {name} timeout must be positive.")]
	ZeroTimeout {
		/// Configuration field name.
		name: &'static str,
	},
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn statuses_follow_error_kind() {
		let rejected: Error =
			CredentialAcquisitionError::Rejected { status: 401, body: "nope".into() }.into();

		assert_eq!(rejected.status(), StatusCode::INTERNAL_SERVER_ERROR);
		assert_eq!(
			Error::from(InvalidPayloadError::MissingMessages).status(),
			StatusCode::BAD_REQUEST
		);
		assert_eq!(
			Error::from(UpstreamTransportError::Timeout).status(),
			StatusCode::GATEWAY_TIMEOUT
		);

		let relayed: Error = UpstreamResponseError {
			status: StatusCode::SERVICE_UNAVAILABLE,
			body: crate::forwarder::ReplyBody::Text("service unavailable".into()),
		}
		.into();

		assert_eq!(relayed.status(), StatusCode::SERVICE_UNAVAILABLE);
	}

	#[test]
	fn rejected_credential_message_carries_issuer_details() {
		let err = CredentialAcquisitionError::Rejected {
			status: 401,
			body: "{\"errorCode\":\"BXNIM0415E\"}".into(),
		};
		let message = err.to_string();

		assert!(message.contains("401"));
		assert!(message.contains("BXNIM0415E"));
		assert_eq!(err.issuer_status(), Some(401));
	}

	#[test]
	fn credential_error_keeps_transport_source() {
		let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
		let err: Error = CredentialAcquisitionError::transport(io).into();
		let source = StdError::source(&err).expect("Transparent error should expose its source.");

		assert_eq!(source.to_string(), "refused");
	}
}
