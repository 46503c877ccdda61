//! IBM Cloud IAM token exchange.
//!
//! [`TokenIssuer`] trades the long-lived [`ApiKey`] for a short-lived [`BearerToken`] by
//! posting a form-encoded `apikey` grant to the IAM token endpoint. The issuer is stateless;
//! caching and single-flight coordination live in [`crate::cache::CredentialCache`].

// crates.io
use reqwest::header::ACCEPT;
// self
use crate::{
	_prelude::*,
	auth::{ApiKey, BearerToken, Credential},
	clock::Clock,
	error::CredentialAcquisitionError,
};

/// Default IBM Cloud IAM token endpoint.
pub const IAM_TOKEN_URL: &str = "https://iam.cloud.ibm.com/identity/token";
/// Grant type identifying an API-key exchange.
pub const APIKEY_GRANT_TYPE: &str = "urn:ibm:params:oauth:grant-type:apikey";

/// Subset of the IAM token response the gateway relies on.
#[derive(Debug, Deserialize)]
struct IssuedToken {
	access_token: String,
	expires_in: i64,
}

/// Client for the token endpoint holding the static API key.
#[derive(Clone)]
pub struct TokenIssuer {
	endpoint: Url,
	api_key: ApiKey,
	http: ReqwestClient,
}
impl TokenIssuer {
	/// Creates an issuer for `endpoint`.
	///
	/// The provided client should carry a request timeout; the issuer never waits longer than
	/// the client allows.
	pub fn new(endpoint: Url, api_key: ApiKey, http: ReqwestClient) -> Self {
		Self { endpoint, api_key, http }
	}

	/// Token endpoint this issuer posts to.
	pub fn endpoint(&self) -> &Url {
		&self.endpoint
	}

	/// API key presented to the endpoint.
	pub fn api_key(&self) -> &ApiKey {
		&self.api_key
	}

	/// Exchanges the API key for a fresh credential.
	///
	/// The expiry is anchored on `clock` as read once the issuer has answered, so time spent on
	/// the wire never extends the token's apparent lifetime.
	pub async fn exchange(
		&self,
		clock: &dyn Clock,
	) -> Result<Credential, CredentialAcquisitionError> {
		let form = [("apikey", self.api_key.expose()), ("grant_type", APIKEY_GRANT_TYPE)];
		let response = self
			.http
			.post(self.endpoint.clone())
			.header(ACCEPT, "application/json")
			.form(&form)
			.send()
			.await?;
		let status = response.status();
		let body = response.text().await?;

		if !status.is_success() {
			return Err(CredentialAcquisitionError::Rejected { status: status.as_u16(), body });
		}

		let issued = parse_token_response(&body, status)?;

		build_credential(issued, clock.now())
	}
}
impl Debug for TokenIssuer {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenIssuer")
			.field("endpoint", &self.endpoint.as_str())
			.field("api_key_fingerprint", &self.api_key.fingerprint())
			.finish()
	}
}

fn parse_token_response(
	body: &str,
	status: StatusCode,
) -> Result<IssuedToken, CredentialAcquisitionError> {
	let mut de = serde_json::Deserializer::from_str(body);

	serde_path_to_error::deserialize(&mut de).map_err(|source| {
		CredentialAcquisitionError::MalformedResponse { source, status: status.as_u16() }
	})
}

fn build_credential(
	issued: IssuedToken,
	now: OffsetDateTime,
) -> Result<Credential, CredentialAcquisitionError> {
	let IssuedToken { access_token, expires_in } = issued;

	if access_token.trim().is_empty() {
		return Err(CredentialAcquisitionError::EmptyAccessToken);
	}
	if expires_in <= 0 {
		return Err(CredentialAcquisitionError::NonPositiveExpiresIn(expires_in));
	}

	let expires_at = now
		.checked_add(Duration::seconds(expires_in))
		.ok_or(CredentialAcquisitionError::ExpiresInOutOfRange(expires_in))?;

	Ok(Credential::new(BearerToken::new(access_token), expires_at))
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;

	const NOW: OffsetDateTime = macros::datetime!(2025-06-01 12:00 UTC);

	#[test]
	fn parses_iam_response_and_ignores_extra_fields() {
		let body = r#"{
			"access_token": "eyJhbGciOi",
			"refresh_token": "not_supported",
			"token_type": "Bearer",
			"expires_in": 3600,
			"expiration": 1748782800,
			"scope": "ibm openid"
		}"#;
		let issued = parse_token_response(body, StatusCode::OK)
			.expect("IAM response fixture should parse.");
		let credential = build_credential(issued, NOW).expect("Credential should build.");

		assert_eq!(credential.token.expose(), "eyJhbGciOi");
		assert_eq!(credential.expires_at, NOW + Duration::hours(1));
	}

	#[test]
	fn parse_errors_report_the_failing_path() {
		let body = r#"{"access_token":"T","expires_in":"soon"}"#;
		let err = parse_token_response(body, StatusCode::OK)
			.expect_err("String expires_in should be rejected.");

		match err {
			CredentialAcquisitionError::MalformedResponse { source, status } => {
				assert_eq!(source.path().to_string(), "expires_in");
				assert_eq!(status, 200);
			},
			other => panic!("Unexpected error: {other:?}"),
		}
	}

	#[test]
	fn rejects_unusable_tokens() {
		let empty = IssuedToken { access_token: " ".into(), expires_in: 3600 };
		let expired = IssuedToken { access_token: "T".into(), expires_in: 0 };
		let huge = IssuedToken { access_token: "T".into(), expires_in: i64::MAX };

		assert!(matches!(
			build_credential(empty, NOW),
			Err(CredentialAcquisitionError::EmptyAccessToken)
		));
		assert!(matches!(
			build_credential(expired, NOW),
			Err(CredentialAcquisitionError::NonPositiveExpiresIn(0))
		));
		assert!(matches!(
			build_credential(huge, NOW),
			Err(CredentialAcquisitionError::ExpiresInOutOfRange(_))
		));
	}

	#[test]
	fn debug_output_hides_the_api_key() {
		let issuer = TokenIssuer::new(
			Url::parse(IAM_TOKEN_URL).expect("Default token URL should parse."),
			ApiKey::new("super-secret"),
			ReqwestClient::new(),
		);
		let rendered = format!("{issuer:?}");

		assert!(rendered.contains("iam.cloud.ibm.com"));
		assert!(!rendered.contains("super-secret"));
	}
}
