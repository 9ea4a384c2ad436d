//! Token federation: assertion minting and the SSO session exchange.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::{header, Client, StatusCode};
use serde_json::Value;
use tracing::{debug, warn};

use crate::claims::AssertionClaims;
use crate::error::{FederationError, FederationResult};
use crate::identity::{FederatedIdentity, IdentityDirectory, InMemoryDirectory};
use crate::jwt::sign_assertion;

/// Default assertion lifetime in seconds.
pub const DEFAULT_ASSERTION_TTL_SECS: u64 = 90;

/// Default `origin` claim identifying the calling system.
pub const DEFAULT_ORIGIN: &str = "sisgpo-gateway";

/// SSO login endpoint, relative to the upstream base URL.
pub const SSO_LOGIN_PATH: &str = "/api/auth/sso-login";

const DEFAULT_EXCHANGE_TIMEOUT_SECS: u64 = 10;

/// Configuration for the federation service.
#[derive(Debug, Clone)]
pub struct FederationConfig {
    /// SISGPO base URL, without trailing slash.
    pub base_url: String,
    /// HMAC secret shared with SISGPO. `None` fails every exchange.
    pub shared_secret: Option<String>,
    pub assertion_ttl_secs: u64,
    pub origin: String,
    /// Timeout for the SSO exchange call.
    pub timeout: Duration,
}

impl FederationConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            shared_secret: None,
            assertion_ttl_secs: DEFAULT_ASSERTION_TTL_SECS,
            origin: DEFAULT_ORIGIN.to_string(),
            timeout: Duration::from_secs(DEFAULT_EXCHANGE_TIMEOUT_SECS),
        }
    }

    #[must_use]
    pub fn with_shared_secret(mut self, secret: impl Into<String>) -> Self {
        let secret = secret.into();
        self.shared_secret = (!secret.is_empty()).then_some(secret);
        self
    }

    #[must_use]
    pub fn with_assertion_ttl_secs(mut self, secs: u64) -> Self {
        self.assertion_ttl_secs = secs;
        self
    }

    #[must_use]
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = origin.into();
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn sso_login_url(&self) -> String {
        format!("{}{}", self.base_url, SSO_LOGIN_PATH)
    }
}

/// A signed assertion together with the claims it carries.
#[derive(Debug, Clone)]
pub struct SsoAssertion {
    pub token: String,
    pub claims: AssertionClaims,
}

/// Opaque bearer credential issued by SISGPO.
#[derive(Clone, PartialEq, Eq)]
pub struct UpstreamSession(String);

impl UpstreamSession {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The raw bearer token.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Value for an `Authorization` header.
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.0)
    }
}

impl fmt::Debug for UpstreamSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("UpstreamSession(<redacted>)")
    }
}

/// Decoded body of a successful SSO login response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SsoLoginOutcome {
    Token(String),
    Malformed(String),
}

impl SsoLoginOutcome {
    /// Decode an SSO login response body.
    ///
    /// Only a JSON object with a non-empty string `token` field is accepted.
    pub fn decode(body: &[u8]) -> Self {
        let value: Value = match serde_json::from_slice(body) {
            Ok(value) => value,
            Err(e) => return Self::Malformed(format!("response is not JSON: {e}")),
        };

        match value.get("token") {
            Some(Value::String(token)) if !token.is_empty() => Self::Token(token.clone()),
            Some(Value::String(_)) => Self::Malformed("token field is empty".to_string()),
            Some(_) => Self::Malformed("token field is not a string".to_string()),
            None => Self::Malformed("response has no token field".to_string()),
        }
    }
}

/// Mints assertions and exchanges them for SISGPO sessions.
///
/// Stateless: every call to [`exchange_for_session`](Self::exchange_for_session)
/// mints a fresh assertion and performs one upstream round-trip.
#[derive(Clone)]
pub struct TokenFederationService {
    config: FederationConfig,
    client: Client,
    directory: Arc<dyn IdentityDirectory>,
}

impl TokenFederationService {
    /// Create a service with an empty identity directory.
    pub fn new(config: FederationConfig) -> FederationResult<Self> {
        Self::with_directory(config, Arc::new(InMemoryDirectory::new()))
    }

    /// Create a service using the given identity directory for email fallback.
    pub fn with_directory(
        config: FederationConfig,
        directory: Arc<dyn IdentityDirectory>,
    ) -> FederationResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| FederationError::Transport(e.to_string()))?;

        Ok(Self {
            config,
            client,
            directory,
        })
    }

    pub fn config(&self) -> &FederationConfig {
        &self.config
    }

    /// Mint a signed assertion for the given identity.
    ///
    /// # Errors
    ///
    /// - `MissingSecret` when no shared secret is configured
    /// - `EmailUnresolvable` when neither the identity nor the directory has an email
    /// - `Directory` / `Signing` on lookup or encoding failure
    pub async fn generate_assertion(
        &self,
        identity: &FederatedIdentity,
    ) -> FederationResult<SsoAssertion> {
        let secret = self
            .config
            .shared_secret
            .as_deref()
            .ok_or(FederationError::MissingSecret)?;

        let email = self.resolve_email(identity).await?;

        let claims = AssertionClaims::builder()
            .subject(identity.id.clone())
            .display_name(identity.display_name.clone())
            .email(email)
            .origin(self.config.origin.clone())
            .expires_in_secs(i64::try_from(self.config.assertion_ttl_secs).unwrap_or(i64::MAX))
            .build();

        let token = sign_assertion(&claims, secret.as_bytes())?;

        Ok(SsoAssertion { token, claims })
    }

    /// Exchange a fresh assertion for an upstream session credential.
    ///
    /// # Errors
    ///
    /// Any error from [`generate_assertion`](Self::generate_assertion), plus
    /// `UpstreamUnreachable`, `UpstreamTimeout`, `ExchangeRejected`,
    /// `MalformedResponse` and `Transport` for the upstream call.
    pub async fn exchange_for_session(
        &self,
        identity: &FederatedIdentity,
    ) -> FederationResult<UpstreamSession> {
        let assertion = self.generate_assertion(identity).await?;
        let url = self.config.sso_login_url();
        let start = Instant::now();

        let response = self
            .client
            .post(&url)
            .header(header::AUTHORIZATION, format!("Bearer {}", assertion.token))
            .send()
            .await
            .map_err(|e| self.map_reqwest_error(e))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| self.map_reqwest_error(e))?;

        debug!(
            user_id = %identity.id,
            status = status.as_u16(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "SSO exchange completed"
        );

        if !status.is_success() {
            let message = rejection_message(status, &body);
            warn!(user_id = %identity.id, status = status.as_u16(), %message, "SSO exchange rejected");
            return Err(FederationError::ExchangeRejected {
                status: status.as_u16(),
                message,
            });
        }

        match SsoLoginOutcome::decode(&body) {
            SsoLoginOutcome::Token(token) => Ok(UpstreamSession::new(token)),
            SsoLoginOutcome::Malformed(reason) => {
                warn!(user_id = %identity.id, %reason, "SSO exchange returned malformed body");
                Err(FederationError::MalformedResponse(reason))
            }
        }
    }

    async fn resolve_email(&self, identity: &FederatedIdentity) -> FederationResult<String> {
        if let Some(email) = identity.direct_email() {
            return Ok(email.to_string());
        }

        debug!(user_id = %identity.id, "principal has no email, consulting directory");

        self.directory
            .email_for(&identity.id)
            .await?
            .map(|email| email.trim().to_string())
            .filter(|email| !email.is_empty())
            .ok_or_else(|| FederationError::EmailUnresolvable {
                subject: identity.id.clone(),
            })
    }

    fn map_reqwest_error(&self, error: reqwest::Error) -> FederationError {
        if error.is_timeout() {
            FederationError::UpstreamTimeout
        } else if error.is_connect() {
            warn!(base_url = %self.config.base_url, error = %error, "SISGPO is unreachable");
            FederationError::UpstreamUnreachable {
                base_url: self.config.base_url.clone(),
            }
        } else {
            FederationError::Transport(error.to_string())
        }
    }
}

/// Best-effort human-readable message from a rejected SSO response.
fn rejection_message(status: StatusCode, body: &[u8]) -> String {
    if let Ok(value) = serde_json::from_slice::<Value>(body) {
        for key in ["message", "error"] {
            if let Some(message) = value.get(key).and_then(Value::as_str) {
                return message.to_string();
            }
        }
    }

    status
        .canonical_reason()
        .unwrap_or("unexpected status")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct FailingDirectory;

    #[async_trait]
    impl IdentityDirectory for FailingDirectory {
        async fn email_for(&self, _id: &str) -> Result<Option<String>, FederationError> {
            Err(FederationError::Directory("connection reset".to_string()))
        }
    }

    fn config() -> FederationConfig {
        FederationConfig::new("http://sisgpo.test/").with_shared_secret("secret")
    }

    #[test]
    fn test_config_defaults() {
        let config = FederationConfig::new("http://sisgpo.test/");
        assert_eq!(config.base_url, "http://sisgpo.test");
        assert_eq!(config.assertion_ttl_secs, 90);
        assert_eq!(config.origin, DEFAULT_ORIGIN);
        assert!(config.shared_secret.is_none());
        assert_eq!(config.sso_login_url(), "http://sisgpo.test/api/auth/sso-login");
    }

    #[test]
    fn test_empty_secret_is_treated_as_unset() {
        let config = FederationConfig::new("http://x").with_shared_secret("");
        assert!(config.shared_secret.is_none());
    }

    #[test]
    fn test_decode_sso_login_outcome() {
        assert_eq!(
            SsoLoginOutcome::decode(br#"{"token":"abc"}"#),
            SsoLoginOutcome::Token("abc".to_string())
        );
        assert!(matches!(
            SsoLoginOutcome::decode(br#"{"user":{}}"#),
            SsoLoginOutcome::Malformed(_)
        ));
        assert!(matches!(
            SsoLoginOutcome::decode(br#"{"token":""}"#),
            SsoLoginOutcome::Malformed(_)
        ));
        assert!(matches!(
            SsoLoginOutcome::decode(br#"{"token":12}"#),
            SsoLoginOutcome::Malformed(_)
        ));
        assert!(matches!(
            SsoLoginOutcome::decode(b"<html>"),
            SsoLoginOutcome::Malformed(_)
        ));
    }

    #[test]
    fn test_upstream_session_debug_is_redacted() {
        let session = UpstreamSession::new("very-secret");
        assert!(!format!("{session:?}").contains("very-secret"));
        assert_eq!(session.bearer(), "Bearer very-secret");
    }

    #[test]
    fn test_rejection_message() {
        assert_eq!(
            rejection_message(StatusCode::UNAUTHORIZED, br#"{"message":"bad assertion"}"#),
            "bad assertion"
        );
        assert_eq!(
            rejection_message(StatusCode::FORBIDDEN, br#"{"error":"disabled"}"#),
            "disabled"
        );
        assert_eq!(rejection_message(StatusCode::BAD_GATEWAY, b""), "Bad Gateway");
    }

    #[tokio::test]
    async fn test_generate_assertion_requires_secret() {
        let service = TokenFederationService::new(FederationConfig::new("http://x")).unwrap();
        let identity = FederatedIdentity::new("1", "A").with_email("a@cbm.example");

        let err = service.generate_assertion(&identity).await.unwrap_err();
        assert!(matches!(err, FederationError::MissingSecret));
    }

    #[tokio::test]
    async fn test_generate_assertion_with_direct_email() {
        let service = TokenFederationService::new(config().with_origin("ocorrencias")).unwrap();
        let identity = FederatedIdentity::new("42", "Sgt. Silva").with_email("silva@cbm.example");

        let assertion = service.generate_assertion(&identity).await.unwrap();
        assert_eq!(assertion.claims.sub, "42");
        assert_eq!(assertion.claims.name, "Sgt. Silva");
        assert_eq!(assertion.claims.email, "silva@cbm.example");
        assert_eq!(assertion.claims.origin, "ocorrencias");
        assert_eq!(assertion.claims.lifetime_secs(), 90);

        let decoded = crate::verify_assertion(&assertion.token, b"secret").unwrap();
        assert_eq!(decoded, assertion.claims);
    }

    #[tokio::test]
    async fn test_generate_assertion_with_huge_ttl_saturates() {
        let service = TokenFederationService::new(config().with_assertion_ttl_secs(u64::MAX)).unwrap();
        let identity = FederatedIdentity::new("1", "A").with_email("a@cbm.example");

        let assertion = service.generate_assertion(&identity).await.unwrap();
        assert_eq!(assertion.claims.exp, i64::MAX);
    }

    #[tokio::test]
    async fn test_generate_assertion_falls_back_to_directory() {
        let directory = InMemoryDirectory::new().with_entry("42", "fallback@cbm.example");
        let service = TokenFederationService::with_directory(config(), Arc::new(directory)).unwrap();
        let identity = FederatedIdentity::new("42", "Sgt. Silva");

        let assertion = service.generate_assertion(&identity).await.unwrap();
        assert_eq!(assertion.claims.email, "fallback@cbm.example");
    }

    #[tokio::test]
    async fn test_generate_assertion_fails_without_email() {
        let service = TokenFederationService::new(config()).unwrap();
        let identity = FederatedIdentity::new("42", "Sgt. Silva");

        let err = service.generate_assertion(&identity).await.unwrap_err();
        assert!(matches!(err, FederationError::EmailUnresolvable { .. }));
        assert!(err.is_configuration());
    }

    #[tokio::test]
    async fn test_generate_assertion_propagates_directory_failure() {
        let service =
            TokenFederationService::with_directory(config(), Arc::new(FailingDirectory)).unwrap();
        let identity = FederatedIdentity::new("42", "Sgt. Silva");

        let err = service.generate_assertion(&identity).await.unwrap_err();
        assert!(matches!(err, FederationError::Directory(_)));
    }

    #[tokio::test]
    async fn test_custom_ttl_is_applied() {
        let service = TokenFederationService::new(config().with_assertion_ttl_secs(30)).unwrap();
        let identity = FederatedIdentity::new("1", "A").with_email("a@cbm.example");

        let assertion = service.generate_assertion(&identity).await.unwrap();
        assert_eq!(assertion.claims.lifetime_secs(), 30);
    }
}
