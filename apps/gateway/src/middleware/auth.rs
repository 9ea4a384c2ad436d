//! Local session authentication middleware.
//!
//! Verifies the caller's own session token (HS256, signed with `JWT_SECRET`)
//! and attaches a [`LocalIdentity`] to the request extensions. Requests
//! without a valid session never reach the proxy handlers.

use axum::{
    body::Body,
    extract::Request,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use jsonwebtoken::{decode, errors::ErrorKind, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Deserializer};
use sisgpo_federation::FederatedIdentity;
use std::{
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};
use tower::{Layer, Service};
use tracing::debug;

use crate::error::ErrorResponse;

/// Clock skew tolerance when checking `exp`.
const LEEWAY_SECS: u64 = 30;

/// Claims of a local session token.
///
/// Accepts both the standard names and the legacy `id`/`nome` fields; numeric
/// user ids are turned into strings.
#[derive(Debug, Clone, Deserialize)]
pub struct LocalClaims {
    #[serde(alias = "id", deserialize_with = "string_or_number")]
    pub sub: String,
    #[serde(default, alias = "nome")]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    pub exp: i64,
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(i64),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Text(text) => Ok(text),
        Raw::Number(number) => Ok(number.to_string()),
    }
}

/// Authenticated caller, available to handlers as a request extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalIdentity {
    pub id: String,
    pub display_name: String,
    pub email: Option<String>,
}

impl LocalIdentity {
    /// The identity as presented to the token federation service.
    pub fn to_federated(&self) -> FederatedIdentity {
        let identity = FederatedIdentity::new(self.id.clone(), self.display_name.clone());
        match &self.email {
            Some(email) => identity.with_email(email.clone()),
            None => identity,
        }
    }
}

impl From<LocalClaims> for LocalIdentity {
    fn from(claims: LocalClaims) -> Self {
        let display_name = claims
            .name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| claims.sub.clone());
        Self {
            id: claims.sub,
            display_name,
            email: claims.email,
        }
    }
}

/// Verifies local session tokens.
#[derive(Clone)]
pub struct SessionVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl std::fmt::Debug for SessionVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionVerifier").finish_non_exhaustive()
    }
}

impl SessionVerifier {
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = LEEWAY_SECS;
        validation.validate_aud = false;
        validation.set_required_spec_claims(&["exp"]);

        Self {
            key: DecodingKey::from_secret(secret),
            validation,
        }
    }

    pub fn verify(&self, token: &str) -> Result<LocalIdentity, String> {
        decode::<LocalClaims>(token, &self.key, &self.validation)
            .map(|data| data.claims.into())
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => "Session has expired".to_string(),
                ErrorKind::InvalidSignature => "Invalid session signature".to_string(),
                _ => "Invalid session token".to_string(),
            })
    }
}

/// Layer for authentication middleware.
#[derive(Debug, Clone)]
pub struct AuthLayer {
    verifier: Arc<SessionVerifier>,
}

impl AuthLayer {
    pub fn new(verifier: SessionVerifier) -> Self {
        Self {
            verifier: Arc::new(verifier),
        }
    }

    pub fn from_secret(secret: &str) -> Self {
        Self::new(SessionVerifier::new(secret.as_bytes()))
    }
}

impl<S> Layer<S> for AuthLayer {
    type Service = AuthService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthService {
            inner,
            verifier: self.verifier.clone(),
        }
    }
}

/// Authentication service wrapper.
#[derive(Debug, Clone)]
pub struct AuthService<S> {
    inner: S,
    verifier: Arc<SessionVerifier>,
}

impl<S> Service<Request<Body>> for AuthService<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: Request<Body>) -> Self::Future {
        let verifier = self.verifier.clone();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let token = request
                .headers()
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.strip_prefix("Bearer "))
                .map(str::trim)
                .filter(|t| !t.is_empty());

            let Some(token) = token else {
                return Ok(unauthorized_response(
                    "Missing or invalid authorization header",
                ));
            };

            match verifier.verify(token) {
                Ok(identity) => {
                    debug!(user_id = %identity.id, "session verified");
                    request.extensions_mut().insert(identity);
                    inner.call(request).await
                }
                Err(message) => Ok(unauthorized_response(&message)),
            }
        })
    }
}

fn unauthorized_response(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(ErrorResponse::new("UNAUTHORIZED", message)),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::{json, Value};

    const SECRET: &str = "local-session-secret";

    fn token(claims: Value, secret: &str) -> String {
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn exp_in(secs: i64) -> i64 {
        chrono::Utc::now().timestamp() + secs
    }

    #[test]
    fn test_verify_standard_claims() {
        let verifier = SessionVerifier::new(SECRET.as_bytes());
        let identity = verifier
            .verify(&token(
                json!({"sub": "42", "name": "Maria", "email": "maria@cbm.gov.br", "exp": exp_in(600)}),
                SECRET,
            ))
            .unwrap();

        assert_eq!(identity.id, "42");
        assert_eq!(identity.display_name, "Maria");
        assert_eq!(identity.email.as_deref(), Some("maria@cbm.gov.br"));
    }

    #[test]
    fn test_verify_legacy_claims() {
        let verifier = SessionVerifier::new(SECRET.as_bytes());
        let identity = verifier
            .verify(&token(json!({"id": 7, "nome": "João", "exp": exp_in(600)}), SECRET))
            .unwrap();

        assert_eq!(identity.id, "7");
        assert_eq!(identity.display_name, "João");
        assert!(identity.email.is_none());
    }

    #[test]
    fn test_display_name_falls_back_to_id() {
        let verifier = SessionVerifier::new(SECRET.as_bytes());
        let identity = verifier
            .verify(&token(json!({"sub": "u-1", "exp": exp_in(600)}), SECRET))
            .unwrap();
        assert_eq!(identity.display_name, "u-1");
    }

    #[test]
    fn test_verify_rejects_wrong_secret_and_expired() {
        let verifier = SessionVerifier::new(SECRET.as_bytes());

        let err = verifier
            .verify(&token(json!({"sub": "1", "exp": exp_in(600)}), "other"))
            .unwrap_err();
        assert_eq!(err, "Invalid session signature");

        let err = verifier
            .verify(&token(json!({"sub": "1", "exp": exp_in(-3600)}), SECRET))
            .unwrap_err();
        assert_eq!(err, "Session has expired");

        assert!(verifier.verify("not-a-jwt").is_err());
    }

    #[test]
    fn test_to_federated_carries_email() {
        let identity = LocalIdentity {
            id: "42".into(),
            display_name: "Maria".into(),
            email: Some("maria@cbm.gov.br".into()),
        };
        let federated = identity.to_federated();
        assert_eq!(federated.id, "42");
        assert_eq!(federated.direct_email(), Some("maria@cbm.gov.br"));
    }
}
