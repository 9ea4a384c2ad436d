//! Integration tests for the SSO session exchange using wiremock.

use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{header_exists, method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

use sisgpo_federation::{
    verify_assertion, FederatedIdentity, FederationConfig, FederationError,
    TokenFederationService,
};

const SECRET: &str = "integration-secret";

// =============================================================================
// Test Helpers
// =============================================================================

fn identity() -> FederatedIdentity {
    FederatedIdentity::new("42", "Sgt. Silva").with_email("silva@cbm.example")
}

fn service_for(base_url: &str) -> TokenFederationService {
    let config = FederationConfig::new(base_url)
        .with_shared_secret(SECRET)
        .with_origin("ocorrencias")
        .with_timeout(Duration::from_secs(2));
    TokenFederationService::new(config).unwrap()
}

// =============================================================================
// Exchange Tests
// =============================================================================

#[tokio::test]
async fn test_exchange_returns_upstream_token() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/auth/sso-login"))
        .and(header_exists("Authorization"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": "upstream-abc"})))
        .expect(1)
        .mount(&server)
        .await;

    let session = service_for(&server.uri())
        .exchange_for_session(&identity())
        .await
        .unwrap();

    assert_eq!(session.expose(), "upstream-abc");
}

#[tokio::test]
async fn test_exchange_sends_signed_assertion_with_empty_body() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/auth/sso-login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": "t"})))
        .mount(&server)
        .await;

    service_for(&server.uri())
        .exchange_for_session(&identity())
        .await
        .unwrap();

    let requests: Vec<Request> = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].body.is_empty());

    let auth = requests[0]
        .headers
        .get("authorization")
        .unwrap()
        .to_str()
        .unwrap();
    let token = auth.strip_prefix("Bearer ").unwrap();

    let claims = verify_assertion(token, SECRET.as_bytes()).unwrap();
    assert_eq!(claims.sub, "42");
    assert_eq!(claims.email, "silva@cbm.example");
    assert_eq!(claims.origin, "ocorrencias");
}

#[tokio::test]
async fn test_exchange_missing_token_field_is_malformed() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/auth/sso-login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"user": {"id": 1}})))
        .mount(&server)
        .await;

    let err = service_for(&server.uri())
        .exchange_for_session(&identity())
        .await
        .unwrap_err();

    assert!(matches!(err, FederationError::MalformedResponse(_)));
}

#[tokio::test]
async fn test_exchange_rejected_carries_upstream_message() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/auth/sso-login"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({"message": "Assinatura inválida"})),
        )
        .mount(&server)
        .await;

    let err = service_for(&server.uri())
        .exchange_for_session(&identity())
        .await
        .unwrap_err();

    match err {
        FederationError::ExchangeRejected { status, message } => {
            assert_eq!(status, 401);
            assert_eq!(message, "Assinatura inválida");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_exchange_connection_refused_is_unreachable() {
    // Nothing listens on port 1.
    let err = service_for("http://127.0.0.1:1")
        .exchange_for_session(&identity())
        .await
        .unwrap_err();

    assert!(err.is_unreachable(), "expected unreachable, got {err:?}");
    assert!(err.to_string().contains("check the service is running"));
}

#[tokio::test]
async fn test_exchange_timeout() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/auth/sso-login"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"token": "late"}))
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let config = FederationConfig::new(server.uri())
        .with_shared_secret(SECRET)
        .with_timeout(Duration::from_millis(200));
    let service = TokenFederationService::new(config).unwrap();

    let err = service.exchange_for_session(&identity()).await.unwrap_err();
    assert!(matches!(err, FederationError::UpstreamTimeout));
}

#[tokio::test]
async fn test_missing_secret_makes_no_network_call() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": "t"})))
        .expect(0)
        .mount(&server)
        .await;

    let service = TokenFederationService::new(FederationConfig::new(server.uri())).unwrap();

    let err = service.exchange_for_session(&identity()).await.unwrap_err();
    assert!(matches!(err, FederationError::MissingSecret));
}
