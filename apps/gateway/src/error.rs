//! Gateway error types and HTTP response handling.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use sisgpo_federation::FederationError;
use thiserror::Error;

/// Message returned when forwarding fails without an upstream response.
pub const GENERIC_UPSTREAM_MESSAGE: &str = "Failed to communicate with SISGPO";

/// Gateway-specific errors with structured responses.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Authentication required")]
    Unauthorized,

    #[error("Route not permitted: {path}")]
    RouteNotPermitted { path: String },

    #[error("Invalid request: {message}")]
    BadRequest { message: String },

    #[error("Request body exceeds the size limit")]
    PayloadTooLarge,

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("{0}")]
    UpstreamUnreachable(String),

    #[error("SISGPO authentication failed: {0}")]
    UpstreamAuth(String),

    #[error("SISGPO did not respond in time")]
    GatewayTimeout,

    #[error("Internal gateway error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// Structured error response returned to clients.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
        }
    }
}

impl GatewayError {
    /// Get the error code string for the response.
    pub fn error_code(&self) -> &'static str {
        match self {
            GatewayError::Unauthorized => "UNAUTHORIZED",
            GatewayError::RouteNotPermitted { .. } => "ROUTE_NOT_PERMITTED",
            GatewayError::BadRequest { .. } => "BAD_REQUEST",
            GatewayError::PayloadTooLarge => "PAYLOAD_TOO_LARGE",
            GatewayError::Configuration(_) => "CONFIG_ERROR",
            GatewayError::UpstreamUnreachable(_) => "SISGPO_UNREACHABLE",
            GatewayError::UpstreamAuth(_) => "SISGPO_AUTH_FAILED",
            GatewayError::GatewayTimeout => "GATEWAY_TIMEOUT",
            GatewayError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::Unauthorized => StatusCode::UNAUTHORIZED,
            GatewayError::RouteNotPermitted { .. } => StatusCode::BAD_REQUEST,
            GatewayError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            GatewayError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            GatewayError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::UpstreamUnreachable(_) => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::UpstreamAuth(_) => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::GatewayTimeout => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show to clients. Internal details are never exposed.
    pub fn public_message(&self) -> String {
        match self {
            GatewayError::Internal(_) => GENERIC_UPSTREAM_MESSAGE.to_string(),
            other => other.to_string(),
        }
    }

    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse::new(self.error_code(), self.public_message())
    }
}

impl From<FederationError> for GatewayError {
    fn from(err: FederationError) -> Self {
        if err.is_unreachable() {
            GatewayError::UpstreamUnreachable(err.to_string())
        } else if err.is_configuration() {
            GatewayError::Configuration(err.to_string())
        } else {
            GatewayError::UpstreamAuth(err.to_string())
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        if let GatewayError::Internal(ref source) = self {
            tracing::error!(error = %source, "internal gateway error");
        }

        (self.status_code(), Json(self.to_response())).into_response()
    }
}

/// Result type alias for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(GatewayError::Unauthorized.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            GatewayError::RouteNotPermitted {
                path: "/x".to_string()
            }
            .status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            GatewayError::UpstreamUnreachable("down".to_string()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            GatewayError::UpstreamAuth("rejected".to_string()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            GatewayError::Configuration("no secret".to_string()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(GatewayError::GatewayTimeout.status_code(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[test]
    fn test_payload_too_large() {
        let err = GatewayError::PayloadTooLarge;
        assert_eq!(err.status_code(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(err.error_code(), "PAYLOAD_TOO_LARGE");
    }

    #[test]
    fn test_internal_error_hides_details() {
        let err = GatewayError::Internal(anyhow::anyhow!("socket closed at 0x7f3a"));
        let body = err.to_response();
        assert_eq!(body.error, "INTERNAL_ERROR");
        assert_eq!(body.message, GENERIC_UPSTREAM_MESSAGE);
    }

    #[test]
    fn test_from_federation_error() {
        let err: GatewayError = FederationError::UpstreamUnreachable {
            base_url: "http://localhost:3333".to_string(),
        }
        .into();
        assert!(matches!(err, GatewayError::UpstreamUnreachable(_)));
        assert!(err.public_message().contains("check the service is running"));
        assert!(!err.public_message().contains("localhost:3333"));
        assert!(!err.to_response().message.contains("localhost:3333"));

        let err: GatewayError = FederationError::MissingSecret.into();
        assert!(matches!(err, GatewayError::Configuration(_)));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);

        let err: GatewayError = FederationError::MalformedResponse("no token".to_string()).into();
        assert!(matches!(err, GatewayError::UpstreamAuth(_)));

        let err: GatewayError = FederationError::UpstreamTimeout.into();
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_error_response_serialize() {
        let body = GatewayError::RouteNotPermitted {
            path: "/admin/usuarios".to_string(),
        }
        .to_response();

        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["error"], "ROUTE_NOT_PERMITTED");
        assert_eq!(json["message"], "Route not permitted: /admin/usuarios");
    }
}
