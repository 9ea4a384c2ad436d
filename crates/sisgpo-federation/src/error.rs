//! Error types for identity federation.

use thiserror::Error;

/// Result alias used throughout the federation crate.
pub type FederationResult<T> = Result<T, FederationError>;

/// Federation error types.
///
/// Configuration failures are resolved locally before any network I/O;
/// the upstream variants distinguish "could not reach SISGPO at all" from
/// "SISGPO answered, but not with a usable session".
#[derive(Debug, Clone, Error)]
pub enum FederationError {
    // Configuration errors
    /// No shared signing secret is configured.
    #[error("SSO shared secret is not configured; set SISGPO_SSO_SECRET")]
    MissingSecret,

    /// Neither the principal nor the identity directory yielded an email.
    #[error("Unable to resolve an email address for user {subject}")]
    EmailUnresolvable { subject: String },

    /// The identity directory failed while looking up a principal.
    #[error("Identity directory lookup failed: {0}")]
    Directory(String),

    /// The assertion could not be signed.
    #[error("Failed to sign SSO assertion: {0}")]
    Signing(String),

    /// The assertion could not be decoded or validated.
    #[error("Invalid SSO assertion: {0}")]
    InvalidAssertion(String),

    // Upstream errors
    /// Connection refused or DNS failure talking to SISGPO.
    #[error("SISGPO service is unreachable; check the service is running")]
    UpstreamUnreachable { base_url: String },

    /// The SSO exchange did not complete in time.
    #[error("SISGPO SSO exchange timed out")]
    UpstreamTimeout,

    /// SISGPO answered the SSO exchange with a non-success status.
    #[error("SISGPO rejected the SSO exchange ({status}): {message}")]
    ExchangeRejected { status: u16, message: String },

    /// SISGPO answered with a success status but without a usable token.
    #[error("Malformed SSO response from SISGPO: {0}")]
    MalformedResponse(String),

    /// Any other transport-level failure.
    #[error("SSO exchange failed: {0}")]
    Transport(String),
}

impl FederationError {
    /// Check if this error is a local configuration problem.
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            FederationError::MissingSecret
                | FederationError::EmailUnresolvable { .. }
                | FederationError::Directory(_)
                | FederationError::Signing(_)
        )
    }

    /// Check if SISGPO could not be reached at all.
    #[must_use]
    pub fn is_unreachable(&self) -> bool {
        matches!(self, FederationError::UpstreamUnreachable { .. })
    }

    /// Short machine-readable kind, used as a metrics label.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            FederationError::MissingSecret => "missing_secret",
            FederationError::EmailUnresolvable { .. } => "email_unresolvable",
            FederationError::Directory(_) => "directory",
            FederationError::Signing(_) => "signing",
            FederationError::InvalidAssertion(_) => "invalid_assertion",
            FederationError::UpstreamUnreachable { .. } => "unreachable",
            FederationError::UpstreamTimeout => "timeout",
            FederationError::ExchangeRejected { .. } => "rejected",
            FederationError::MalformedResponse(_) => "malformed",
            FederationError::Transport(_) => "transport",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = FederationError::MissingSecret;
        assert!(err.to_string().contains("SISGPO_SSO_SECRET"));

        let err = FederationError::EmailUnresolvable {
            subject: "42".to_string(),
        };
        assert_eq!(err.to_string(), "Unable to resolve an email address for user 42");

        let err = FederationError::UpstreamUnreachable {
            base_url: "http://localhost:3333".to_string(),
        };
        assert!(err.to_string().contains("check the service is running"));
        assert!(!err.to_string().contains("localhost:3333"));

        let err = FederationError::ExchangeRejected {
            status: 401,
            message: "invalid assertion".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "SISGPO rejected the SSO exchange (401): invalid assertion"
        );
    }

    #[test]
    fn test_is_configuration() {
        assert!(FederationError::MissingSecret.is_configuration());
        assert!(FederationError::EmailUnresolvable {
            subject: "1".to_string()
        }
        .is_configuration());
        assert!(FederationError::Signing("bad".to_string()).is_configuration());

        assert!(!FederationError::UpstreamTimeout.is_configuration());
        assert!(!FederationError::MalformedResponse("x".to_string()).is_configuration());
    }

    #[test]
    fn test_is_unreachable() {
        assert!(FederationError::UpstreamUnreachable {
            base_url: "http://x".to_string()
        }
        .is_unreachable());
        assert!(!FederationError::UpstreamTimeout.is_unreachable());
        assert!(!FederationError::Transport("x".to_string()).is_unreachable());
    }
}
