//! SSO assertion claims.
//!
//! Provides the `AssertionClaims` struct carried inside the HS256 assertion
//! presented to the SISGPO SSO login endpoint.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Claims asserting the local user's identity to SISGPO.
///
/// # Claims
///
/// - `sub`: Subject (local user id)
/// - `name`: Display name of the user
/// - `email`: Resolved email address (always present)
/// - `origin`: Tag identifying the calling system
/// - `iat`: Issued at (Unix timestamp)
/// - `exp`: Expiration time (Unix timestamp)
/// - `jti`: Unique assertion id
///
/// # Example
///
/// ```rust
/// use sisgpo_federation::AssertionClaims;
///
/// let claims = AssertionClaims::builder()
///     .subject("42")
///     .display_name("Sgt. Silva")
///     .email("silva@cbm.example")
///     .origin("sisgpo-gateway")
///     .expires_in_secs(90)
///     .build();
///
/// assert_eq!(claims.sub, "42");
/// assert_eq!(claims.exp - claims.iat, 90);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AssertionClaims {
    pub sub: String,
    pub name: String,
    pub email: String,
    pub origin: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

impl AssertionClaims {
    /// Create a new builder for constructing assertion claims.
    #[must_use]
    pub fn builder() -> AssertionClaimsBuilder {
        AssertionClaimsBuilder::default()
    }

    /// Check if the assertion is expired.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Utc::now().timestamp() > self.exp
    }

    /// Lifetime of the assertion in seconds.
    #[must_use]
    pub fn lifetime_secs(&self) -> i64 {
        self.exp - self.iat
    }
}

/// Builder for constructing assertion claims.
#[derive(Debug, Default)]
pub struct AssertionClaimsBuilder {
    sub: Option<String>,
    name: Option<String>,
    email: Option<String>,
    origin: Option<String>,
    iat: Option<i64>,
    ttl_secs: Option<i64>,
    jti: Option<String>,
}

impl AssertionClaimsBuilder {
    #[must_use]
    pub fn subject(mut self, sub: impl Into<String>) -> Self {
        self.sub = Some(sub.into());
        self
    }

    #[must_use]
    pub fn display_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    #[must_use]
    pub fn origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    /// Set the issued-at time explicitly (defaults to now).
    #[must_use]
    pub fn issued_at(mut self, iat: i64) -> Self {
        self.iat = Some(iat);
        self
    }

    /// Set the lifetime relative to the issued-at time.
    #[must_use]
    pub fn expires_in_secs(mut self, secs: i64) -> Self {
        self.ttl_secs = Some(secs);
        self
    }

    #[must_use]
    pub fn jwt_id(mut self, jti: impl Into<String>) -> Self {
        self.jti = Some(jti.into());
        self
    }

    /// Build the claims.
    ///
    /// Missing values fall back to: empty strings, `iat = now`,
    /// a 90 second lifetime and a random v4 `jti`.
    #[must_use]
    pub fn build(self) -> AssertionClaims {
        let iat = self.iat.unwrap_or_else(|| Utc::now().timestamp());
        let ttl = self
            .ttl_secs
            .unwrap_or(crate::service::DEFAULT_ASSERTION_TTL_SECS as i64);

        AssertionClaims {
            sub: self.sub.unwrap_or_default(),
            name: self.name.unwrap_or_default(),
            email: self.email.unwrap_or_default(),
            origin: self.origin.unwrap_or_default(),
            iat,
            exp: iat.saturating_add(ttl),
            jti: self.jti.unwrap_or_else(|| Uuid::new_v4().to_string()),
        }
    }
}
