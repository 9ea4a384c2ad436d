//! Identity federation between the local system and SISGPO.
//!
//! This crate provides:
//! - HS256-signed SSO assertions describing the locally authenticated user
//! - The assertion-for-session exchange against the SISGPO SSO login endpoint
//! - A pluggable identity directory used to resolve missing email addresses
//!
//! # Example
//!
//! ```rust,ignore
//! use sisgpo_federation::{FederatedIdentity, FederationConfig, TokenFederationService};
//!
//! let config = FederationConfig::new("http://sisgpo.local:3333")
//!     .with_shared_secret("s3cret")
//!     .with_assertion_ttl_secs(90);
//!
//! let service = TokenFederationService::new(config)?;
//! let identity = FederatedIdentity::new("42", "Sgt. Silva").with_email("silva@cbm.example");
//!
//! let session = service.exchange_for_session(&identity).await?;
//! println!("upstream bearer: {}", session.expose());
//! ```

mod claims;
mod error;
mod identity;
mod jwt;
mod service;

pub use claims::{AssertionClaims, AssertionClaimsBuilder};
pub use error::{FederationError, FederationResult};
pub use identity::{FederatedIdentity, IdentityDirectory, InMemoryDirectory};
pub use jwt::{sign_assertion, verify_assertion};
pub use service::{
    FederationConfig, SsoAssertion, SsoLoginOutcome, TokenFederationService, UpstreamSession,
    DEFAULT_ASSERTION_TTL_SECS, DEFAULT_ORIGIN, SSO_LOGIN_PATH,
};
