//! Gateway middleware components.

pub mod auth;

pub use auth::{AuthLayer, LocalIdentity, SessionVerifier};
