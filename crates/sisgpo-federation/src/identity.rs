//! Local identities and the directory used to resolve their email addresses.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::FederationError;

/// The locally authenticated principal, as seen by the federation layer.
///
/// Built per request from the local session; never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FederatedIdentity {
    pub id: String,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl FederatedIdentity {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            email: None,
        }
    }

    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Email carried directly on the principal, ignoring blank values.
    pub fn direct_email(&self) -> Option<&str> {
        self.email
            .as_deref()
            .map(str::trim)
            .filter(|email| !email.is_empty())
    }
}

/// Lookup of a principal's email by id.
///
/// Used as a fallback when the local session does not carry an email.
#[async_trait]
pub trait IdentityDirectory: Send + Sync {
    async fn email_for(&self, id: &str) -> Result<Option<String>, FederationError>;
}

/// Fixed in-memory directory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDirectory {
    emails: HashMap<String, String>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_entry(mut self, id: impl Into<String>, email: impl Into<String>) -> Self {
        self.emails.insert(id.into(), email.into());
        self
    }

    /// Parse a JSON object of the form `{"<id>": "<email>", ...}`.
    pub fn from_json(content: &str) -> Result<Self, FederationError> {
        let emails: HashMap<String, String> = serde_json::from_str(content)
            .map_err(|e| FederationError::Directory(format!("invalid directory JSON: {e}")))?;
        Ok(Self { emails })
    }

    pub fn len(&self) -> usize {
        self.emails.len()
    }

    pub fn is_empty(&self) -> bool {
        self.emails.is_empty()
    }
}

#[async_trait]
impl IdentityDirectory for InMemoryDirectory {
    async fn email_for(&self, id: &str) -> Result<Option<String>, FederationError> {
        Ok(self.emails.get(id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direct_email_ignores_blank() {
        let identity = FederatedIdentity::new("1", "A").with_email("   ");
        assert_eq!(identity.direct_email(), None);

        let identity = FederatedIdentity::new("1", "A").with_email(" a@b.example ");
        assert_eq!(identity.direct_email(), Some("a@b.example"));

        let identity = FederatedIdentity::new("1", "A");
        assert_eq!(identity.direct_email(), None);
    }

    #[tokio::test]
    async fn test_in_memory_directory_lookup() {
        let directory = InMemoryDirectory::new().with_entry("7", "souza@cbm.example");

        assert_eq!(
            directory.email_for("7").await.unwrap().as_deref(),
            Some("souza@cbm.example")
        );
        assert_eq!(directory.email_for("8").await.unwrap(), None);
    }

    #[test]
    fn test_directory_from_json() {
        let directory =
            InMemoryDirectory::from_json(r#"{"1":"a@cbm.example","2":"b@cbm.example"}"#).unwrap();
        assert_eq!(directory.len(), 2);

        let err = InMemoryDirectory::from_json("[1,2]").unwrap_err();
        assert!(matches!(err, FederationError::Directory(_)));
    }
}
