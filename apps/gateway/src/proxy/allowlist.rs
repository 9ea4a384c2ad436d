//! Downstream path normalization and the prefix allowlist.

use crate::error::{GatewayError, GatewayResult};

/// SISGPO admin resources this gateway may forward to.
pub const SISGPO_ALLOWED_PREFIXES: &[&str] = &[
    "/admin/plantoes",
    "/admin/viaturas",
    "/admin/obms",
    "/admin/militares",
    "/admin/escala-medicos",
    "/admin/escala-aeronaves",
    "/admin/escala-codec",
    "/admin/civis",
    "/admin/aeronaves",
    "/admin/metadata",
];

/// Turn the wildcard suffix of the proxy route into a canonical downstream path.
///
/// Leading slashes are collapsed into one. Dot segments are refused so the
/// path cannot climb out of an allowlisted prefix once the upstream URL is
/// resolved.
pub fn normalize_downstream_path(raw: &str) -> GatewayResult<String> {
    let path = format!("/{}", raw.trim_start_matches('/'));

    if path.split('/').any(is_dot_segment) {
        return Err(GatewayError::RouteNotPermitted { path });
    }

    Ok(path)
}

/// `.` and `..`, including their percent-encoded forms.
fn is_dot_segment(segment: &str) -> bool {
    let decoded = segment.to_ascii_lowercase().replace("%2e", ".");
    decoded == "." || decoded == ".."
}

/// Fixed set of permitted downstream path prefixes.
#[derive(Debug, Clone)]
pub struct Allowlist {
    prefixes: Vec<String>,
}

impl Allowlist {
    pub fn new<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            prefixes: prefixes.into_iter().map(Into::into).collect(),
        }
    }

    pub fn sisgpo_default() -> Self {
        Self::new(SISGPO_ALLOWED_PREFIXES.iter().copied())
    }

    pub fn is_permitted(&self, path: &str) -> bool {
        self.prefixes
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()))
    }

    /// Fail with `RouteNotPermitted` unless `path` starts with a permitted prefix.
    pub fn check(&self, path: &str) -> GatewayResult<()> {
        if self.is_permitted(path) {
            Ok(())
        } else {
            Err(GatewayError::RouteNotPermitted {
                path: path.to_string(),
            })
        }
    }

    pub fn prefixes(&self) -> &[String] {
        &self.prefixes
    }
}

impl Default for Allowlist {
    fn default() -> Self {
        Self::sisgpo_default()
    }
}
