//! In-process response cache for proxied SISGPO reads.
//!
//! Uses a `moka` sync cache with per-entry expiry so each downstream path can
//! carry its own TTL. Lookups never suspend the calling task.
//!
//! - Key: `sisgpo:<path>:<sha256(sorted query)>`
//! - Value: the raw upstream JSON payload and its `ETag`, if any
//! - TTL: resolved per path by [`TtlPolicy`], falling back to a default

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::http::HeaderValue;
use moka::sync::Cache;
use moka::Expiry;
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::routes::metrics::record_cache_lookup;

/// Key namespace shared by every entry of this cache.
pub const CACHE_NAMESPACE: &str = "sisgpo";

/// TTL applied to paths that match no rule.
pub const DEFAULT_TTL_SECS: u64 = 60;

/// Reference data that changes rarely (units, vehicles, aircraft, metadata).
const REFERENCE_TTL_SECS: u64 = 300;

/// Personnel registers.
const PERSONNEL_TTL_SECS: u64 = 180;

/// Builds the cache key for a downstream path and raw query string.
///
/// Query parameters are decoded and sorted before hashing, so parameter
/// order does not matter but every distinct value does.
pub fn cache_key(path: &str, query: Option<&str>) -> String {
    let mut pairs: Vec<(String, String)> = url::form_urlencoded::parse(query.unwrap_or("").as_bytes())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    pairs.sort();

    let canonical = url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs.iter())
        .finish();

    let digest = Sha256::digest(canonical.as_bytes());
    format!("{CACHE_NAMESPACE}:{path}:{}", hex::encode(digest))
}

/// Static mapping from path prefixes to TTLs.
///
/// Rules are kept sorted longest prefix first, so the first literal match is
/// also the most specific one.
#[derive(Debug, Clone)]
pub struct TtlPolicy {
    rules: Vec<(String, Duration)>,
    default_ttl: Duration,
}

impl TtlPolicy {
    pub fn new<I, S>(rules: I, default_ttl: Duration) -> Self
    where
        I: IntoIterator<Item = (S, Duration)>,
        S: Into<String>,
    {
        let mut rules: Vec<(String, Duration)> =
            rules.into_iter().map(|(p, ttl)| (p.into(), ttl)).collect();
        rules.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        Self { rules, default_ttl }
    }

    /// The TTL tiers used for the SISGPO admin resources.
    pub fn sisgpo_default(default_ttl: Duration) -> Self {
        let reference = Duration::from_secs(REFERENCE_TTL_SECS);
        let personnel = Duration::from_secs(PERSONNEL_TTL_SECS);

        Self::new(
            [
                ("/admin/obms", reference),
                ("/admin/viaturas", reference),
                ("/admin/aeronaves", reference),
                ("/admin/metadata", reference),
                ("/admin/militares", personnel),
                ("/admin/civis", personnel),
            ],
            default_ttl,
        )
    }

    pub fn resolve(&self, path: &str) -> Duration {
        self.rules
            .iter()
            .find(|(prefix, _)| path.starts_with(prefix.as_str()))
            .map_or(self.default_ttl, |(_, ttl)| *ttl)
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self::sisgpo_default(Duration::from_secs(DEFAULT_TTL_SECS))
    }
}

/// A cached upstream response.
#[derive(Debug, Clone)]
pub struct CachedEntry {
    pub body: Arc<Value>,
    /// Validator returned with the original response.
    pub etag: Option<HeaderValue>,
    ttl: Duration,
}

struct PerEntryTtl;

impl Expiry<String, CachedEntry> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &CachedEntry,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &CachedEntry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// Hit/miss counters and current size.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: u64,
}

/// Shared response cache.
///
/// Built once at startup and handed to request handlers through the
/// application state. Concurrent misses on the same key are not coalesced:
/// each one fetches upstream and the last write wins.
pub struct ResponseCache {
    cache: Cache<String, CachedEntry>,
    policy: TtlPolicy,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ResponseCache {
    pub fn new(max_entries: u64, policy: TtlPolicy) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries)
            .expire_after(PerEntryTtl)
            .build();

        Self {
            cache,
            policy,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn policy(&self) -> &TtlPolicy {
        &self.policy
    }

    pub fn get(&self, key: &str) -> Option<CachedEntry> {
        let found = self.cache.get(key);

        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        record_cache_lookup(found.is_some());

        found
    }

    /// Store a payload. `None` uses the policy's default TTL.
    pub fn set(&self, key: impl Into<String>, value: Value, ttl: Option<Duration>) {
        let ttl = ttl.unwrap_or_else(|| self.policy.default_ttl());
        self.insert(key.into(), value, None, ttl);
    }

    /// Store a payload and its `ETag` with the TTL the policy resolves for `path`.
    pub fn set_for_path(
        &self,
        key: impl Into<String>,
        path: &str,
        value: Value,
        etag: Option<HeaderValue>,
    ) -> Duration {
        let ttl = self.policy.resolve(path);
        self.insert(key.into(), value, etag, ttl);
        ttl
    }

    fn insert(&self, key: String, value: Value, etag: Option<HeaderValue>, ttl: Duration) {
        self.cache.insert(
            key,
            CachedEntry {
                body: Arc::new(value),
                etag,
                ttl,
            },
        );
    }

    pub fn del(&self, key: &str) {
        self.cache.invalidate(key);
    }

    pub fn flush(&self) {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks();
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.run_pending_tasks();
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.cache.entry_count(),
        }
    }
}
