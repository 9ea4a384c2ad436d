//! Request forwarding pipeline.
//!
//! Each proxied request runs strictly in order:
//!
//! 1. normalize the downstream path and check it against the allowlist,
//!    before the request body is read
//! 2. exchange the caller's identity for an upstream session
//! 3. serve GET requests from the cache when possible
//! 4. forward upstream and decode the reply
//! 5. decide whether the reply may be cached, and cache it
//! 6. shape the client response (ETag propagation, 204 preservation)

use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    extract::FromRequest,
    http::{header, HeaderMap, HeaderValue, Method, Request, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use serde_json::{json, Value};
use sisgpo_federation::{FederatedIdentity, TokenFederationService, UpstreamSession};
use tracing::{debug, warn};

use crate::cache::{cache_key, CachedEntry, ResponseCache};
use crate::error::{GatewayError, GatewayResult, GENERIC_UPSTREAM_MESSAGE};
use crate::proxy::allowlist::{normalize_downstream_path, Allowlist};
use crate::proxy::client::{OutboundBody, OutboundRequest, UpstreamClient};
use crate::routes::metrics::{record_token_exchange, record_upstream_error};

/// Path under which the proxy route is mounted.
pub const PROXY_ROUTE_PREFIX: &str = "/api/sisgpo/proxy";

/// Longest slice of a non-JSON upstream error body echoed back to clients.
const MAX_ECHOED_ERROR_CHARS: usize = 500;

/// Inbound request reduced to what the forwarder needs.
#[derive(Debug)]
pub struct ProxyRequest {
    pub method: Method,
    /// Wildcard suffix after the proxy prefix, not yet normalized.
    pub raw_path: String,
    pub query: Option<String>,
    pub content_type: Option<HeaderValue>,
    pub if_match: Option<HeaderValue>,
    pub body: OutboundBody,
}

impl ProxyRequest {
    /// Split an inbound request, buffering or streaming the body by content type.
    ///
    /// Buffering honours the body limit configured on the router; exceeding
    /// it yields `PayloadTooLarge`.
    pub async fn from_request(request: Request<Body>) -> GatewayResult<Self> {
        let method = request.method().clone();
        let raw_path = raw_downstream_path(request.uri());
        let query = request.uri().query().map(str::to_string);
        let content_type = request.headers().get(header::CONTENT_TYPE).cloned();
        let if_match = non_empty_header(request.headers(), header::IF_MATCH);

        let body = read_body(content_type.as_ref(), request).await?;

        Ok(Self {
            method,
            raw_path,
            query,
            content_type,
            if_match,
            body,
        })
    }
}

/// Wildcard suffix of the proxy route, still percent-encoded.
pub fn raw_downstream_path(uri: &Uri) -> String {
    uri.path()
        .strip_prefix(PROXY_ROUTE_PREFIX)
        .unwrap_or_default()
        .to_string()
}

fn non_empty_header(headers: &HeaderMap, name: header::HeaderName) -> Option<HeaderValue> {
    headers
        .get(name)
        .filter(|value| !value.as_bytes().iter().all(u8::is_ascii_whitespace))
        .cloned()
}

fn is_multipart(content_type: Option<&HeaderValue>) -> bool {
    content_type
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.trim_start().to_ascii_lowercase().starts_with("multipart/form-data"))
}

fn is_json(content_type: Option<&HeaderValue>) -> bool {
    content_type
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(';').next().unwrap_or_default().trim().to_ascii_lowercase())
        .is_some_and(|mime| mime == "application/json" || mime.ends_with("+json"))
}

async fn read_body(
    content_type: Option<&HeaderValue>,
    request: Request<Body>,
) -> GatewayResult<OutboundBody> {
    if is_multipart(content_type) {
        return Ok(OutboundBody::Stream(request.into_body()));
    }

    let bytes = Bytes::from_request(request, &())
        .await
        .map_err(|rejection| {
            if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
                GatewayError::PayloadTooLarge
            } else {
                GatewayError::BadRequest {
                    message: "request body is unreadable".to_string(),
                }
            }
        })?;

    if bytes.is_empty() {
        return Ok(OutboundBody::Empty);
    }

    if is_json(content_type) {
        let value = serde_json::from_slice(&bytes).map_err(|e| GatewayError::BadRequest {
            message: format!("malformed JSON body: {e}"),
        })?;
        return Ok(OutboundBody::Json(value));
    }

    Ok(OutboundBody::Bytes(bytes))
}

/// Upstream body after decoding at the boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamPayload {
    Empty,
    Json(Value),
    Raw {
        content_type: Option<HeaderValue>,
        bytes: Bytes,
    },
    /// Status was received but the body could not be read.
    Unreadable,
}

/// Upstream response reduced to what the client response needs.
#[derive(Debug, Clone)]
pub struct UpstreamReply {
    pub status: StatusCode,
    pub etag: Option<HeaderValue>,
    pub payload: UpstreamPayload,
}

impl UpstreamReply {
    /// Decode a buffered upstream body.
    pub fn decode(
        status: StatusCode,
        etag: Option<HeaderValue>,
        content_type: Option<HeaderValue>,
        bytes: Bytes,
    ) -> Self {
        let payload = if status == StatusCode::NO_CONTENT || bytes.is_empty() {
            UpstreamPayload::Empty
        } else {
            match serde_json::from_slice::<Value>(&bytes) {
                Ok(value) => UpstreamPayload::Json(value),
                Err(_) => UpstreamPayload::Raw {
                    content_type,
                    bytes,
                },
            }
        };

        Self {
            status,
            etag,
            payload,
        }
    }

    /// Shape the client response.
    ///
    /// 204 is preserved as 204 with no body. Error statuses always carry a
    /// JSON body with a `message` field.
    pub fn into_response(self) -> Response {
        let mut response = if self.status == StatusCode::NO_CONTENT {
            StatusCode::NO_CONTENT.into_response()
        } else {
            match self.payload {
                UpstreamPayload::Json(value) => (self.status, Json(value)).into_response(),
                UpstreamPayload::Empty if is_error(self.status) => {
                    (self.status, Json(message_body(reason(self.status)))).into_response()
                }
                UpstreamPayload::Empty => self.status.into_response(),
                UpstreamPayload::Raw { bytes, .. } if is_error(self.status) => {
                    let text: String = String::from_utf8_lossy(&bytes)
                        .chars()
                        .take(MAX_ECHOED_ERROR_CHARS)
                        .collect();
                    (self.status, Json(message_body(text.trim()))).into_response()
                }
                UpstreamPayload::Raw {
                    content_type,
                    bytes,
                } => {
                    let mut response = (self.status, bytes).into_response();
                    if let Some(content_type) = content_type {
                        response
                            .headers_mut()
                            .insert(header::CONTENT_TYPE, content_type);
                    }
                    response
                }
                UpstreamPayload::Unreadable => {
                    (self.status, Json(message_body(GENERIC_UPSTREAM_MESSAGE))).into_response()
                }
            }
        };

        if let Some(etag) = self.etag {
            response.headers_mut().insert(header::ETAG, etag);
        }
        response
    }
}

fn is_error(status: StatusCode) -> bool {
    status.is_client_error() || status.is_server_error()
}

fn reason(status: StatusCode) -> &'static str {
    status.canonical_reason().unwrap_or("Upstream error")
}

fn message_body(message: &str) -> Value {
    json!({ "message": message })
}

/// Whether a reply may be stored in the response cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheDecision {
    Store(String),
    Skip,
}

/// Only GET replies with status 200 and a JSON body are cacheable.
pub fn cache_decision(method: &Method, key: Option<&str>, reply: &UpstreamReply) -> CacheDecision {
    match key {
        Some(key)
            if *method == Method::GET
                && reply.status == StatusCode::OK
                && matches!(reply.payload, UpstreamPayload::Json(_)) =>
        {
            CacheDecision::Store(key.to_string())
        }
        _ => CacheDecision::Skip,
    }
}

fn cached_response(entry: CachedEntry) -> Response {
    let mut response = (StatusCode::OK, Json(&*entry.body)).into_response();
    if let Some(etag) = entry.etag {
        response.headers_mut().insert(header::ETAG, etag);
    }
    response
}

/// Orchestrates allowlisting, federation, caching and forwarding.
pub struct Forwarder {
    allowlist: Allowlist,
    federation: TokenFederationService,
    cache: Arc<ResponseCache>,
    client: UpstreamClient,
}

impl Forwarder {
    pub fn new(
        allowlist: Allowlist,
        federation: TokenFederationService,
        cache: Arc<ResponseCache>,
        client: UpstreamClient,
    ) -> Self {
        Self {
            allowlist,
            federation,
            cache,
            client,
        }
    }

    /// Run the full pipeline. Never fails: errors become JSON responses.
    pub async fn handle(&self, identity: &FederatedIdentity, request: Request<Body>) -> Response {
        let method = request.method().clone();
        let raw_path = raw_downstream_path(request.uri());

        match self.run(identity, request).await {
            Ok(response) => response,
            Err(err) => {
                warn!(
                    method = %method,
                    path = %raw_path,
                    user_id = %identity.id,
                    error = %err,
                    status = err.status_code().as_u16(),
                    "proxy request failed"
                );
                err.into_response()
            }
        }
    }

    async fn run(
        &self,
        identity: &FederatedIdentity,
        request: Request<Body>,
    ) -> GatewayResult<Response> {
        let path = normalize_downstream_path(&raw_downstream_path(request.uri()))?;
        self.allowlist.check(&path)?;

        let request = ProxyRequest::from_request(request).await?;

        let started = Instant::now();
        let session = self
            .federation
            .exchange_for_session(identity)
            .await
            .map_err(|err| {
                record_upstream_error(err.kind());
                GatewayError::from(err)
            })?;
        record_token_exchange(started.elapsed());

        let key = (request.method == Method::GET)
            .then(|| cache_key(&path, request.query.as_deref()));

        if let Some(key) = key.as_deref() {
            if let Some(entry) = self.cache.get(key) {
                debug!(path = %path, "serving from cache");
                return Ok(cached_response(entry));
            }
        }

        let method = request.method.clone();
        let reply = self.fetch(path.clone(), request, &session).await?;

        if is_error(reply.status) {
            record_upstream_error("application");
            warn!(
                method = %method,
                path = %path,
                status = reply.status.as_u16(),
                "SISGPO returned an error status"
            );
        }

        self.apply_cache_decision(&method, key.as_deref(), &path, &reply);

        Ok(reply.into_response())
    }

    async fn fetch(
        &self,
        path: String,
        request: ProxyRequest,
        session: &UpstreamSession,
    ) -> GatewayResult<UpstreamReply> {
        let outbound = OutboundRequest {
            method: request.method,
            path,
            query: request.query,
            content_type: request.content_type,
            if_match: request.if_match,
            body: request.body,
        };

        let response = self.client.forward(outbound, session).await.map_err(|err| {
            record_upstream_error(match err {
                GatewayError::GatewayTimeout => "timeout",
                _ => "transport",
            });
            err
        })?;

        let status = response.status();
        let etag = response.headers().get(header::ETAG).cloned();
        let content_type = response.headers().get(header::CONTENT_TYPE).cloned();

        match response.bytes().await {
            Ok(bytes) => Ok(UpstreamReply::decode(status, etag, content_type, bytes)),
            Err(err) if err.is_timeout() => {
                record_upstream_error("timeout");
                Err(GatewayError::GatewayTimeout)
            }
            Err(err) => {
                warn!(error = %err, status = status.as_u16(), "failed to read SISGPO response body");
                Ok(UpstreamReply {
                    status,
                    etag,
                    payload: UpstreamPayload::Unreadable,
                })
            }
        }
    }

    fn apply_cache_decision(
        &self,
        method: &Method,
        key: Option<&str>,
        path: &str,
        reply: &UpstreamReply,
    ) {
        if let CacheDecision::Store(key) = cache_decision(method, key, reply) {
            if let UpstreamPayload::Json(value) = &reply.payload {
                let ttl = self
                    .cache
                    .set_for_path(key, path, value.clone(), reply.etag.clone());
                debug!(path = %path, ttl_secs = ttl.as_secs(), "cached upstream response");
            }
        }
    }
}
