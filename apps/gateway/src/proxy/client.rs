//! HTTP client for the SISGPO admin API.

use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::{header, HeaderValue, Method};
use bytes::Bytes;
use reqwest::{Client, Response};
use serde_json::Value;
use sisgpo_federation::UpstreamSession;

use crate::error::{GatewayError, GatewayResult};

/// Timeout for the upstream health probe.
const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// Request body as it will be sent upstream.
#[derive(Debug)]
pub enum OutboundBody {
    Empty,
    /// Parsed JSON, re-serialized on the way out.
    Json(Value),
    /// Buffered non-JSON body (e.g. url-encoded forms).
    Bytes(Bytes),
    /// Raw incoming stream, forwarded untouched (multipart uploads).
    Stream(Body),
}

/// A fully prepared upstream call.
#[derive(Debug)]
pub struct OutboundRequest {
    pub method: Method,
    /// Normalized downstream path, starting with `/`.
    pub path: String,
    /// Raw query string, passed through verbatim.
    pub query: Option<String>,
    pub content_type: Option<HeaderValue>,
    pub if_match: Option<HeaderValue>,
    pub body: OutboundBody,
}

/// HTTP client for proxying requests to SISGPO.
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    client: Client,
    base_url: String,
}

impl UpstreamClient {
    /// Create a new client with the given per-request timeout.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> GatewayResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| GatewayError::Internal(e.into()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Upstream URL for a downstream path: `{base}/api{path}[?query]`.
    pub fn url_for(&self, path: &str, query: Option<&str>) -> String {
        match query {
            Some(query) if !query.is_empty() => format!("{}/api{}?{}", self.base_url, path, query),
            _ => format!("{}/api{}", self.base_url, path),
        }
    }

    /// Send a request upstream on behalf of the given session.
    pub async fn forward(
        &self,
        request: OutboundRequest,
        session: &UpstreamSession,
    ) -> GatewayResult<Response> {
        let url = self.url_for(&request.path, request.query.as_deref());

        let mut builder = self
            .client
            .request(request.method, url)
            .header(header::AUTHORIZATION, session.bearer());

        if let Some(content_type) = request.content_type {
            builder = builder.header(header::CONTENT_TYPE, content_type);
        }
        if let Some(if_match) = request.if_match {
            builder = builder.header(header::IF_MATCH, if_match);
        }

        builder = match request.body {
            OutboundBody::Empty => builder,
            OutboundBody::Json(value) => {
                let bytes = serde_json::to_vec(&value).map_err(|e| GatewayError::Internal(e.into()))?;
                builder.body(bytes)
            }
            OutboundBody::Bytes(bytes) => builder.body(bytes),
            OutboundBody::Stream(body) => {
                builder.body(reqwest::Body::wrap_stream(body.into_data_stream()))
            }
        };

        builder.send().await.map_err(map_reqwest_error)
    }

    /// Probe the upstream health endpoint.
    pub async fn health_check(&self, health_path: &str) -> Result<Duration, String> {
        let url = format!("{}{}", self.base_url, health_path);
        let start = Instant::now();

        match self
            .client
            .get(&url)
            .timeout(HEALTH_CHECK_TIMEOUT)
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => Ok(start.elapsed()),
            Ok(response) => Err(format!(
                "Health check returned status {}",
                response.status()
            )),
            Err(e) if e.is_timeout() => Err("Health check timed out".to_string()),
            Err(e) if e.is_connect() => Err("SISGPO is unreachable".to_string()),
            Err(e) => Err(format!("Health check failed: {e}")),
        }
    }
}

/// Map reqwest errors to gateway errors.
///
/// Transport failures carry no upstream response, so apart from timeouts they
/// all surface as a generic internal error.
pub fn map_reqwest_error(error: reqwest::Error) -> GatewayError {
    if error.is_timeout() {
        GatewayError::GatewayTimeout
    } else {
        GatewayError::Internal(error.into())
    }
}
