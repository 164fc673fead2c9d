//! Forwarding to the upstream application server
//!
//! Requests that passed admission are forwarded verbatim to the single
//! configured upstream, minus hop-by-hop headers. The upstream's response is
//! returned as-is (including its error statuses); only failures to get a
//! response at all become proxy errors.

use admission::is_static_asset;
use axum::http::header::CACHE_CONTROL;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, error, instrument};

use crate::metrics;

/// Headers to strip before forwarding (hop-by-hop per RFC 2616 Section 13.5.1)
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Applied to static assets when the upstream sent no caching policy.
const IMMUTABLE_CACHE: &str = "public, max-age=31536000, immutable";

/// Largest request body buffered for forwarding.
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Shared state passed to the proxy handler
#[derive(Clone)]
pub struct ProxyState {
    pub client: reqwest::Client,
    pub upstream_url: String,
    pub timeout: Duration,
    pub requests_total: Arc<AtomicU64>,
    pub errors_total: Arc<AtomicU64>,
}

impl ProxyState {
    pub fn new(upstream_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            upstream_url: upstream_url.into(),
            timeout,
            requests_total: Arc::new(AtomicU64::new(0)),
            errors_total: Arc::new(AtomicU64::new(0)),
        }
    }

    fn target(&self, uri: &axum::http::Uri) -> String {
        let base = self.upstream_url.trim_end_matches('/');
        match uri.path_and_query() {
            Some(pq) => format!("{base}{pq}"),
            None => base.to_owned(),
        }
    }
}

/// JSON error body: {"error":{"type":"proxy_error","message":"...","request_id":"req_..."}}
fn error_response(status: StatusCode, message: &str, request_id: &str) -> Response {
    let body = serde_json::json!({
        "error": {
            "type": "proxy_error",
            "message": message,
            "request_id": request_id,
        }
    });
    (
        status,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
        .into_response()
}

/// Forward one admitted request upstream.
#[instrument(skip_all, fields(request_id = %request_id, method = %request.method(), path = %request.uri().path()))]
pub async fn proxy_request(
    state: &ProxyState,
    request: axum::http::Request<axum::body::Body>,
    request_id: String,
) -> Response {
    let started = Instant::now();
    state.requests_total.fetch_add(1, Ordering::Relaxed);

    let method = request.method().clone();
    let static_asset = is_static_asset(request.uri().path());
    let upstream_url = state.target(request.uri());

    let mut headers = reqwest::header::HeaderMap::new();
    for (name, value) in request.headers() {
        if !is_hop_by_hop(name.as_str()) {
            headers.append(name.clone(), value.clone());
        }
    }

    let body_bytes = match axum::body::to_bytes(request.into_body(), MAX_BODY_BYTES).await {
        Ok(b) => b,
        Err(e) => {
            state.errors_total.fetch_add(1, Ordering::Relaxed);
            error!(error = %e, "failed to read request body");
            return error_response(
                StatusCode::BAD_REQUEST,
                &format!("invalid request body: {e}"),
                &request_id,
            );
        }
    };

    let sent = state
        .client
        .request(method.clone(), &upstream_url)
        .headers(headers)
        .timeout(state.timeout)
        .body(body_bytes)
        .send()
        .await;

    let upstream_response = match sent {
        Ok(r) => r,
        Err(e) => {
            state.errors_total.fetch_add(1, Ordering::Relaxed);
            let (status, error_type, message) = if e.is_timeout() {
                (
                    StatusCode::GATEWAY_TIMEOUT,
                    "timeout",
                    format!("upstream timeout after {}s", state.timeout.as_secs()),
                )
            } else if e.is_connect() {
                (StatusCode::BAD_GATEWAY, "connection", format!("upstream error: {e}"))
            } else {
                (StatusCode::BAD_GATEWAY, "other", format!("upstream error: {e}"))
            };
            error!(error = %e, error_type, "upstream request failed");
            metrics::record_upstream_error(error_type);
            metrics::record_request(status.as_u16(), method.as_str(), started.elapsed().as_secs_f64());
            return error_response(status, &message, &request_id);
        }
    };

    let status = upstream_response.status();
    let resp_headers = upstream_response.headers().clone();

    let resp_body = match upstream_response.bytes().await {
        Ok(b) => b,
        Err(e) => {
            state.errors_total.fetch_add(1, Ordering::Relaxed);
            error!(error = %e, "failed to read upstream response body");
            metrics::record_upstream_error("body");
            metrics::record_request(502, method.as_str(), started.elapsed().as_secs_f64());
            return error_response(
                StatusCode::BAD_GATEWAY,
                &format!("upstream response read error: {e}"),
                &request_id,
            );
        }
    };

    let mut response = Response::builder().status(status);
    for (name, value) in &resp_headers {
        if !is_hop_by_hop(name.as_str()) {
            response = response.header(name, value);
        }
    }
    if static_asset && !resp_headers.contains_key(CACHE_CONTROL) {
        response = response.header(CACHE_CONTROL, HeaderValue::from_static(IMMUTABLE_CACHE));
    }

    debug!(status = status.as_u16(), bytes = resp_body.len(), "upstream responded");
    metrics::record_request(status.as_u16(), method.as_str(), started.elapsed().as_secs_f64());

    response
        .body(axum::body::Body::from(resp_body))
        .unwrap_or_else(|e| {
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &format!("response build error: {e}"),
                &request_id,
            )
        })
}

/// Check if a header is hop-by-hop (should be stripped before forwarding)
pub fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP_HEADERS
        .iter()
        .any(|h| h.eq_ignore_ascii_case(name))
}
