//! Transport seam between the pipeline and the network
//!
//! `Transport` sends one fully prepared request and returns the raw response.
//! It never retries and never classifies; that is the pipeline's job. The
//! production implementation wraps `reqwest`; tests substitute scripted
//! transports so retry behavior can be checked without sockets.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use reqwest::header::HeaderMap;
use reqwest::{Method, StatusCode, Url};
use tracing::debug;

/// A request ready for the wire.
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

/// A complete response, body fully read.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Failure to obtain a response at all.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("response body read failed: {0}")]
    Body(String),

    #[error("request failed: {0}")]
    Other(String),
}

/// Boxed future returned by `Transport::dispatch`.
pub type DispatchFuture<'a> =
    Pin<Box<dyn Future<Output = Result<RawResponse, TransportError>> + Send + 'a>>;

/// Sends prepared requests.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility (`Arc<dyn Transport>`).
pub trait Transport: Send + Sync {
    fn dispatch(&self, request: PreparedRequest) -> DispatchFuture<'_>;
}

/// Dispatch with an upper bound on the wait for a complete response.
///
/// Every pipeline dispatch goes through here, so `PipelineConfig::timeout`
/// applies whatever the transport's own settings are. An elapsed deadline is
/// a `TransportError::Timeout`.
pub async fn dispatch_within(
    transport: &dyn Transport,
    request: PreparedRequest,
    limit: Duration,
) -> Result<RawResponse, TransportError> {
    match tokio::time::timeout(limit, transport.dispatch(request)).await {
        Ok(result) => result,
        Err(_) => Err(TransportError::Timeout(format!(
            "no response within {}s",
            limit.as_secs()
        ))),
    }
}

/// `reqwest`-backed transport with a per-dispatch timeout.
///
/// Session cookies (for cookie-bound refresh) need a client built with a
/// cookie store; pass one in through `new`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    timeout: Duration,
}

impl ReqwestTransport {
    pub fn new(client: reqwest::Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::new(reqwest::Client::new(), timeout)
    }
}

impl Transport for ReqwestTransport {
    fn dispatch(&self, request: PreparedRequest) -> DispatchFuture<'_> {
        Box::pin(async move {
            let mut builder = self
                .client
                .request(request.method.clone(), request.url.clone())
                .headers(request.headers)
                .timeout(self.timeout);
            if let Some(body) = request.body {
                builder = builder.body(body);
            }

            let response = builder.send().await.map_err(|e| {
                if e.is_timeout() {
                    TransportError::Timeout(e.to_string())
                } else if e.is_connect() {
                    TransportError::Connect(e.to_string())
                } else {
                    TransportError::Other(e.to_string())
                }
            })?;

            let status = response.status();
            let headers = response.headers().clone();
            let body = response.bytes().await.map_err(|e| {
                if e.is_timeout() {
                    TransportError::Timeout(e.to_string())
                } else {
                    TransportError::Body(e.to_string())
                }
            })?;

            debug!(method = %request.method, url = %request.url, status = status.as_u16(), "dispatch complete");
            Ok(RawResponse {
                status,
                headers,
                body,
            })
        })
    }
}
