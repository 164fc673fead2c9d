//! The request pipeline
//!
//! One `send` call is one call chain: the descriptor is dispatched, the
//! outcome goes through `RetryPolicy::resolve`, and the loop either delivers,
//! refreshes and redispatches, backs off and redispatches, or fails. The
//! `Attempt` value is the only per-call state and it only moves forward.
//!
//! Notices and navigation intents are produced at the single exit point of a
//! failing chain, so a caller sees at most one notice regardless of how many
//! retries happened.
//!
//! Dropping the `send` future cancels the chain: nothing is spawned, so a
//! pending backoff sleep or dispatch simply never resumes.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue, RETRY_AFTER};
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use session::TokenStore;
use tracing::{debug, info, instrument, warn};

use crate::config::PipelineConfig;
use crate::descriptor::RequestDescriptor;
use crate::error::{ClassifiedError, ErrorKind, message_from_body};
use crate::notice::{NavigationIntent, Notice, Notifier};
use crate::policy::{Attempt, Classification, Decision, Outcome, RetryPolicy, retry_after_hint};
use crate::refresh::refresh_credential;
use crate::transport::{PreparedRequest, RawResponse, Transport, TransportError, dispatch_within};

/// Query parameter carrying the cache-defeating nonce on GETs.
pub const NONCE_PARAM: &str = "_t";

/// A successful response handed back to the caller.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ApiResponse {
    /// Decode the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

impl From<RawResponse> for ApiResponse {
    fn from(raw: RawResponse) -> Self {
        Self {
            status: raw.status,
            headers: raw.headers,
            body: raw.body,
        }
    }
}

/// Wraps every outbound API call with credentials, classification and retries.
///
/// Cheap to share: wrap in an `Arc` and call `send` from as many tasks as
/// needed. Calls are independent except for the shared `TokenStore`.
pub struct RequestPipeline {
    config: PipelineConfig,
    policy: RetryPolicy,
    transport: Arc<dyn Transport>,
    store: Arc<dyn TokenStore>,
    notifier: Arc<dyn Notifier>,
}

impl RequestPipeline {
    pub fn new(
        config: PipelineConfig,
        transport: Arc<dyn Transport>,
        store: Arc<dyn TokenStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let policy = RetryPolicy::new(config.base_delay(), config.max_retries);
        Self {
            config,
            policy,
            transport,
            store,
            notifier,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub async fn get(&self, path: &str) -> Result<ApiResponse, ClassifiedError> {
        self.send(RequestDescriptor::get(path)).await
    }

    pub async fn post_json(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<ApiResponse, ClassifiedError> {
        self.send(RequestDescriptor::post(path, body)).await
    }

    pub async fn put_json(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<ApiResponse, ClassifiedError> {
        self.send(RequestDescriptor::put(path, body)).await
    }

    pub async fn delete(&self, path: &str) -> Result<ApiResponse, ClassifiedError> {
        self.send(RequestDescriptor::delete(path)).await
    }

    /// Send one call chain to completion.
    #[instrument(skip_all, fields(method = %descriptor.method, path = %descriptor.path))]
    pub async fn send(&self, descriptor: RequestDescriptor) -> Result<ApiResponse, ClassifiedError> {
        let (url, body) = match self.encode(&descriptor) {
            Ok(parts) => parts,
            Err(message) => {
                return Err(self.fail(ClassifiedError::new(ErrorKind::ClientError, message)));
            }
        };

        let mut attempt = Attempt::first();
        loop {
            let result = self.dispatch(&descriptor, &url, &body).await;
            let outcome = match &result {
                Ok(raw) => Outcome::Status(raw.status.as_u16()),
                Err(_) => Outcome::NoResponse,
            };

            match (self.policy.resolve(outcome, attempt), result) {
                (Decision::Deliver, Ok(raw)) => {
                    debug!(status = raw.status.as_u16(), retries = attempt.retries(), "call succeeded");
                    return Ok(raw.into());
                }
                (_, Err(e)) => return Err(self.unreachable(e, attempt)),
                (Decision::Refresh { next }, Ok(_)) => {
                    metrics::counter!("pipeline_retries_total", "reason" => Classification::AuthExpired.label())
                        .increment(1);
                    info!(retries = attempt.retries(), "access token rejected, refreshing");
                    if let Err(e) = refresh_credential(
                        self.transport.as_ref(),
                        &self.config,
                        self.store.as_ref(),
                    )
                    .await
                    {
                        warn!(error = %e, "credential refresh failed, ending session");
                        return Err(self
                            .end_session(
                                ErrorKind::AuthExpired,
                                &descriptor,
                                StatusCode::UNAUTHORIZED,
                                attempt,
                            )
                            .await);
                    }
                    attempt = next;
                }
                (Decision::Backoff { next, delay }, Ok(raw)) => {
                    metrics::counter!("pipeline_retries_total", "reason" => Classification::ServerError.label())
                        .increment(1);
                    warn!(
                        status = raw.status.as_u16(),
                        retry = next.retries(),
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "server error, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt = next;
                }
                (Decision::Surface(classification), Ok(raw)) => {
                    return Err(self
                        .terminal(classification, false, raw, &descriptor, attempt)
                        .await);
                }
                (Decision::Exhausted(classification), Ok(raw)) => {
                    return Err(self
                        .terminal(classification, true, raw, &descriptor, attempt)
                        .await);
                }
            }
        }
    }

    /// Resolve the URL and body once per call chain.
    fn encode(&self, descriptor: &RequestDescriptor) -> Result<(Url, Option<Bytes>), String> {
        let mut url = Url::parse(&self.config.url_for(&descriptor.path))
            .map_err(|e| format!("invalid request url: {e}"))?;
        if !descriptor.query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in &descriptor.query {
                pairs.append_pair(k, v);
            }
        }
        let body = descriptor
            .body
            .as_ref()
            .map(|b| serde_json::to_vec(b).map(Bytes::from))
            .transpose()
            .map_err(|e| format!("invalid request body: {e}"))?;
        Ok((url, body))
    }

    /// Attach the current credential and nonce, then hand off to the transport.
    async fn dispatch(
        &self,
        descriptor: &RequestDescriptor,
        url: &Url,
        body: &Option<Bytes>,
    ) -> Result<RawResponse, TransportError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(pair) = self.store.get().await {
            match HeaderValue::from_str(&pair.bearer()) {
                Ok(value) => {
                    headers.insert(AUTHORIZATION, value);
                }
                Err(_) => warn!("stored access token is not a valid header value, sending without it"),
            }
        }

        let mut url = url.clone();
        if descriptor.is_read_only() {
            url.query_pairs_mut()
                .append_pair(NONCE_PARAM, &epoch_millis().to_string());
        }

        dispatch_within(
            self.transport.as_ref(),
            PreparedRequest {
                method: descriptor.method.clone(),
                url,
                headers,
                body: body.clone(),
            },
            self.config.timeout(),
        )
        .await
    }

    /// Build the terminal error for a non-success decision.
    async fn terminal(
        &self,
        classification: Classification,
        exhausted: bool,
        raw: RawResponse,
        descriptor: &RequestDescriptor,
        attempt: Attempt,
    ) -> ClassifiedError {
        match classification {
            Classification::AuthExpired => {
                let kind = if exhausted {
                    ErrorKind::Exhausted
                } else {
                    ErrorKind::AuthExpired
                };
                self.end_session(kind, descriptor, raw.status, attempt).await
            }
            Classification::RateLimited => {
                let hint = raw.headers.get(RETRY_AFTER).and_then(|v| v.to_str().ok());
                let wait = match retry_after_hint(hint) {
                    Some(wait) => wait,
                    None => {
                        if let Some(raw) = hint {
                            debug!(retry_after = raw, "Retry-After is not in seconds, using default wait");
                        }
                        self.config.default_wait()
                    }
                };
                let notice = Notice::RateLimited { wait };
                let err = ClassifiedError::new(ErrorKind::RateLimited, notice.text())
                    .with_status(raw.status)
                    .with_retry_after(wait)
                    .with_retries(attempt.retries());
                self.notifier.notify(&notice);
                err
            }
            other => {
                let kind = if exhausted {
                    ErrorKind::Exhausted
                } else {
                    ErrorKind::from(other)
                };
                let message = message_from_body(&raw.body);
                self.fail(
                    ClassifiedError::new(kind, message)
                        .with_status(raw.status)
                        .with_retries(attempt.retries()),
                )
            }
        }
    }

    fn unreachable(&self, error: TransportError, attempt: Attempt) -> ClassifiedError {
        warn!(error = %error, "no response from server");
        let notice = Notice::Connectivity;
        self.notifier.notify(&notice);
        ClassifiedError::new(ErrorKind::Unreachable, notice.text()).with_retries(attempt.retries())
    }

    /// Clear credentials, tell the user, and point them at the login page.
    async fn end_session(
        &self,
        kind: ErrorKind,
        descriptor: &RequestDescriptor,
        status: StatusCode,
        attempt: Attempt,
    ) -> ClassifiedError {
        if let Err(e) = self.store.clear().await {
            warn!(error = %e, "failed to clear credential store");
        }
        let return_to = descriptor.origin_path.as_deref().unwrap_or("/");
        let intent = NavigationIntent::login_redirect(&self.config.login_path, return_to);
        let notice = Notice::SessionExpired;
        self.notifier.notify(&notice);
        ClassifiedError::new(kind, notice.text())
            .with_status(status)
            .with_navigation(intent)
            .with_retries(attempt.retries())
    }

    /// Emit a failure notice carrying the error's own message.
    fn fail(&self, err: ClassifiedError) -> ClassifiedError {
        self.notifier.notify(&Notice::Failure {
            message: err.message.clone(),
        });
        err
    }
}

fn epoch_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
}
