//! Test doubles shared by the pipeline's unit tests

use std::sync::Mutex;
use std::time::Duration;

use bytes::Bytes;
use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};

use crate::notice::{Notice, Notifier};
use crate::transport::{DispatchFuture, PreparedRequest, RawResponse, Transport, TransportError};

type Handler = dyn Fn(&PreparedRequest) -> Result<RawResponse, TransportError> + Send + Sync;

/// What a mock dispatch saw.
#[derive(Debug, Clone)]
pub struct Seen {
    pub request: PreparedRequest,
    pub at: tokio::time::Instant,
}

impl Seen {
    pub fn path(&self) -> &str {
        self.request.url.path()
    }

    pub fn bearer(&self) -> Option<String> {
        self.request
            .headers
            .get(AUTHORIZATION)
            .map(|v| v.to_str().unwrap().to_owned())
    }

    pub fn query_value(&self, key: &str) -> Option<String> {
        self.request
            .url
            .query_pairs()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    }
}

/// Transport answering from a closure and recording every request.
pub struct MockTransport {
    handler: Box<Handler>,
    latency: Duration,
    seen: Mutex<Vec<Seen>>,
}

impl MockTransport {
    pub fn new(
        handler: impl Fn(&PreparedRequest) -> Result<RawResponse, TransportError>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        Self {
            handler: Box::new(handler),
            latency: Duration::ZERO,
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Delay every response, so concurrent calls interleave.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn seen(&self) -> Vec<Seen> {
        self.seen.lock().unwrap().clone()
    }

    pub fn seen_on(&self, path: &str) -> Vec<Seen> {
        self.seen()
            .into_iter()
            .filter(|s| s.path() == path)
            .collect()
    }
}

impl Transport for MockTransport {
    fn dispatch(&self, request: PreparedRequest) -> DispatchFuture<'_> {
        Box::pin(async move {
            self.seen.lock().unwrap().push(Seen {
                request: request.clone(),
                at: tokio::time::Instant::now(),
            });
            if !self.latency.is_zero() {
                tokio::time::sleep(self.latency).await;
            }
            (self.handler)(&request)
        })
    }
}

/// Build a response with optional headers.
pub fn respond(status: u16, body: &str, headers: &[(&'static str, &str)]) -> RawResponse {
    let mut map = HeaderMap::new();
    for &(name, value) in headers {
        map.insert(
            HeaderName::from_static(name),
            HeaderValue::from_str(value).unwrap(),
        );
    }
    RawResponse {
        status: StatusCode::from_u16(status).unwrap(),
        headers: map,
        body: Bytes::copy_from_slice(body.as_bytes()),
    }
}

/// Pops scripted statuses in order; repeats the last one when drained.
pub fn sequence(statuses: &[(u16, &'static str)]) -> impl Fn() -> RawResponse + Send + Sync {
    let queue = Mutex::new(statuses.to_vec());
    move || {
        let mut q = queue.lock().unwrap();
        let (status, body) = if q.len() > 1 { q.remove(0) } else { q[0] };
        respond(status, body, &[])
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<Notice>>,
}

impl RecordingNotifier {
    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notice: &Notice) {
        self.notices.lock().unwrap().push(notice.clone());
    }
}
