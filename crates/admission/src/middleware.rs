//! axum middleware applying the gate to inbound requests
//!
//! ```ignore
//! let gate = Arc::new(AdmissionGate::new(&config.admission));
//! let app = Router::new()
//!     .fallback(handler)
//!     .layer(axum::middleware::from_fn_with_state(gate, admission_layer));
//! ```
//!
//! The peer address is read from `ConnectInfo<SocketAddr>`, so serve with
//! `into_make_service_with_connect_info::<SocketAddr>()` to key by client IP.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::StatusCode;
use axum::http::header::{CONTENT_TYPE, RETRY_AFTER, USER_AGENT};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::debug;

use crate::assets::is_static_asset;
use crate::gate::{AdmissionGate, Decision, UNKNOWN_IDENTITY};

/// Run the gate, then either forward to `next` or answer 403/429 directly.
pub async fn admission_layer(
    State(gate): State<Arc<AdmissionGate>>,
    request: Request,
    next: Next,
) -> Response {
    if is_static_asset(request.uri().path()) {
        return next.run(request).await;
    }

    let identity = client_identity(&request);
    let agent = request
        .headers()
        .get(USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    match gate.check(&identity, agent) {
        Decision::Admit { remaining } => {
            debug!(identity = %identity, remaining, "admitted");
            next.run(request).await
        }
        Decision::Blocked { .. } => {
            (StatusCode::FORBIDDEN, [(CONTENT_TYPE, "text/plain")], "Blocked").into_response()
        }
        Decision::Throttled { retry_after } => {
            // Whole seconds, rounded up, never zero
            let secs = retry_after.as_millis().div_ceil(1000).max(1);
            (
                StatusCode::TOO_MANY_REQUESTS,
                [
                    (CONTENT_TYPE, "text/plain".to_owned()),
                    (RETRY_AFTER, secs.to_string()),
                ],
                "Too many requests",
            )
                .into_response()
        }
    }
}

/// Peer IP if the server recorded it, else the first `X-Forwarded-For`
/// entry, else `"unknown"`.
pub fn client_identity(request: &Request) -> String {
    if let Some(ConnectInfo(addr)) = request.extensions().get::<ConnectInfo<SocketAddr>>() {
        return addr.ip().to_string();
    }

    request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(UNKNOWN_IDENTITY)
        .to_owned()
}
