//! Credential refresh against the session refresh endpoint
//!
//! `POST <refresh_path>` with no body. The refresh secret travels in the
//! session (cookie or the current bearer), never in the request body. A 2xx
//! response may carry a new pair as JSON; if it does, the pair replaces the
//! stored one. A 2xx without a usable body keeps whatever is stored, which is
//! the cookie-bound case where the server rotated the session itself.
//!
//! Refresh bypasses the retry loop: a 401 from the refresh endpoint is a
//! refresh failure, not another refresh trigger.

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Method, StatusCode, Url};
use serde::Deserialize;
use session::{CredentialPair, TokenStore};
use tracing::{debug, info, warn};

use crate::config::PipelineConfig;
use crate::transport::{PreparedRequest, Transport, TransportError, dispatch_within};

/// Body returned by the refresh endpoint. Both key casings are accepted.
#[derive(Debug, Deserialize)]
struct RefreshResponse {
    #[serde(rename = "accessToken", alias = "access_token")]
    access_token: String,
    #[serde(rename = "refreshToken", alias = "refresh_token", default)]
    refresh_token: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum RefreshError {
    #[error("refresh endpoint returned {0}")]
    Rejected(StatusCode),

    #[error("refresh request failed: {0}")]
    Transport(#[from] TransportError),

    #[error("invalid refresh url: {0}")]
    Url(String),
}

/// Call the refresh endpoint and update `store` on success.
pub async fn refresh_credential(
    transport: &dyn Transport,
    config: &PipelineConfig,
    store: &dyn TokenStore,
) -> Result<(), RefreshError> {
    let url = Url::parse(&config.url_for(&config.refresh_path))
        .map_err(|e| RefreshError::Url(e.to_string()))?;

    let current = store.get().await;

    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    if let Some(pair) = &current {
        if let Ok(value) = HeaderValue::from_str(&pair.bearer()) {
            headers.insert(AUTHORIZATION, value);
        }
    }

    let response = dispatch_within(
        transport,
        PreparedRequest {
            method: Method::POST,
            url,
            headers,
            body: None,
        },
        config.timeout(),
    )
    .await;

    let response = match response {
        Ok(r) => r,
        Err(e) => {
            metrics::counter!("pipeline_refresh_total", "outcome" => "unreachable").increment(1);
            return Err(e.into());
        }
    };

    if !response.status.is_success() {
        metrics::counter!("pipeline_refresh_total", "outcome" => "rejected").increment(1);
        return Err(RefreshError::Rejected(response.status));
    }

    match serde_json::from_slice::<RefreshResponse>(&response.body) {
        Ok(tokens) => {
            // Keep the old refresh token if the server did not rotate it
            let refresh = tokens.refresh_token.or_else(|| {
                current
                    .as_ref()
                    .and_then(|p| p.refresh_token().map(str::to_owned))
            });
            if let Err(e) = store
                .set(CredentialPair::new(tokens.access_token, refresh))
                .await
            {
                warn!(error = %e, "failed to persist refreshed credential");
            }
            info!("credential refreshed");
        }
        Err(e) => {
            debug!(error = %e, "refresh succeeded without a token body, keeping session credential");
        }
    }

    metrics::counter!("pipeline_refresh_total", "outcome" => "success").increment(1);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{MockTransport, respond};
    use session::MemoryTokenStore;

    fn config() -> PipelineConfig {
        PipelineConfig::new("https://api.example.com")
    }

    #[tokio::test]
    async fn stores_returned_pair() {
        let transport = MockTransport::new(|_| {
            Ok(respond(200, r#"{"accessToken":"at_2","refreshToken":"rt_2"}"#, &[]))
        });
        let store = MemoryTokenStore::with_credential(CredentialPair::new("at_1", Some("rt_1".into())));

        refresh_credential(&transport, &config(), &store).await.unwrap();

        let pair = store.get().await.unwrap();
        assert_eq!(pair.access_token(), "at_2");
        assert_eq!(pair.refresh_token(), Some("rt_2"));

        let seen = transport.seen();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].request.method, Method::POST);
        assert_eq!(seen[0].path(), "/api/auth/refresh");
        assert!(seen[0].request.body.is_none());
    }

    #[tokio::test]
    async fn accepts_snake_case_keys() {
        let transport = MockTransport::new(|_| {
            Ok(respond(200, r#"{"access_token":"at_2","refresh_token":"rt_2"}"#, &[]))
        });
        let store = MemoryTokenStore::new();

        refresh_credential(&transport, &config(), &store).await.unwrap();
        assert_eq!(store.get().await.unwrap().access_token(), "at_2");
    }

    #[tokio::test]
    async fn keeps_refresh_token_when_not_rotated() {
        let transport =
            MockTransport::new(|_| Ok(respond(200, r#"{"accessToken":"at_2"}"#, &[])));
        let store = MemoryTokenStore::with_credential(CredentialPair::new("at_1", Some("rt_1".into())));

        refresh_credential(&transport, &config(), &store).await.unwrap();

        let pair = store.get().await.unwrap();
        assert_eq!(pair.access_token(), "at_2");
        assert_eq!(pair.refresh_token(), Some("rt_1"));
    }

    #[tokio::test]
    async fn bodiless_success_keeps_credential() {
        let transport = MockTransport::new(|_| Ok(respond(200, "", &[])));
        let store = MemoryTokenStore::with_credential(CredentialPair::access_only("at_1"));

        refresh_credential(&transport, &config(), &store).await.unwrap();
        assert_eq!(store.get().await.unwrap().access_token(), "at_1");
    }

    #[tokio::test]
    async fn rejection_leaves_store_untouched() {
        let transport = MockTransport::new(|_| Ok(respond(403, "{}", &[])));
        let store = MemoryTokenStore::with_credential(CredentialPair::access_only("at_1"));

        let err = refresh_credential(&transport, &config(), &store)
            .await
            .unwrap_err();
        assert!(matches!(err, RefreshError::Rejected(s) if s == StatusCode::FORBIDDEN));
        assert_eq!(store.get().await.unwrap().access_token(), "at_1");
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_endpoint_times_out_at_configured_deadline() {
        let transport = MockTransport::new(|_| Ok(respond(200, r#"{"accessToken":"late"}"#, &[])))
            .with_latency(std::time::Duration::from_secs(120));
        let store = MemoryTokenStore::with_credential(CredentialPair::access_only("at_1"));
        let mut config = config();
        config.timeout_secs = 3;

        let started = tokio::time::Instant::now();
        let err = refresh_credential(&transport, &config, &store)
            .await
            .unwrap_err();

        assert_eq!(started.elapsed(), std::time::Duration::from_secs(3));
        assert!(matches!(err, RefreshError::Transport(TransportError::Timeout(_))));
        assert_eq!(store.get().await.unwrap().access_token(), "at_1");
    }

    #[tokio::test]
    async fn transport_failure_is_reported() {
        let transport =
            MockTransport::new(|_| Err(TransportError::Timeout("deadline elapsed".into())));
        let store = MemoryTokenStore::new();

        let err = refresh_credential(&transport, &config(), &store)
            .await
            .unwrap_err();
        assert!(matches!(err, RefreshError::Transport(TransportError::Timeout(_))));
    }
}
