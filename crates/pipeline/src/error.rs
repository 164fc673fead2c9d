//! Terminal errors observed by pipeline callers

use std::fmt;
use std::time::Duration;

use reqwest::StatusCode;

use crate::notice::NavigationIntent;
use crate::policy::Classification;

/// Message used when a failed response carries no `message` field.
pub const GENERIC_FAILURE: &str = "An error occurred. Please try again.";

/// Terminal failure categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// No response from the server.
    Unreachable,
    /// 429; see `ClassifiedError::retry_after`.
    RateLimited,
    /// 401 and the credential refresh failed.
    AuthExpired,
    /// 5xx. Only seen through `Exhausted` after retries.
    ServerError,
    /// Any other 4xx; never retried.
    ClientError,
    /// Retry budget consumed by 401s or 5xx.
    Exhausted,
}

impl From<Classification> for ErrorKind {
    fn from(c: Classification) -> Self {
        match c {
            Classification::Unreachable => ErrorKind::Unreachable,
            Classification::RateLimited => ErrorKind::RateLimited,
            Classification::AuthExpired => ErrorKind::AuthExpired,
            Classification::ServerError => ErrorKind::ServerError,
            Classification::ClientError => ErrorKind::ClientError,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ErrorKind::Unreachable => "unreachable",
            ErrorKind::RateLimited => "rate limited",
            ErrorKind::AuthExpired => "authentication expired",
            ErrorKind::ServerError => "server error",
            ErrorKind::ClientError => "client error",
            ErrorKind::Exhausted => "retries exhausted",
        };
        f.write_str(label)
    }
}

/// The one error a caller sees when `send` fails.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct ClassifiedError {
    pub kind: ErrorKind,
    /// Status of the last response, if there was one.
    pub status: Option<StatusCode>,
    /// Human-readable text, same as the notice shown to the user.
    pub message: String,
    /// Server wait hint on 429, or the default hint.
    pub retry_after: Option<Duration>,
    /// Set when the session ended and the user must log in again.
    pub navigation: Option<NavigationIntent>,
    /// Retries performed before giving up.
    pub retries: u32,
}

impl ClassifiedError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            status: None,
            message: message.into(),
            retry_after: None,
            navigation: None,
            retries: 0,
        }
    }

    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_retry_after(mut self, wait: Duration) -> Self {
        self.retry_after = Some(wait);
        self
    }

    pub fn with_navigation(mut self, intent: NavigationIntent) -> Self {
        self.navigation = Some(intent);
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Whether the caller should send the user to the login page.
    pub fn ends_session(&self) -> bool {
        self.navigation.is_some()
    }
}

/// Pull `message` out of a JSON error body, falling back to the generic text.
pub fn message_from_body(body: &[u8]) -> String {
    serde_json::from_slice::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("message")
                .and_then(|m| m.as_str())
                .filter(|m| !m.is_empty())
                .map(str::to_owned)
        })
        .unwrap_or_else(|| GENERIC_FAILURE.to_owned())
}
