//! Retry policy: failure classification, retry eligibility, backoff
//!
//! Everything here is pure. The pipeline feeds in what happened on the wire
//! and the current `Attempt`, and gets back a `Decision` telling it what to
//! do next. No clocks, no I/O, no shared state.

use std::time::Duration;

/// Retry budget shared by auth refreshes and server-error backoff.
pub const MAX_ATTEMPTS: u32 = 3;

/// Delay before the first server-error retry.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Wait hint surfaced on 429 when the server does not send `Retry-After`.
pub const DEFAULT_WAIT_HINT: Duration = Duration::from_secs(5);

/// What a single dispatch produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// No HTTP response at all (connect failure, timeout, broken body).
    NoResponse,
    /// A response with this status code.
    Status(u16),
}

/// Failure categories, in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Unreachable,
    RateLimited,
    AuthExpired,
    ServerError,
    ClientError,
}

impl Classification {
    pub fn label(&self) -> &'static str {
        match self {
            Classification::Unreachable => "unreachable",
            Classification::RateLimited => "rate_limited",
            Classification::AuthExpired => "auth_expired",
            Classification::ServerError => "server_error",
            Classification::ClientError => "client_error",
        }
    }
}

/// Retries already spent on one call chain.
///
/// Starts at zero for the first dispatch. Only `next()` moves it, so a value
/// observed by the loop never goes backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Attempt(u32);

impl Attempt {
    pub fn first() -> Self {
        Attempt(0)
    }

    /// Number of retries already performed.
    pub fn retries(&self) -> u32 {
        self.0
    }

    pub fn next(self) -> Self {
        Attempt(self.0.saturating_add(1))
    }
}

/// What the pipeline should do after a dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Hand the response to the caller.
    Deliver,
    /// Refresh the credential, then redispatch as `next`.
    Refresh { next: Attempt },
    /// Sleep `delay`, then redispatch as `next`.
    Backoff { next: Attempt, delay: Duration },
    /// Terminal without retrying.
    Surface(Classification),
    /// Retry-eligible, but the budget is spent.
    Exhausted(Classification),
}

/// Map a dispatch outcome to a failure class. `None` means success.
pub fn classify(outcome: Outcome) -> Option<Classification> {
    match outcome {
        Outcome::NoResponse => Some(Classification::Unreachable),
        Outcome::Status(429) => Some(Classification::RateLimited),
        Outcome::Status(401) => Some(Classification::AuthExpired),
        Outcome::Status(s) if s >= 500 => Some(Classification::ServerError),
        Outcome::Status(s) if s >= 400 => Some(Classification::ClientError),
        Outcome::Status(_) => None,
    }
}

/// Parse a `Retry-After` header given in whole seconds.
///
/// HTTP-date forms are ignored; callers fall back to `DEFAULT_WAIT_HINT`.
pub fn retry_after_hint(value: Option<&str>) -> Option<Duration> {
    value
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Backoff parameters plus the decision functions that use them.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    base_delay: Duration,
    max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_DELAY, MAX_ATTEMPTS)
    }
}

impl RetryPolicy {
    pub fn new(base_delay: Duration, max_attempts: u32) -> Self {
        Self {
            base_delay,
            max_attempts,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Only auth expiry and server errors are retried, and only while
    /// `attempt` has budget left.
    pub fn should_retry(&self, classification: Classification, attempt: Attempt) -> bool {
        matches!(
            classification,
            Classification::AuthExpired | Classification::ServerError
        ) && attempt.retries() < self.max_attempts
    }

    /// Delay before retry number `attempt` (1-based): `base * 2^(attempt-1)`.
    ///
    /// The exponent stops growing at the attempt budget. Attempt 0 is the
    /// initial dispatch and has no delay.
    pub fn delay_for(&self, attempt: Attempt) -> Duration {
        let n = attempt.retries().min(self.max_attempts.max(1));
        if n == 0 {
            return Duration::ZERO;
        }
        let factor = 1u32.checked_shl(n - 1).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }

    /// Combine classification, eligibility and delay into one decision.
    pub fn resolve(&self, outcome: Outcome, attempt: Attempt) -> Decision {
        let Some(classification) = classify(outcome) else {
            return Decision::Deliver;
        };

        match classification {
            Classification::AuthExpired | Classification::ServerError
                if !self.should_retry(classification, attempt) =>
            {
                Decision::Exhausted(classification)
            }
            Classification::AuthExpired => Decision::Refresh {
                next: attempt.next(),
            },
            Classification::ServerError => {
                let next = attempt.next();
                Decision::Backoff {
                    next,
                    delay: self.delay_for(next),
                }
            }
            other => Decision::Surface(other),
        }
    }
}
