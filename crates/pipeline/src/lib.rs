//! Client-side request pipeline
//!
//! Every outbound API call goes through `RequestPipeline::send`, which:
//! 1. Attaches the session's bearer token (if any) and a cache-busting nonce on GETs
//! 2. Dispatches through a `Transport`
//! 3. Classifies failures with `RetryPolicy`
//! 4. Refreshes the credential on 401, backs off and retries on 5xx
//! 5. Resolves to one final response or one `ClassifiedError`
//!
//! The pipeline never talks to a UI directly. User-visible messages go to a
//! `Notifier` (at most one per call) and session expiry produces a
//! `NavigationIntent` the caller's router executes.

pub mod config;
pub mod descriptor;
pub mod error;
pub mod notice;
pub mod pipeline;
pub mod policy;
pub mod refresh;
pub mod transport;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::PipelineConfig;
pub use descriptor::RequestDescriptor;
pub use error::{ClassifiedError, ErrorKind};
pub use notice::{LogNotifier, NavigationIntent, Notice, Notifier};
pub use pipeline::{ApiResponse, RequestPipeline};
pub use policy::{Attempt, Classification, Decision, Outcome, RetryPolicy};
pub use transport::{PreparedRequest, RawResponse, ReqwestTransport, Transport, TransportError};
