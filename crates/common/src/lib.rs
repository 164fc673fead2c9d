//! Shared types for the edge resilience workspace
//!
//! Holds the configuration error type used by every config loader and the
//! `Secret` wrapper used for bearer and refresh tokens.

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
