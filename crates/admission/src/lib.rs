//! Server-edge admission control
//!
//! Runs before any request reaches application handlers:
//! 1. Requests for static assets bypass the gate entirely
//! 2. A `User-Agent` matching the blocklist gets 403 without consuming capacity
//! 3. A per-identity fixed-window counter admits up to `limit` requests per
//!    window and answers 429 after that
//! 4. Every request sweeps counters whose window has ended
//!
//! Counters live behind `CounterStore`; the in-process `InMemoryCounterStore`
//! is the only implementation and is not shared across processes.

pub mod assets;
pub mod block;
pub mod config;
pub mod gate;
pub mod middleware;
pub mod store;

pub use assets::is_static_asset;
pub use block::BlockRules;
pub use config::AdmissionConfig;
pub use gate::{AdmissionGate, Decision};
pub use middleware::{admission_layer, client_identity};
pub use store::{CounterStore, Hit, InMemoryCounterStore, WindowEntry, WindowKey};
