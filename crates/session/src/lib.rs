//! Client session credential storage
//!
//! Defines the `TokenStore` contract the request pipeline consumes: a single
//! current credential pair with `get`, `set` and `clear`. The store is owned
//! by the hosting session context and shared with the pipeline via `Arc`.
//!
//! Two implementations ship with the crate:
//! - `MemoryTokenStore` for in-process sessions and tests
//! - `FileTokenStore` for sessions that must survive restarts
//!
//! Concurrent writers are not coordinated beyond per-operation locking: the
//! last `set` or `clear` to complete wins.

pub mod credential;
pub mod error;
pub mod file;
pub mod memory;
pub mod store;

pub use credential::CredentialPair;
pub use error::{Error, Result};
pub use file::FileTokenStore;
pub use memory::MemoryTokenStore;
pub use store::TokenStore;
