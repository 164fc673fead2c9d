//! The `TokenStore` contract

use std::future::Future;
use std::pin::Pin;

use crate::credential::CredentialPair;
use crate::error::Result;

/// Boxed future returned by store operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Holder of the session's current credential pair.
///
/// Implementations must tolerate concurrent calls from several in-flight
/// requests. No ordering is promised between concurrent writers; the last
/// write to complete is what `get` returns afterwards.
///
/// `clear` removes both tokens together and must be idempotent.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility (`Arc<dyn TokenStore>`).
pub trait TokenStore: Send + Sync {
    /// Current credential, if the session has one.
    fn get(&self) -> StoreFuture<'_, Option<CredentialPair>>;

    /// Replace the stored credential.
    fn set(&self, credential: CredentialPair) -> StoreFuture<'_, Result<()>>;

    /// Drop both tokens.
    fn clear(&self) -> StoreFuture<'_, Result<()>>;
}
