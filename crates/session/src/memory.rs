//! In-process token store

use tokio::sync::RwLock;
use tracing::debug;

use crate::credential::CredentialPair;
use crate::error::Result;
use crate::store::{StoreFuture, TokenStore};

/// Token store backed by a `RwLock<Option<CredentialPair>>`.
///
/// Reads clone the pair out of the lock so callers never hold it across
/// network I/O.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    state: RwLock<Option<CredentialPair>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with a credential (e.g. right after login).
    pub fn with_credential(credential: CredentialPair) -> Self {
        Self {
            state: RwLock::new(Some(credential)),
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn get(&self) -> StoreFuture<'_, Option<CredentialPair>> {
        Box::pin(async move { self.state.read().await.clone() })
    }

    fn set(&self, credential: CredentialPair) -> StoreFuture<'_, Result<()>> {
        Box::pin(async move {
            *self.state.write().await = Some(credential);
            debug!("credential replaced");
            Ok(())
        })
    }

    fn clear(&self) -> StoreFuture<'_, Result<()>> {
        Box::pin(async move {
            let previous = self.state.write().await.take();
            if previous.is_some() {
                debug!("credential cleared");
            }
            Ok(())
        })
    }
}
