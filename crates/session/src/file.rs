//! File-backed token store
//!
//! Persists the current credential pair as a small JSON document. All writes
//! use atomic temp-file + rename to prevent a torn file on crash. A tokio
//! Mutex serializes writers; reads are served from the in-memory copy.
//!
//! `clear` deletes the file, so a cleared session stays cleared across
//! restarts.

use std::path::{Path, PathBuf};

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::credential::{CredentialPair, StoredCredential};
use crate::error::{Error, Result};
use crate::store::{StoreFuture, TokenStore};

pub struct FileTokenStore {
    path: PathBuf,
    state: Mutex<Option<CredentialPair>>,
}

impl FileTokenStore {
    /// Open the store at `path`.
    ///
    /// A missing file is a logged-out session, not an error. The file is not
    /// created until the first `set`.
    pub async fn load(path: PathBuf) -> Result<Self> {
        let state = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => {
                let stored: StoredCredential = serde_json::from_str(&contents)
                    .map_err(|e| Error::CredentialParse(format!("parsing token file: {e}")))?;
                info!(path = %path.display(), "loaded session credential");
                Some(CredentialPair::from(stored))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "no token file, starting logged out");
                None
            }
            Err(e) => return Err(Error::Io(format!("reading token file: {e}"))),
        };

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TokenStore for FileTokenStore {
    fn get(&self) -> StoreFuture<'_, Option<CredentialPair>> {
        Box::pin(async move { self.state.lock().await.clone() })
    }

    fn set(&self, credential: CredentialPair) -> StoreFuture<'_, Result<()>> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            write_atomic(&self.path, &StoredCredential::from(&credential)).await?;
            *state = Some(credential);
            debug!("credential persisted");
            Ok(())
        })
    }

    fn clear(&self) -> StoreFuture<'_, Result<()>> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            *state = None;
            match tokio::fs::remove_file(&self.path).await {
                Ok(()) => {
                    debug!(path = %self.path.display(), "token file removed");
                    Ok(())
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(Error::Io(format!("removing token file: {e}"))),
            }
        })
    }
}

/// Write the credential to a file atomically.
///
/// Writes to a temporary file in the same directory, then renames it over
/// the target. Sets file permissions to 0600 (owner read/write only) since
/// the file contains bearer tokens.
async fn write_atomic(path: &Path, data: &StoredCredential) -> Result<()> {
    let json = serde_json::to_string_pretty(data)
        .map_err(|e| Error::CredentialParse(format!("serializing credential: {e}")))?;

    let dir = path
        .parent()
        .ok_or_else(|| Error::Io("token path has no parent directory".into()))?;

    let tmp_path = dir.join(format!(".session.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::Io(format!("writing temp token file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Io(format!("setting token file permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Io(format!("renaming temp token file: {e}")))?;

    Ok(())
}
