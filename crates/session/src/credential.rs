//! The credential pair held by a client session

use common::Secret;
use serde::{Deserialize, Serialize};

/// Access token plus optional refresh token.
///
/// The access token is the bearer secret attached to every outbound call.
/// The refresh token is optional because many backends keep the refresh
/// secret in a session cookie and never hand it to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialPair {
    access: Secret<String>,
    refresh: Option<Secret<String>>,
}

impl CredentialPair {
    pub fn new(access: impl Into<String>, refresh: Option<String>) -> Self {
        Self {
            access: Secret::new(access.into()),
            refresh: refresh.map(Secret::new),
        }
    }

    /// Pair with only an access token.
    pub fn access_only(access: impl Into<String>) -> Self {
        Self::new(access, None)
    }

    pub fn access_token(&self) -> &str {
        self.access.expose()
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh.as_ref().map(|r| r.expose().as_str())
    }

    /// Value for the `Authorization` header.
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.access.expose())
    }
}

/// On-disk shape. Kept separate so `Secret` never needs serde impls.
#[derive(Serialize, Deserialize)]
pub(crate) struct StoredCredential {
    #[serde(rename = "accessToken")]
    pub access_token: String,
    #[serde(rename = "refreshToken", default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

impl From<&CredentialPair> for StoredCredential {
    fn from(pair: &CredentialPair) -> Self {
        Self {
            access_token: pair.access_token().to_owned(),
            refresh_token: pair.refresh_token().map(str::to_owned),
        }
    }
}

impl From<StoredCredential> for CredentialPair {
    fn from(stored: StoredCredential) -> Self {
        CredentialPair::new(stored.access_token, stored.refresh_token)
    }
}
