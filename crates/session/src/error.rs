//! Error types for credential storage

/// Errors from token store operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("credential parse error: {0}")]
    CredentialParse(String),
}

/// Result alias for token store operations.
pub type Result<T> = std::result::Result<T, Error>;
