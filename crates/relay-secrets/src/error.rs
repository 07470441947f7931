//! Error types for secret lookup.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while looking up secrets.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid secret identifier format.
    #[error("invalid secret id: {reason}")]
    InvalidSecretId {
        /// The reason the identifier is invalid.
        reason: String,
    },

    /// Secret not found in the source.
    #[error("secret not found: {id}")]
    SecretNotFound {
        /// The identifier of the secret that was not found.
        id: String,
    },

    /// The backing file could not be read.
    #[error("failed to read secrets from {}: {source}", path.display())]
    Io {
        /// Path of the secrets file.
        path: PathBuf,
        /// The underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// Serialization or deserialization failed.
    #[error("serialization error: {reason}")]
    SerializationError {
        /// The reason serialization failed.
        reason: String,
    },
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError {
            reason: err.to_string(),
        }
    }
}

/// Result type alias for secret operations.
pub type Result<T> = std::result::Result<T, Error>;
