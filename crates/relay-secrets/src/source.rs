//! Secret sources.
//!
//! This module provides the [`SecretSource`] trait and the sources the relay
//! ships with. A managed secret store client plugs in by implementing the trait.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde_json::Value;
use tracing::debug;

use crate::error::{Error, Result};
use crate::types::{SecretId, SecretValue};

/// Read-only lookup of secrets by identifier.
///
/// Structured secrets (key/value mappings) are returned as their JSON text;
/// interpreting the structure is left to the caller.
pub trait SecretSource: Send + Sync + fmt::Debug {
    /// Fetches the current value of a secret.
    ///
    /// # Errors
    ///
    /// Returns `Error::SecretNotFound` if no secret has this identifier, or a
    /// source-specific error if the backing store cannot be read.
    fn fetch(&self, id: &SecretId) -> Result<SecretValue>;
}

/// An in-memory secret source.
#[derive(Default)]
pub struct MemorySecretSource {
    secrets: RwLock<HashMap<SecretId, SecretValue>>,
}

impl MemorySecretSource {
    /// Creates an empty source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores or replaces a secret.
    pub fn put(&self, id: &SecretId, value: impl Into<String>) {
        let mut secrets = self
            .secrets
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        secrets.insert(id.clone(), SecretValue::new(value));
    }

}

impl fmt::Debug for MemorySecretSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let count = self
            .secrets
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len();
        f.debug_struct("MemorySecretSource")
            .field("secrets", &count)
            .finish()
    }
}

impl SecretSource for MemorySecretSource {
    fn fetch(&self, id: &SecretId) -> Result<SecretValue> {
        let secrets = self
            .secrets
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        secrets.get(id).cloned().ok_or_else(|| Error::SecretNotFound {
            id: id.to_string(),
        })
    }
}

/// A source backed by a JSON file mapping secret names to values.
///
/// Values may be strings or objects. The file is re-read on every fetch so a
/// rotated secret is visible to the next forced refresh.
///
/// ```json
/// {
///   "prod/teams-webhook": { "webhook_url": "https://example.webhook.office.com/..." },
///   "staging/teams-webhook": "https://example.webhook.office.com/..."
/// }
/// ```
#[derive(Debug, Clone)]
pub struct FileSecretSource {
    path: PathBuf,
}

impl FileSecretSource {
    /// Creates a source reading from `path`.
    #[must_use]
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Returns the backing file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<HashMap<String, Value>> {
        let content = std::fs::read_to_string(&self.path).map_err(|source| Error::Io {
            path: self.path.clone(),
            source,
        })?;
        Ok(serde_json::from_str(&content)?)
    }
}

impl SecretSource for FileSecretSource {
    fn fetch(&self, id: &SecretId) -> Result<SecretValue> {
        let mut secrets = self.load()?;
        debug!(path = %self.path.display(), count = secrets.len(), "loaded secrets file");

        match secrets.remove(id.as_str()) {
            Some(Value::String(s)) => Ok(SecretValue::new(s)),
            Some(Value::Null) | None => Err(Error::SecretNotFound {
                id: id.to_string(),
            }),
            Some(other) => Ok(SecretValue::new(other.to_string())),
        }
    }
}
