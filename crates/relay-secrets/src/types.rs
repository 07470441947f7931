//! Core types for secret lookup.
//!
//! - [`SecretId`]: A validated name for a secret in a managed store
//! - [`SecretValue`]: Plaintext secret data that zeroizes on drop

use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{Error, Result};

/// A validated identifier for a secret.
///
/// Secret IDs must:
/// - Be between 1 and 2048 characters
/// - Contain only ASCII alphanumeric characters and `/ _ + = . @ - :`
///
/// The colon admits full ARNs such as
/// `arn:aws:secretsmanager:eu-west-1:123456789012:secret:teams-AbCdEf`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SecretId(String);

impl SecretId {
    /// Maximum length of a secret identifier.
    pub const MAX_LENGTH: usize = 2048;

    /// Punctuation allowed in identifiers besides alphanumerics.
    const ALLOWED_PUNCTUATION: &'static [char] = &['/', '_', '+', '=', '.', '@', '-', ':'];

    /// Creates a new `SecretId` after validating the input.
    ///
    /// # Errors
    ///
    /// Returns an error if the identifier is invalid.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        Self::validate(&id)?;
        Ok(Self(id))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(id: &str) -> Result<()> {
        if id.is_empty() {
            return Err(Error::InvalidSecretId {
                reason: "identifier cannot be empty".to_string(),
            });
        }

        if id.len() > Self::MAX_LENGTH {
            return Err(Error::InvalidSecretId {
                reason: format!(
                    "identifier exceeds maximum length of {} characters",
                    Self::MAX_LENGTH
                ),
            });
        }

        if let Some(c) = id
            .chars()
            .find(|c| !c.is_ascii_alphanumeric() && !Self::ALLOWED_PUNCTUATION.contains(c))
        {
            return Err(Error::InvalidSecretId {
                reason: format!(
                    "identifier contains invalid character '{c}'; only alphanumerics and '/_+=.@-:' are allowed"
                ),
            });
        }

        Ok(())
    }
}

impl fmt::Display for SecretId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for SecretId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<SecretId> for String {
    fn from(id: SecretId) -> Self {
        id.0
    }
}

impl AsRef<str> for SecretId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Plaintext secret value that securely zeroizes memory on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SecretValue {
    data: String,
}

impl SecretValue {
    /// Creates a new `SecretValue`.
    #[must_use]
    pub fn new(data: impl Into<String>) -> Self {
        Self { data: data.into() }
    }

    /// Returns the plaintext. Callers must not log the result.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.data
    }
}

impl fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretValue")
            .field("len", &self.data.len())
            .field("data", &"[REDACTED]")
            .finish()
    }
}
