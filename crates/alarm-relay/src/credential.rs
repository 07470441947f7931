//! Webhook credential resolution.
//!
//! The webhook URL lives in a secret store. [`WebhookCredentialResolver`]
//! fetches it once, validates it and caches it for the lifetime of the
//! process; only an explicit refresh replaces the cached value.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use relay_secrets::{SecretId, SecretSource, SecretValue};
use serde_json::Value;
use tracing::{debug, error, info};
use url::Url;

use crate::config::SECRET_NAME_VAR;
use crate::error::{RelayError, Result};

/// Keys searched, in order, when the secret is a key/value mapping.
const URL_KEYS: [&str; 3] = ["webhook_url", "url", "value"];

/// A validated webhook URL: `https` with a non-empty host.
#[derive(Clone, PartialEq, Eq)]
pub struct WebhookUrl(Url);

impl WebhookUrl {
    /// Validates a candidate webhook URL.
    ///
    /// # Errors
    ///
    /// Returns `RelayError::Configuration` if the candidate is not an `https`
    /// URL with a host.
    pub fn parse(candidate: &str) -> Result<Self> {
        let invalid =
            || RelayError::configuration("Webhook URL must be an https URL with a hostname");

        let url = Url::parse(candidate.trim()).map_err(|_| invalid())?;
        if url.scheme() != "https" || url.host_str().is_none_or(str::is_empty) {
            return Err(invalid());
        }
        Ok(Self(url))
    }

    /// Returns the full URL. Callers must not log the result.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Returns the host, which is safe to log.
    #[must_use]
    pub fn host(&self) -> &str {
        self.0.host_str().unwrap_or_default()
    }
}

impl fmt::Debug for WebhookUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // The path carries the webhook token.
        f.debug_struct("WebhookUrl")
            .field("host", &self.host())
            .field("path", &"[REDACTED]")
            .finish()
    }
}

/// Resolves and caches the webhook URL.
pub struct WebhookCredentialResolver {
    secret_name: String,
    source: Arc<dyn SecretSource>,
    cache: Mutex<Option<WebhookUrl>>,
}

impl WebhookCredentialResolver {
    /// Creates a resolver reading the secret named `secret_name` from `source`.
    #[must_use]
    pub fn new(secret_name: impl Into<String>, source: Arc<dyn SecretSource>) -> Self {
        Self {
            secret_name: secret_name.into(),
            source,
            cache: Mutex::new(None),
        }
    }

    /// Returns the name of the secret holding the webhook URL.
    #[must_use]
    pub fn secret_name(&self) -> &str {
        &self.secret_name
    }

    /// Returns the webhook URL, fetching it on a cache miss or when forced.
    ///
    /// The cache lock is held across the fetch, so concurrent misses fetch once.
    ///
    /// # Errors
    ///
    /// Returns `RelayError::Configuration` if no secret name is configured or
    /// the secret does not hold a valid webhook URL, and
    /// `RelayError::Processing` if the secret store fails.
    pub fn resolve(&self, force_refresh: bool) -> Result<WebhookUrl> {
        let secret_name = self.secret_name.trim();
        if secret_name.is_empty() {
            return Err(RelayError::configuration(format!(
                "{SECRET_NAME_VAR} variable is required"
            )));
        }

        let mut cache = self.cache.lock();
        if !force_refresh {
            if let Some(url) = cache.as_ref() {
                return Ok(url.clone());
            }
        }

        let id = SecretId::new(secret_name).map_err(|e| {
            RelayError::configuration(format!("Invalid webhook secret name '{secret_name}': {e}"))
        })?;

        let secret = self.source.fetch(&id).map_err(|e| {
            let message =
                format!("Unexpected error retrieving secret '{secret_name}' for webhook");
            error!(secret_name, error = %e, "{}", message);
            RelayError::Processing {
                message,
                source: Some(Box::new(e)),
            }
        })?;

        let candidate = extract_url(&secret).ok_or_else(|| {
            RelayError::configuration(format!(
                "Secret '{secret_name}' does not contain a webhook URL"
            ))
        })?;
        let url = WebhookUrl::parse(&candidate)?;

        if force_refresh {
            info!(secret_name, host = url.host(), "webhook URL refreshed");
        } else {
            debug!(secret_name, host = url.host(), "webhook URL cached");
        }
        *cache = Some(url.clone());
        Ok(url)
    }

    /// Drops the cached URL so the next resolve fetches it again.
    pub fn invalidate(&self) {
        *self.cache.lock() = None;
    }

    /// Returns the cached URL without fetching.
    #[must_use]
    pub fn cached(&self) -> Option<WebhookUrl> {
        self.cache.lock().clone()
    }
}

impl fmt::Debug for WebhookCredentialResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebhookCredentialResolver")
            .field("secret_name", &self.secret_name)
            .field("source", &self.source)
            .field("cached", &self.cache.lock().is_some())
            .finish()
    }
}

/// Pulls the URL out of a secret: a JSON object is searched for the first
/// non-blank string under [`URL_KEYS`]; anything else is taken verbatim.
fn extract_url(secret: &SecretValue) -> Option<String> {
    let text = secret.expose().trim();

    let candidate = match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => URL_KEYS
            .iter()
            .filter_map(|key| map.get(*key).and_then(Value::as_str))
            .map(str::trim)
            .find(|s| !s.is_empty())
            .map(str::to_string),
        Ok(Value::String(s)) => Some(s.trim().to_string()),
        _ => Some(text.to_string()),
    };

    candidate.filter(|s| !s.is_empty())
}
