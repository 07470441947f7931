//! Relay configuration.
//!
//! Loaded from environment-style key/value pairs:
//! - `WEBHOOK_URL_SECRET_NAME` (required): name of the secret holding the webhook URL
//! - `AWS_REGION` (required): default region for alarms and console links
//! - `TIMEOUT_SECONDS` (optional): delivery timeout, falls back to 10 with a warning

use std::time::Duration;

use tracing::warn;

use crate::error::{RelayError, Result};

/// Environment key for the webhook secret name.
pub const SECRET_NAME_VAR: &str = "WEBHOOK_URL_SECRET_NAME";
/// Environment key for the default region.
pub const REGION_VAR: &str = "AWS_REGION";
/// Environment key for the delivery timeout.
pub const TIMEOUT_VAR: &str = "TIMEOUT_SECONDS";

/// Delivery timeout used when none (or an invalid one) is configured.
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Configuration for the alarm relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    /// Name of the secret holding the webhook URL.
    pub webhook_secret_name: String,
    /// Default region for alarms that do not carry one.
    pub region: String,
    /// Per-request delivery timeout.
    pub timeout: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            webhook_secret_name: String::new(),
            region: String::new(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl RelayConfig {
    /// Creates a configuration with the two required settings.
    #[must_use]
    pub fn new(webhook_secret_name: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            webhook_secret_name: webhook_secret_name.into(),
            region: region.into(),
            ..Self::default()
        }
    }

    /// Loads configuration from the process environment.
    ///
    /// Never fails; call [`RelayConfig::validate`] before use.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through an arbitrary key lookup.
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| lookup(key).map(|v| v.trim().to_string()).unwrap_or_default();

        Self {
            webhook_secret_name: read(SECRET_NAME_VAR),
            region: read(REGION_VAR),
            timeout: Duration::from_secs(parse_timeout_seconds(lookup(TIMEOUT_VAR).as_deref())),
        }
    }

    /// Sets the delivery timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Checks that the required settings are present.
    ///
    /// # Errors
    ///
    /// Returns `RelayError::Configuration` naming the first missing setting.
    pub fn validate(&self) -> Result<()> {
        if self.webhook_secret_name.trim().is_empty() {
            return Err(RelayError::configuration(format!(
                "{SECRET_NAME_VAR} variable is required"
            )));
        }

        if self.region.trim().is_empty() {
            return Err(RelayError::configuration(format!(
                "{REGION_VAR} environment variable is required"
            )));
        }

        if self.timeout.is_zero() {
            return Err(RelayError::configuration(format!(
                "{TIMEOUT_VAR} must be a positive integer"
            )));
        }

        Ok(())
    }
}

/// Parses a timeout in whole seconds, falling back to the default.
///
/// Missing values silently use the default; unparsable or non-positive values
/// use it with a warning.
#[must_use]
pub fn parse_timeout_seconds(raw: Option<&str>) -> u64 {
    let Some(raw) = raw else {
        return DEFAULT_TIMEOUT_SECS;
    };

    match raw.trim().parse::<i64>() {
        Ok(secs) if secs > 0 => secs as u64,
        Ok(_) => {
            warn!(
                raw_value = raw,
                default_value = DEFAULT_TIMEOUT_SECS,
                "TIMEOUT_SECONDS must be a positive integer; falling back to default"
            );
            DEFAULT_TIMEOUT_SECS
        }
        Err(_) => {
            warn!(
                raw_value = raw,
                default_value = DEFAULT_TIMEOUT_SECS,
                "Invalid TIMEOUT_SECONDS value provided; falling back to default"
            );
            DEFAULT_TIMEOUT_SECS
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use test_case::test_case;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn from_lookup_reads_all_keys() {
        let config = RelayConfig::from_lookup(lookup_from(&[
            (SECRET_NAME_VAR, "prod/teams-webhook"),
            (REGION_VAR, "eu-west-1"),
            (TIMEOUT_VAR, "5"),
        ]));

        assert_eq!(config.webhook_secret_name, "prod/teams-webhook");
        assert_eq!(config.region, "eu-west-1");
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn from_lookup_defaults_timeout() {
        let config = RelayConfig::from_lookup(lookup_from(&[]));
        assert_eq!(config.timeout, Duration::from_secs(DEFAULT_TIMEOUT_SECS));
    }

    #[test_case(None, 10 ; "missing")]
    #[test_case(Some("30"), 30 ; "valid")]
    #[test_case(Some(" 7 "), 7 ; "surrounding whitespace")]
    #[test_case(Some("0"), 10 ; "zero")]
    #[test_case(Some("-5"), 10 ; "negative")]
    #[test_case(Some("ten"), 10 ; "not a number")]
    #[test_case(Some("2.5"), 10 ; "fractional")]
    fn timeout_parsing(raw: Option<&str>, expected: u64) {
        assert_eq!(parse_timeout_seconds(raw), expected);
    }

    #[test]
    fn validate_requires_secret_name() {
        let config = RelayConfig::new("", "eu-west-1");
        let err = config.validate().expect_err("missing secret name");
        assert_eq!(err.to_string(), "WEBHOOK_URL_SECRET_NAME variable is required");
        assert_eq!(err.status_code(), 500);
    }

    #[test]
    fn validate_requires_region() {
        let config = RelayConfig::new("hook", "  ");
        let err = config.validate().expect_err("missing region");
        assert_eq!(err.to_string(), "AWS_REGION environment variable is required");
    }

    #[test]
    fn validate_rejects_zero_timeout() {
        let config = RelayConfig::new("hook", "eu-west-1").with_timeout(Duration::ZERO);
        let err = config.validate().expect_err("zero timeout");
        assert_eq!(err.to_string(), "TIMEOUT_SECONDS must be a positive integer");
    }
}
