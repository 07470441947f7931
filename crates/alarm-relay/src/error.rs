//! Error types for the alarm relay.
//!
//! Every variant maps to the HTTP-style status code reported for the record
//! (or batch) it fails.

use thiserror::Error;

/// Errors that can occur while relaying an alarm.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Missing or invalid setup: secret name, region, malformed secret value.
    #[error("{message}")]
    Configuration {
        /// Description of the configuration problem.
        message: String,
    },

    /// The SNS envelope or the alarm payload inside it is malformed.
    #[error("{message}")]
    InvalidPayload {
        /// Description of the payload problem.
        message: String,
    },

    /// The webhook rejected the card or could not be reached.
    #[error("{message}")]
    Delivery {
        /// Description reported by the delivery client.
        message: String,
        /// Status code reported by the delivery client.
        status_code: u16,
    },

    /// A collaborator failed unexpectedly.
    #[error("{message}")]
    Processing {
        /// Description of the failed operation.
        message: String,
        /// The underlying failure.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl RelayError {
    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates an invalid payload error.
    pub fn invalid_payload(message: impl Into<String>) -> Self {
        Self::InvalidPayload {
            message: message.into(),
        }
    }

    /// Returns the status code this error is reported with.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::InvalidPayload { .. } => 400,
            Self::Delivery { status_code, .. } => *status_code,
            Self::Configuration { .. } | Self::Processing { .. } => 500,
        }
    }
}

/// Result type for relay operations.
pub type Result<T> = std::result::Result<T, RelayError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn error_display_is_bare_message() {
        let err = RelayError::invalid_payload("SNS message must be a JSON object");
        assert_eq!(err.to_string(), "SNS message must be a JSON object");
    }

    #[test]
    fn status_codes() {
        assert_eq!(RelayError::configuration("x").status_code(), 500);
        assert_eq!(RelayError::invalid_payload("x").status_code(), 400);
        assert_eq!(
            RelayError::Delivery {
                message: "x".to_string(),
                status_code: 429,
            }
            .status_code(),
            429
        );
        assert_eq!(
            RelayError::Processing {
                message: "x".to_string(),
                source: None,
            }
            .status_code(),
            500
        );
    }

    #[test]
    fn processing_error_keeps_source() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = RelayError::Processing {
            message: "secret lookup failed".to_string(),
            source: Some(Box::new(io)),
        };
        let source = err.source().expect("source kept");
        assert_eq!(source.to_string(), "denied");
    }
}
