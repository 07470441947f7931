//! SNS event envelope.
//!
//! Records are kept as raw JSON so that a malformed record fails on its own
//! instead of rejecting the whole batch.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::alarm::RawNotification;
use crate::error::{RelayError, Result};

/// Message id reported when a record does not carry one.
pub const UNKNOWN_MESSAGE_ID: &str = "unknown";

/// A batch of SNS records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnsEvent {
    /// The records, in delivery order.
    #[serde(rename = "Records", default)]
    pub records: Vec<Value>,
}

impl SnsEvent {
    /// Creates an event from raw records.
    #[must_use]
    pub const fn new(records: Vec<Value>) -> Self {
        Self { records }
    }

    /// Parses an event from JSON text.
    ///
    /// # Errors
    ///
    /// Returns `RelayError::InvalidPayload` if the text is not a JSON object
    /// or `Records` is not an array.
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|e| RelayError::invalid_payload(format!("Invalid SNS event: {e}")))
    }
}

fn sns(record: &Value) -> Option<&serde_json::Map<String, Value>> {
    record.get("Sns").and_then(Value::as_object)
}

/// Best-effort message id of a record; never fails.
#[must_use]
pub fn message_id(record: &Value) -> String {
    sns(record)
        .and_then(|sns| sns.get("MessageId"))
        .and_then(Value::as_str)
        .unwrap_or(UNKNOWN_MESSAGE_ID)
        .to_string()
}

/// Decodes the alarm notification carried in a record's `Sns.Message`.
///
/// # Errors
///
/// Returns `RelayError::InvalidPayload` if the record has no `Sns` object,
/// no string `Message`, or a message that is not a JSON object.
pub fn alarm_payload(record: &Value) -> Result<RawNotification> {
    let sns = sns(record)
        .ok_or_else(|| RelayError::invalid_payload("SNS record missing required 'Sns' payload"))?;

    let message = sns.get("Message").and_then(Value::as_str).ok_or_else(|| {
        RelayError::invalid_payload("SNS record missing required 'Message' payload")
    })?;

    let payload: Value = serde_json::from_str(message)
        .map_err(|e| RelayError::invalid_payload(format!("Invalid JSON in SNS message: {e}")))?;

    match payload {
        Value::Object(map) => Ok(map),
        _ => Err(RelayError::invalid_payload(
            "SNS message must be a JSON object",
        )),
    }
}
