//! Alarm normalization.
//!
//! Turns the untyped JSON body of a CloudWatch alarm notification into a
//! [`NormalizedAlarm`] whose every field is a non-empty string. Normalization
//! never fails: each field has a fallback.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

/// Untyped key/value mapping decoded from an inbound message body.
pub type RawNotification = Map<String, Value>;

/// Maximum length, in characters, of a sanitized field.
pub const MAX_FIELD_LENGTH: usize = 1000;

/// Fallback account id.
pub const UNKNOWN_ACCOUNT: &str = "000000000000";
/// Fallback alarm name.
pub const UNKNOWN_ALARM: &str = "Unknown";
/// Fallback state.
pub const UNKNOWN_STATE: &str = "UNKNOWN";
/// Fallback for namespace and threshold.
pub const NOT_AVAILABLE: &str = "N/A";
/// Fallback region when neither the alarm nor the configuration names one.
pub const UNKNOWN_REGION: &str = "unknown";

const NO_DESCRIPTION: &str = "No description provided";
const NO_REASON: &str = "No reason provided";

/// Alarm fields after validation and sanitization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NormalizedAlarm {
    /// Account the alarm belongs to.
    pub account_id: String,
    /// Sanitized, markdown-escaped alarm name for display.
    pub alarm_name: String,
    /// Alarm name as received; only used to build console links.
    pub alarm_name_raw: String,
    /// Sanitized alarm description.
    pub description: String,
    /// Sanitized reason for the state change.
    pub reason: String,
    /// When the state changed.
    pub timestamp: String,
    /// New state, upper-cased.
    pub state: String,
    /// Sanitized metric namespace.
    pub namespace: String,
    /// Threshold the metric crossed.
    pub threshold: String,
    /// Region the alarm lives in.
    pub region: String,
}

/// Normalizes a raw notification, stamping missing timestamps with the current time.
#[must_use]
pub fn normalize(raw: &RawNotification, default_region: &str) -> NormalizedAlarm {
    normalize_at(raw, default_region, Utc::now())
}

/// Normalizes a raw notification using `now` as the fallback timestamp.
#[must_use]
pub fn normalize_at(
    raw: &RawNotification,
    default_region: &str,
    now: DateTime<Utc>,
) -> NormalizedAlarm {
    let alarm_name_raw = match field(raw, "AlarmName").map(stringify) {
        Some(name) if !name.trim().is_empty() => name,
        _ => UNKNOWN_ALARM.to_string(),
    };

    let default_region = default_region.trim();
    let region_fallback = if default_region.is_empty() {
        UNKNOWN_REGION
    } else {
        default_region
    };

    NormalizedAlarm {
        account_id: text_or(raw, "AWSAccountId", UNKNOWN_ACCOUNT),
        alarm_name: sanitized_or(&alarm_name_raw, UNKNOWN_ALARM),
        description: sanitized_field_or(raw, "AlarmDescription", NO_DESCRIPTION),
        reason: sanitized_field_or(raw, "NewStateReason", NO_REASON),
        timestamp: timestamp_or_now(raw, now),
        state: text_or(raw, "NewStateValue", UNKNOWN_STATE).to_uppercase(),
        namespace: sanitized_field_or(raw, "Namespace", NOT_AVAILABLE),
        threshold: text_or(raw, "Threshold", NOT_AVAILABLE),
        region: text_or(raw, "Region", region_fallback),
        alarm_name_raw,
    }
}

/// Sanitizes text for display in a card.
///
/// Line endings become `\n`, markdown markers (`*`, `_`, backtick) are
/// backslash-escaped unless already escaped, surrounding whitespace is
/// trimmed and the result is capped at `max_length` characters.
/// Applying it twice gives the same result as applying it once.
#[must_use]
pub fn sanitize(text: &str, max_length: usize) -> String {
    let normalized = text.replace("\r\n", "\n").replace('\r', "\n");

    let mut escaped = String::with_capacity(normalized.len());
    let mut prev = None;
    for c in normalized.chars() {
        if matches!(c, '*' | '_' | '`') && prev != Some('\\') {
            escaped.push('\\');
        }
        escaped.push(c);
        prev = Some(c);
    }

    let truncated: String = escaped.trim().chars().take(max_length).collect();
    truncated.trim_end().to_string()
}

/// Renders a JSON value as text: strings verbatim, everything else as JSON.
#[must_use]
pub fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn field<'a>(raw: &'a RawNotification, key: &str) -> Option<&'a Value> {
    raw.get(key).filter(|v| !v.is_null())
}

fn text_or(raw: &RawNotification, key: &str, fallback: &str) -> String {
    field(raw, key)
        .map(stringify)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| fallback.to_string())
}

fn sanitized_or(text: &str, fallback: &str) -> String {
    let sanitized = sanitize(text, MAX_FIELD_LENGTH);
    if sanitized.is_empty() {
        sanitize(fallback, MAX_FIELD_LENGTH)
    } else {
        sanitized
    }
}

fn sanitized_field_or(raw: &RawNotification, key: &str, fallback: &str) -> String {
    let text = field(raw, key).map_or_else(|| fallback.to_string(), stringify);
    sanitized_or(&text, fallback)
}

fn timestamp_or_now(raw: &RawNotification, now: DateTime<Utc>) -> String {
    match field(raw, "StateChangeTime") {
        Some(Value::String(s)) if is_timestamp(s.trim()) => s.trim().to_string(),
        _ => now.to_rfc3339_opts(SecondsFormat::Micros, false),
    }
}

/// CloudWatch sends `2024-05-01T12:00:00.000+0000`, which is not strict RFC 3339.
fn is_timestamp(s: &str) -> bool {
    DateTime::parse_from_rfc3339(s).is_ok()
        || DateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f%z").is_ok()
}
