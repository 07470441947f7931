//! # Alarm Relay
//!
//! Relays CloudWatch alarm state changes, delivered as SNS batches, to a
//! Microsoft Teams webhook as adaptive cards.
//!
//! - **Normalization**: untyped alarm payloads become a [`NormalizedAlarm`]
//!   with sanitized, never-empty fields
//! - **Cards**: [`CardFormatter`] builds a deterministic adaptive card with a
//!   console deep link
//! - **Credentials**: [`WebhookCredentialResolver`] reads the webhook URL from a
//!   [`relay_secrets::SecretSource`] once and caches it
//! - **Delivery**: [`DeliveryClient`] posts cards with bounded retries
//! - **Batches**: [`AlarmRelay`] processes every record independently and
//!   reports per-record outcomes
//!
//! ## Example
//!
//! ```rust
//! use alarm_relay::{CardFormatter, StateStyle, normalize};
//! use serde_json::json;
//!
//! let raw = json!({"AlarmName": "HighCPU", "NewStateValue": "ALARM", "Region": "eu-west-1"});
//! let alarm = normalize(raw.as_object().expect("object"), "us-east-1");
//! let card = CardFormatter::new("us-east-1").format(&alarm, StateStyle::resolve(&alarm.state));
//!
//! assert_eq!(card.attachments.len(), 1);
//! assert_eq!(alarm.state, "ALARM");
//! ```

#![forbid(unsafe_code)]

pub mod alarm;
pub mod card;
pub mod config;
pub mod credential;
pub mod delivery;
pub mod error;
pub mod event;
pub mod relay;
pub mod style;

pub use alarm::{NormalizedAlarm, RawNotification, normalize, sanitize};
pub use card::{CardDocument, CardFormatter, ConsoleLink, RegionSource};
pub use config::RelayConfig;
pub use credential::{WebhookCredentialResolver, WebhookUrl};
pub use delivery::{
    DeliveryClient, DeliveryOutcome, HttpResponse, HttpTransport, ReqwestTransport, RetryPolicy,
    TransportError,
};
pub use error::{RelayError, Result};
pub use event::SnsEvent;
pub use relay::{
    AlarmRelay, BatchResult, RecordFailure, RecordOutcome, RecordSuccess, RelayResponse,
};
pub use style::{AlarmState, StateStyle};
