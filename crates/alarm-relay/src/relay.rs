//! Batch orchestration.
//!
//! [`AlarmRelay`] validates its configuration, then runs every record of an
//! SNS batch through normalize, style, resolve, format and deliver. Records
//! are processed in order and fail independently; the batch status is the
//! highest failure status, or 200 when every record was delivered. A batch
//! without records is rejected with 400.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use relay_secrets::SecretSource;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{error, info, warn};

use crate::alarm::{NormalizedAlarm, normalize};
use crate::card::{CardDocument, CardFormatter, RegionSource};
use crate::config::RelayConfig;
use crate::credential::WebhookCredentialResolver;
use crate::delivery::{DeliveryClient, HttpTransport};
use crate::error::{RelayError, Result};
use crate::event::{self, SnsEvent};
use crate::style::StateStyle;

/// Status reported for a fully delivered batch.
const OK_STATUS: u16 = 200;

/// Status reported for a batch without records.
const EMPTY_BATCH_STATUS: u16 = 400;

/// Error reported for a batch without records.
pub const EMPTY_BATCH_MESSAGE: &str = "SNS event did not contain any records";

/// A delivered record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordSuccess {
    /// Sanitized alarm name.
    pub alarm_name: String,
    /// Alarm state.
    pub alarm_state: String,
    /// Status returned by the webhook.
    pub status_code: u16,
    /// SNS message id.
    pub message_id: String,
}

/// A record that could not be delivered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordFailure {
    /// What went wrong.
    pub message: String,
    /// Status the failure is reported with.
    pub status_code: u16,
    /// SNS message id, or `unknown`.
    pub message_id: String,
    /// Extra detail for unexpected failures.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Outcome of one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    /// The card was accepted by the webhook.
    Delivered(RecordSuccess),
    /// The record failed.
    Failed(RecordFailure),
}

/// Ordered outcomes of a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchResult {
    /// One outcome per record, in input order.
    pub outcomes: Vec<RecordOutcome>,
}

impl BatchResult {
    /// Returns true if the batch had no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// 400 for an empty batch, else the highest failure status or 200.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        if self.is_empty() {
            return EMPTY_BATCH_STATUS;
        }
        self.failures()
            .map(|f| f.status_code)
            .max()
            .unwrap_or(OK_STATUS)
    }

    /// Delivered records, in input order.
    pub fn successes(&self) -> impl Iterator<Item = &RecordSuccess> {
        self.outcomes.iter().filter_map(|o| match o {
            RecordOutcome::Delivered(s) => Some(s),
            RecordOutcome::Failed(_) => None,
        })
    }

    /// Failed records, in input order.
    pub fn failures(&self) -> impl Iterator<Item = &RecordFailure> {
        self.outcomes.iter().filter_map(|o| match o {
            RecordOutcome::Failed(f) => Some(f),
            RecordOutcome::Delivered(_) => None,
        })
    }

    /// Builds the response for this batch.
    #[must_use]
    pub fn into_response(self) -> RelayResponse {
        if self.is_empty() {
            return RelayResponse::error(EMPTY_BATCH_STATUS, EMPTY_BATCH_MESSAGE);
        }

        let status_code = self.status_code();
        let successes: Vec<&RecordSuccess> = self.successes().collect();
        let failures: Vec<&RecordFailure> = self.failures().collect();

        let body = if failures.is_empty() {
            json!({
                "message": format!("Processed {} alarm notification(s)", successes.len()),
                "successes": successes,
            })
        } else {
            let mut body = json!({
                "error": "One or more notifications failed",
                "failures": failures,
            });
            if !successes.is_empty() {
                body["successes"] = json!(successes);
            }
            body
        };

        RelayResponse {
            status_code,
            body: body.to_string(),
        }
    }
}

/// Response to an SNS event: a status and a JSON-encoded body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelayResponse {
    /// Overall status.
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    /// JSON text.
    pub body: String,
}

impl RelayResponse {
    /// A response whose body is `{"error": message}`.
    #[must_use]
    pub fn error(status_code: u16, message: &str) -> Self {
        Self {
            status_code,
            body: json!({ "error": message }).to_string(),
        }
    }

    /// Decodes the body.
    ///
    /// # Errors
    ///
    /// Returns an error if the body is not valid JSON.
    pub fn body_json(&self) -> serde_json::Result<Value> {
        serde_json::from_str(&self.body)
    }
}

/// Relays SNS alarm notifications to the webhook.
#[derive(Debug)]
pub struct AlarmRelay {
    config: RelayConfig,
    credentials: WebhookCredentialResolver,
    formatter: CardFormatter,
    delivery: DeliveryClient,
}

impl AlarmRelay {
    /// Wires a relay from its configuration, secret store and HTTP transport.
    #[must_use]
    pub fn new(
        config: RelayConfig,
        secrets: Arc<dyn SecretSource>,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        let credentials =
            WebhookCredentialResolver::new(config.webhook_secret_name.clone(), secrets);
        let formatter = CardFormatter::new(config.region.clone());
        let delivery = DeliveryClient::new(transport).with_default_timeout(config.timeout);
        Self {
            config,
            credentials,
            formatter,
            delivery,
        }
    }

    /// Replaces the delivery client.
    #[must_use]
    pub fn with_delivery(mut self, delivery: DeliveryClient) -> Self {
        self.delivery = delivery;
        self
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Returns the credential resolver.
    #[must_use]
    pub const fn credentials(&self) -> &WebhookCredentialResolver {
        &self.credentials
    }

    /// Handles a whole SNS event.
    #[must_use]
    pub fn handle_event(&self, event: &SnsEvent) -> RelayResponse {
        if let Err(e) = self.config.validate() {
            error!(error = %e, "Environment validation failed");
            return RelayResponse::error(e.status_code(), &e.to_string());
        }

        self.process(&event.records).into_response()
    }

    /// Processes records in order; one failing record never stops the rest.
    ///
    /// An empty slice yields an empty result whose status is 400.
    #[must_use]
    pub fn process(&self, records: &[Value]) -> BatchResult {
        if records.is_empty() {
            error!("{}", EMPTY_BATCH_MESSAGE);
        }

        let outcomes = records
            .iter()
            .map(|record| self.process_guarded(record))
            .collect();
        BatchResult { outcomes }
    }

    fn process_guarded(&self, record: &Value) -> RecordOutcome {
        let message_id = event::message_id(record);

        match panic::catch_unwind(AssertUnwindSafe(|| self.process_record(record))) {
            Ok(Ok(success)) => RecordOutcome::Delivered(success),
            Ok(Err(e)) => {
                let status_code = e.status_code();
                error!(
                    error_message = %e,
                    message_id,
                    status_code,
                    "Failed to process SNS record"
                );
                RecordOutcome::Failed(RecordFailure {
                    message: e.to_string(),
                    status_code,
                    message_id,
                    detail: None,
                })
            }
            Err(payload) => {
                let detail = panic_detail(payload.as_ref());
                error!(
                    message_id,
                    error_message = detail,
                    "Unexpected error processing SNS record"
                );
                RecordOutcome::Failed(RecordFailure {
                    message: "Unexpected error processing SNS record".to_string(),
                    status_code: 500,
                    message_id,
                    detail: Some(detail),
                })
            }
        }
    }

    /// Delivers a single record.
    ///
    /// # Errors
    ///
    /// Returns `RelayError::InvalidPayload` for malformed records, the
    /// resolver's error when the webhook URL is unavailable, and
    /// `RelayError::Delivery` when the webhook rejects the card.
    pub fn process_record(&self, record: &Value) -> Result<RecordSuccess> {
        let message_id = event::message_id(record);
        let alarm = normalize(&event::alarm_payload(record)?, &self.config.region);

        info!(
            alarm_name = %alarm.alarm_name,
            alarm_state = %alarm.state,
            message_id,
            "Processing alarm notification"
        );

        let url = self.credentials.resolve(false)?;
        let card = self.card_for(&alarm, &message_id);

        let outcome = self.delivery.deliver(&card, &url, Some(self.config.timeout));
        if !outcome.success {
            return Err(RelayError::Delivery {
                message: outcome.message,
                status_code: outcome.status_code,
            });
        }

        info!(
            alarm_name = %alarm.alarm_name,
            alarm_state = %alarm.state,
            message_id,
            status_code = outcome.status_code,
            "Alarm notification delivered"
        );

        Ok(RecordSuccess {
            alarm_name: alarm.alarm_name,
            alarm_state: alarm.state,
            status_code: outcome.status_code,
            message_id,
        })
    }

    /// Builds the card for a record without resolving or delivering.
    ///
    /// # Errors
    ///
    /// Returns `RelayError::InvalidPayload` for malformed records.
    pub fn render(&self, record: &Value) -> Result<CardDocument> {
        let message_id = event::message_id(record);
        let alarm = normalize(&event::alarm_payload(record)?, &self.config.region);
        Ok(self.card_for(&alarm, &message_id))
    }

    fn card_for(&self, alarm: &NormalizedAlarm, message_id: &str) -> CardDocument {
        let style = StateStyle::for_state(&alarm.state).unwrap_or_else(|| {
            warn!(
                alarm_state = %alarm.state,
                message_id,
                "Unknown alarm state received; default styling applied"
            );
            StateStyle::resolve(&alarm.state)
        });

        let link = self.formatter.console_link(alarm);
        if link.region_source == RegionSource::Fallback {
            warn!(
                region = %link.region,
                message_id,
                "No region known for alarm; console link uses the fallback region"
            );
        }

        self.formatter.format(alarm, style)
    }
}

fn panic_detail(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn success(name: &str) -> RecordOutcome {
        RecordOutcome::Delivered(RecordSuccess {
            alarm_name: name.to_string(),
            alarm_state: "ALARM".to_string(),
            status_code: 200,
            message_id: format!("id-{name}"),
        })
    }

    fn failure(status_code: u16) -> RecordOutcome {
        RecordOutcome::Failed(RecordFailure {
            message: "boom".to_string(),
            status_code,
            message_id: "unknown".to_string(),
            detail: None,
        })
    }

    #[test]
    fn all_successes_is_200() {
        let batch = BatchResult {
            outcomes: vec![success("a"), success("b")],
        };
        let response = batch.into_response();
        assert_eq!(response.status_code, 200);

        let body = response.body_json().expect("json body");
        assert_eq!(body["message"], "Processed 2 alarm notification(s)");
        assert_eq!(body["successes"][1]["alarm_name"], "b");
        assert!(body.get("error").is_none());
    }

    #[test]
    fn empty_batch_is_400() {
        let batch = BatchResult::default();
        assert!(batch.is_empty());
        assert_eq!(batch.status_code(), 400);

        let response = batch.into_response();
        assert_eq!(response.status_code, 400);
        assert_eq!(
            response.body_json().expect("json body"),
            json!({"error": "SNS event did not contain any records"})
        );
    }

    #[test]
    fn status_is_max_failure() {
        let batch = BatchResult {
            outcomes: vec![failure(400), success("a"), failure(503), failure(408)],
        };
        assert_eq!(batch.status_code(), 503);
        assert_eq!(batch.failures().count(), 3);
        assert_eq!(batch.successes().count(), 1);
    }

    #[test]
    fn failure_body_includes_successes_when_present() {
        let response = BatchResult {
            outcomes: vec![success("a"), failure(500)],
        }
        .into_response();
        let body = response.body_json().expect("json body");
        assert_eq!(body["error"], "One or more notifications failed");
        assert_eq!(body["failures"][0]["status_code"], 500);
        assert!(body["failures"][0].get("detail").is_none());
        assert_eq!(body["successes"][0]["message_id"], "id-a");
    }

    #[test]
    fn failure_body_omits_empty_successes() {
        let response = BatchResult {
            outcomes: vec![failure(400)],
        }
        .into_response();
        assert_eq!(response.status_code, 400);
        let body = response.body_json().expect("json body");
        assert!(body.get("successes").is_none());
    }

    #[test]
    fn error_response_shape() {
        let response = RelayResponse::error(400, "SNS event did not contain any records");
        let json = serde_json::to_value(&response).expect("serialize");
        assert_eq!(json["statusCode"], 400);
        assert_eq!(
            response.body_json().expect("json body"),
            json!({"error": "SNS event did not contain any records"})
        );
    }

    #[test]
    fn panic_detail_reads_messages() {
        let from_str: Box<dyn Any + Send> = Box::new("static message");
        let from_string: Box<dyn Any + Send> = Box::new("owned".to_string());
        let other: Box<dyn Any + Send> = Box::new(42_u8);
        assert_eq!(panic_detail(from_str.as_ref()), "static message");
        assert_eq!(panic_detail(from_string.as_ref()), "owned");
        assert_eq!(panic_detail(other.as_ref()), "unknown panic");
    }

    #[test]
    fn relay_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<AlarmRelay>();
    }
}
