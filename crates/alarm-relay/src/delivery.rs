//! Webhook delivery with bounded retries.
//!
//! [`DeliveryClient::deliver`] posts a card and reports a [`DeliveryOutcome`];
//! ordinary failures (error statuses, timeouts, connection problems) are
//! reported, never returned as errors. Transient statuses are retried
//! according to a [`RetryPolicy`].

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{CONTENT_TYPE, RETRY_AFTER};
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::card::CardDocument;
use crate::config::DEFAULT_TIMEOUT_SECS;
use crate::credential::WebhookUrl;

/// Statuses that are retried by default.
pub const RETRYABLE_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

/// Maximum number of response body characters quoted in failure messages.
const BODY_PREVIEW_CHARS: usize = 200;

/// Status reported when a request times out.
const TIMEOUT_STATUS: u16 = 408;

/// Status reported for transport failures without an HTTP response.
const TRANSPORT_FAILURE_STATUS: u16 = 500;

/// When and how long to wait before retrying a POST.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay after the first failed attempt; doubles after each further one.
    pub backoff_factor: Duration,
    /// Upper bound on any single delay.
    pub max_backoff: Duration,
    /// Response statuses worth retrying.
    pub retryable_statuses: Vec<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_factor: Duration::from_millis(500),
            max_backoff: Duration::from_secs(10),
            retryable_statuses: RETRYABLE_STATUSES.to_vec(),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    #[must_use]
    pub fn no_retries() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Sets the backoff factor.
    #[must_use]
    pub const fn with_backoff_factor(mut self, factor: Duration) -> Self {
        self.backoff_factor = factor;
        self
    }

    /// Returns true if a response with this status should be retried.
    #[must_use]
    pub fn is_retryable(&self, status: u16) -> bool {
        self.retryable_statuses.contains(&status)
    }

    /// Returns true if another attempt may follow attempt number `attempt` (1-based).
    #[must_use]
    pub const fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Delay after failed attempt number `attempt` (1-based).
    ///
    /// A server-supplied `Retry-After` lengthens the delay but never past
    /// `max_backoff`.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let backoff = self.backoff_factor.saturating_mul(1_u32 << exponent);
        retry_after
            .map_or(backoff, |hint| hint.max(backoff))
            .min(self.max_backoff)
    }
}

/// A response from the webhook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body text.
    pub body: String,
    /// Parsed `Retry-After` header, when given in seconds.
    pub retry_after: Option<Duration>,
}

impl HttpResponse {
    /// Creates a response without a retry hint.
    #[must_use]
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            retry_after: None,
        }
    }
}

/// A request that produced no HTTP response.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The request did not finish within the timeout.
    #[error("request timed out: {0}")]
    Timeout(String),
    /// Any other transport failure (DNS, TLS, connection reset, ...).
    #[error("{0}")]
    Request(String),
}

/// A blocking HTTP POST of a JSON body.
pub trait HttpTransport: Send + Sync + fmt::Debug {
    /// Posts `body` to `url` with `Content-Type: application/json`.
    ///
    /// # Errors
    ///
    /// Returns `TransportError` if no HTTP response was received.
    fn post_json(
        &self,
        url: &str,
        body: &[u8],
        timeout: Duration,
    ) -> Result<HttpResponse, TransportError>;
}

/// [`HttpTransport`] over a shared blocking `reqwest` client.
///
/// The client keeps connections alive between attempts.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::blocking::Client,
}

impl ReqwestTransport {
    /// Builds a transport with a fresh client.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Request` if the TLS backend cannot be initialized.
    pub fn new() -> Result<Self, TransportError> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TransportError::Request(e.to_string()))?;
        Ok(Self { client })
    }

    /// Wraps an existing client.
    #[must_use]
    pub const fn with_client(client: reqwest::blocking::Client) -> Self {
        Self { client }
    }
}

impl HttpTransport for ReqwestTransport {
    fn post_json(
        &self,
        url: &str,
        body: &[u8],
        timeout: Duration,
    ) -> Result<HttpResponse, TransportError> {
        let response = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .timeout(timeout)
            .body(body.to_vec())
            .send()
            .map_err(classify)?;

        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        let body = response.text().unwrap_or_default();

        Ok(HttpResponse {
            status,
            body,
            retry_after,
        })
    }
}

fn classify(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout(err.to_string())
    } else {
        TransportError::Request(err.to_string())
    }
}

/// Result of a delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryOutcome {
    /// Whether the webhook accepted the card.
    pub success: bool,
    /// `Success`, or a description of the failure.
    pub message: String,
    /// Response status, 408 for timeouts, 500 for other transport failures.
    pub status_code: u16,
}

impl DeliveryOutcome {
    /// Creates a successful outcome.
    #[must_use]
    pub fn success(status_code: u16) -> Self {
        Self {
            success: true,
            message: "Success".to_string(),
            status_code,
        }
    }

    /// Creates a failed outcome.
    #[must_use]
    pub fn failure(message: impl Into<String>, status_code: u16) -> Self {
        Self {
            success: false,
            message: message.into(),
            status_code,
        }
    }
}

/// Posts cards to the webhook.
#[derive(Debug, Clone)]
pub struct DeliveryClient {
    transport: Arc<dyn HttpTransport>,
    policy: RetryPolicy,
    default_timeout: Duration,
}

impl DeliveryClient {
    /// Creates a client with the default retry policy and a 10 second timeout.
    #[must_use]
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            transport,
            policy: RetryPolicy::default(),
            default_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Sets the timeout used when `deliver` is not given one.
    #[must_use]
    pub const fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Returns the retry policy.
    #[must_use]
    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Timeout for one attempt; zero values fall back to the default.
    fn effective_timeout(&self, timeout: Option<Duration>) -> Duration {
        [timeout, Some(self.default_timeout)]
            .into_iter()
            .flatten()
            .find(|t| !t.is_zero())
            .unwrap_or(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    /// Posts a card to the webhook, retrying transient failures.
    pub fn deliver(
        &self,
        card: &CardDocument,
        url: &WebhookUrl,
        timeout: Option<Duration>,
    ) -> DeliveryOutcome {
        let timeout = self.effective_timeout(timeout);

        let body = match serde_json::to_vec(card) {
            Ok(body) => body,
            Err(e) => {
                let message = format!("Unexpected error sending to Teams: {e}");
                error!("{}", message);
                return DeliveryOutcome::failure(message, TRANSPORT_FAILURE_STATUS);
            }
        };

        let mut attempt = 0;
        loop {
            attempt += 1;
            debug!(host = url.host(), attempt, "posting card to webhook");

            match self.transport.post_json(url.as_str(), &body, timeout) {
                Ok(response)
                    if self.policy.is_retryable(response.status)
                        && self.policy.should_retry(attempt) =>
                {
                    let delay = self.policy.delay_for_attempt(attempt, response.retry_after);
                    warn!(
                        host = url.host(),
                        status_code = response.status,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "webhook returned retryable status; backing off"
                    );
                    std::thread::sleep(delay);
                }
                Ok(response) if response.status >= 400 => {
                    let preview: String = response.body.chars().take(BODY_PREVIEW_CHARS).collect();
                    let message = format!("Teams webhook returned {}: {preview}", response.status);
                    error!(status_code = response.status, attempt, "{}", message);
                    return DeliveryOutcome::failure(message, response.status);
                }
                Ok(response) => return DeliveryOutcome::success(response.status),
                Err(TransportError::Timeout(detail)) => {
                    let message = "Timeout sending webhook to Teams";
                    error!(timeout_ms = timeout.as_millis() as u64, detail, "{}", message);
                    return DeliveryOutcome::failure(message, TIMEOUT_STATUS);
                }
                Err(TransportError::Request(detail)) => {
                    let message = format!("Request error sending to Teams: {detail}");
                    error!("{}", message);
                    return DeliveryOutcome::failure(message, TRANSPORT_FAILURE_STATUS);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alarm::{RawNotification, normalize};
    use crate::card::CardFormatter;
    use crate::style::StateStyle;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use test_case::test_case;

    /// Replays scripted results and records every request.
    #[derive(Debug, Default)]
    struct ScriptedTransport {
        script: Mutex<VecDeque<Result<HttpResponse, TransportError>>>,
        requests: Mutex<Vec<(String, Vec<u8>, Duration)>>,
    }

    impl ScriptedTransport {
        fn new(script: Vec<Result<HttpResponse, TransportError>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                requests: Mutex::default(),
            })
        }

        fn calls(&self) -> usize {
            self.requests.lock().len()
        }
    }

    impl HttpTransport for ScriptedTransport {
        fn post_json(
            &self,
            url: &str,
            body: &[u8],
            timeout: Duration,
        ) -> Result<HttpResponse, TransportError> {
            self.requests
                .lock()
                .push((url.to_string(), body.to_vec(), timeout));
            self.script
                .lock()
                .pop_front()
                .unwrap_or_else(|| Ok(HttpResponse::new(200, "")))
        }
    }

    fn card() -> CardDocument {
        let alarm = normalize(&RawNotification::new(), "eu-west-1");
        CardFormatter::new("eu-west-1").format(&alarm, StateStyle::resolve(&alarm.state))
    }

    fn url() -> WebhookUrl {
        WebhookUrl::parse("https://example.webhook.office.com/hook").expect("valid url")
    }

    fn client(transport: Arc<ScriptedTransport>) -> DeliveryClient {
        DeliveryClient::new(transport)
            .with_policy(RetryPolicy::default().with_backoff_factor(Duration::ZERO))
    }

    #[test]
    fn success_reports_actual_status() {
        let transport = ScriptedTransport::new(vec![Ok(HttpResponse::new(202, "1"))]);
        let outcome = client(transport.clone()).deliver(&card(), &url(), None);

        assert_eq!(outcome, DeliveryOutcome::success(202));
        assert_eq!(outcome.message, "Success");
        assert_eq!(transport.calls(), 1);
    }

    #[test]
    fn posts_serialized_card_to_url() {
        let transport = ScriptedTransport::new(vec![]);
        let card = card();
        client(transport.clone()).deliver(&card, &url(), Some(Duration::from_secs(3)));

        let requests = transport.requests.lock();
        let (sent_url, body, timeout) = &requests[0];
        assert_eq!(sent_url, "https://example.webhook.office.com/hook");
        assert_eq!(body, &serde_json::to_vec(&card).expect("serialize"));
        assert_eq!(*timeout, Duration::from_secs(3));
    }

    #[test]
    fn client_error_is_not_retried() {
        let transport = ScriptedTransport::new(vec![Ok(HttpResponse::new(400, "Bad payload"))]);
        let outcome = client(transport.clone()).deliver(&card(), &url(), None);

        assert!(!outcome.success);
        assert_eq!(outcome.status_code, 400);
        assert_eq!(outcome.message, "Teams webhook returned 400: Bad payload");
        assert_eq!(transport.calls(), 1);
    }

    #[test]
    fn failure_message_truncates_body() {
        let body = "x".repeat(500);
        let transport = ScriptedTransport::new(vec![Ok(HttpResponse::new(413, body))]);
        let outcome = client(transport).deliver(&card(), &url(), None);

        let expected = format!("Teams webhook returned 413: {}", "x".repeat(200));
        assert_eq!(outcome.message, expected);
    }

    #[test_case(429 ; "too many requests")]
    #[test_case(500 ; "internal server error")]
    #[test_case(502 ; "bad gateway")]
    #[test_case(503 ; "service unavailable")]
    #[test_case(504 ; "gateway timeout")]
    fn retryable_status_recovers(status: u16) {
        let transport = ScriptedTransport::new(vec![
            Ok(HttpResponse::new(status, "busy")),
            Ok(HttpResponse::new(200, "1")),
        ]);
        let outcome = client(transport.clone()).deliver(&card(), &url(), None);

        assert!(outcome.success);
        assert_eq!(transport.calls(), 2);
    }

    #[test]
    fn retries_stop_after_three_attempts() {
        let transport = ScriptedTransport::new(vec![
            Ok(HttpResponse::new(503, "down")),
            Ok(HttpResponse::new(503, "down")),
            Ok(HttpResponse::new(503, "still down")),
            Ok(HttpResponse::new(200, "never reached")),
        ]);
        let outcome = client(transport.clone()).deliver(&card(), &url(), None);

        assert!(!outcome.success);
        assert_eq!(outcome.status_code, 503);
        assert_eq!(outcome.message, "Teams webhook returned 503: still down");
        assert_eq!(transport.calls(), 3);
    }

    #[test]
    fn timeout_reports_408() {
        let transport =
            ScriptedTransport::new(vec![Err(TransportError::Timeout("deadline".to_string()))]);
        let outcome = client(transport.clone()).deliver(&card(), &url(), None);

        assert_eq!(
            outcome,
            DeliveryOutcome::failure("Timeout sending webhook to Teams", 408)
        );
        assert_eq!(transport.calls(), 1);
    }

    #[test]
    fn transport_error_reports_500() {
        let transport = ScriptedTransport::new(vec![Err(TransportError::Request(
            "connection refused".to_string(),
        ))]);
        let outcome = client(transport).deliver(&card(), &url(), None);

        assert_eq!(outcome.status_code, 500);
        assert_eq!(
            outcome.message,
            "Request error sending to Teams: connection refused"
        );
    }

    #[test]
    fn zero_timeout_falls_back_to_default() {
        let transport = ScriptedTransport::new(vec![]);
        let client = client(transport.clone()).with_default_timeout(Duration::ZERO);
        client.deliver(&card(), &url(), Some(Duration::ZERO));

        let requests = transport.requests.lock();
        assert_eq!(requests[0].2, Duration::from_secs(DEFAULT_TIMEOUT_SECS));
    }

    #[test]
    fn configured_default_timeout_is_used() {
        let transport = ScriptedTransport::new(vec![]);
        let client = client(transport.clone()).with_default_timeout(Duration::from_secs(4));
        client.deliver(&card(), &url(), None);

        assert_eq!(transport.requests.lock()[0].2, Duration::from_secs(4));
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for_attempt(1, None), Duration::from_millis(500));
        assert_eq!(policy.delay_for_attempt(2, None), Duration::from_secs(1));
        assert_eq!(policy.delay_for_attempt(3, None), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(10, None), Duration::from_secs(10));
    }

    #[test]
    fn retry_after_lengthens_but_is_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.delay_for_attempt(1, Some(Duration::from_secs(3))),
            Duration::from_secs(3)
        );
        assert_eq!(
            policy.delay_for_attempt(2, Some(Duration::from_millis(10))),
            Duration::from_secs(1)
        );
        assert_eq!(
            policy.delay_for_attempt(1, Some(Duration::from_secs(120))),
            Duration::from_secs(10)
        );
    }

    #[test]
    fn no_retries_policy() {
        let transport = ScriptedTransport::new(vec![Ok(HttpResponse::new(503, "down"))]);
        let client = DeliveryClient::new(transport.clone()).with_policy(RetryPolicy::no_retries());
        let outcome = client.deliver(&card(), &url(), None);

        assert_eq!(outcome.status_code, 503);
        assert_eq!(transport.calls(), 1);
    }
}
