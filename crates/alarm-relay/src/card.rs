//! Teams adaptive card formatting.
//!
//! [`CardFormatter::format`] builds the message posted to the webhook from a
//! [`NormalizedAlarm`] and its [`StateStyle`]. Formatting is deterministic and
//! performs no I/O.

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde::Serialize;

use crate::alarm::{NormalizedAlarm, UNKNOWN_REGION};
use crate::style::StateStyle;

/// Region used for console links when nothing else is known.
pub const FALLBACK_CONSOLE_REGION: &str = "us-east-1";

const ADAPTIVE_CARD_CONTENT_TYPE: &str = "application/vnd.microsoft.card.adaptive";
const ADAPTIVE_CARD_SCHEMA: &str = "http://adaptivecards.io/schemas/adaptive-card.json";
const ADAPTIVE_CARD_VERSION: &str = "1.4";

/// Everything except RFC 3986 unreserved characters.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// The message document posted to the webhook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CardDocument {
    /// Always `message`.
    #[serde(rename = "type")]
    pub kind: String,
    /// The adaptive card attachment.
    pub attachments: Vec<Attachment>,
}

/// A message attachment carrying an adaptive card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    /// Attachment MIME type.
    pub content_type: String,
    /// Always `null` for inline cards.
    pub content_url: Option<String>,
    /// The card itself.
    pub content: AdaptiveCard,
}

/// An adaptive card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdaptiveCard {
    /// Card schema URL.
    #[serde(rename = "$schema")]
    pub schema: String,
    /// Always `AdaptiveCard`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Card schema version.
    pub version: String,
    /// Body elements, top to bottom.
    pub body: Vec<CardElement>,
    /// Buttons under the body.
    pub actions: Vec<CardAction>,
}

/// A card body element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum CardElement {
    /// A block of (markdown) text.
    TextBlock(TextBlock),
    /// A two-column table of facts.
    FactSet {
        /// Spacing above the table.
        spacing: String,
        /// Rows of the table.
        facts: Vec<Fact>,
    },
}

/// A text block; unset attributes are omitted from the document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TextBlock {
    /// Markdown text.
    pub text: String,
    /// Font weight.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight: Option<String>,
    /// Font size.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    /// Text colour.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    /// Whether the text is de-emphasized.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_subtle: Option<bool>,
    /// Whether long text wraps.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wrap: Option<bool>,
    /// Spacing above the block.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spacing: Option<String>,
}

/// One row of a fact set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Fact {
    /// Row label.
    pub title: String,
    /// Row value.
    pub value: String,
}

/// A card action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum CardAction {
    /// Opens a URL in the browser.
    #[serde(rename = "Action.OpenUrl")]
    OpenUrl {
        /// Button label.
        title: String,
        /// Target URL.
        url: String,
    },
}

/// Where the region of a console link came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionSource {
    /// The alarm named its region.
    Alarm,
    /// The configured default region.
    Configured,
    /// Neither was set; [`FALLBACK_CONSOLE_REGION`] was used.
    Fallback,
}

/// A link to the alarm in the CloudWatch console.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleLink {
    /// The console URL.
    pub url: String,
    /// The region embedded in the URL.
    pub region: String,
    /// Where that region came from.
    pub region_source: RegionSource,
}

/// Builds cards for normalized alarms.
#[derive(Debug, Clone, Default)]
pub struct CardFormatter {
    default_region: String,
}

impl CardFormatter {
    /// Creates a formatter using `default_region` for alarms without a region.
    #[must_use]
    pub fn new(default_region: impl Into<String>) -> Self {
        Self {
            default_region: default_region.into(),
        }
    }

    /// Builds the console link for an alarm from its unsanitized name.
    #[must_use]
    pub fn console_link(&self, alarm: &NormalizedAlarm) -> ConsoleLink {
        let alarm_region = alarm.region.trim();
        let configured = self.default_region.trim();

        // `unknown` is the normalizer's placeholder, so it never names a console region.
        let (region, region_source) =
            if !alarm_region.is_empty() && alarm_region != UNKNOWN_REGION {
                (alarm_region, RegionSource::Alarm)
            } else if !configured.is_empty() {
                (configured, RegionSource::Configured)
            } else {
                (FALLBACK_CONSOLE_REGION, RegionSource::Fallback)
            };

        let encoded_name = utf8_percent_encode(&alarm.alarm_name_raw, PATH_SEGMENT);
        let url = format!(
            "https://{region}.console.aws.amazon.com/cloudwatch/home?region={region}#alarmsV2:alarm/{encoded_name}"
        );

        ConsoleLink {
            url,
            region: region.to_string(),
            region_source,
        }
    }

    /// Builds the card for an alarm.
    #[must_use]
    pub fn format(&self, alarm: &NormalizedAlarm, style: &StateStyle) -> CardDocument {
        let link = self.console_link(alarm);

        let body = vec![
            CardElement::TextBlock(TextBlock {
                text: format!("{} **{}: {}**", style.icon, style.title, alarm.alarm_name),
                weight: Some("Bolder".to_string()),
                size: Some("Large".to_string()),
                wrap: Some(true),
                ..TextBlock::default()
            }),
            CardElement::TextBlock(TextBlock {
                text: format!("**State:** {}", alarm.state),
                weight: Some("Bolder".to_string()),
                color: Some(style.colour.to_string()),
                spacing: Some("Small".to_string()),
                ..TextBlock::default()
            }),
            CardElement::TextBlock(wrapped(format!("**Description:** {}", alarm.description))),
            CardElement::TextBlock(wrapped(format!("**Reason:** {}", alarm.reason))),
            CardElement::FactSet {
                spacing: "Medium".to_string(),
                facts: vec![
                    fact("AWS Account ID", &alarm.account_id),
                    fact("Namespace", &alarm.namespace),
                    fact("Threshold", &alarm.threshold),
                    fact("Region", &alarm.region),
                ],
            },
            CardElement::TextBlock(TextBlock {
                is_subtle: Some(true),
                ..wrapped(format!("**Time:** {}", alarm.timestamp))
            }),
        ];

        CardDocument {
            kind: "message".to_string(),
            attachments: vec![Attachment {
                content_type: ADAPTIVE_CARD_CONTENT_TYPE.to_string(),
                content_url: None,
                content: AdaptiveCard {
                    schema: ADAPTIVE_CARD_SCHEMA.to_string(),
                    kind: "AdaptiveCard".to_string(),
                    version: ADAPTIVE_CARD_VERSION.to_string(),
                    body,
                    actions: vec![CardAction::OpenUrl {
                        title: "View Alarm in CloudWatch".to_string(),
                        url: link.url,
                    }],
                },
            }],
        }
    }
}

fn wrapped(text: String) -> TextBlock {
    TextBlock {
        text,
        wrap: Some(true),
        spacing: Some("Small".to_string()),
        ..TextBlock::default()
    }
}

fn fact(title: &str, value: &str) -> Fact {
    Fact {
        title: title.to_string(),
        value: value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alarm::{RawNotification, normalize_at};
    use crate::style::{ALARM_STYLE, DEFAULT_STYLE};
    use chrono::{TimeZone, Utc};
    use proptest::prelude::*;
    use serde_json::{Value, json};

    fn alarm(payload: Value) -> NormalizedAlarm {
        let raw: RawNotification = payload.as_object().cloned().expect("object payload");
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).single().expect("valid time");
        normalize_at(&raw, "eu-west-1", now)
    }

    fn high_cpu() -> NormalizedAlarm {
        alarm(json!({
            "AlarmName": "HighCPU",
            "AlarmDescription": "CPU above 80%",
            "NewStateReason": "Threshold crossed",
            "NewStateValue": "ALARM",
            "AWSAccountId": "123456789012",
            "Namespace": "AWS/EC2",
            "Threshold": 80,
            "Region": "us-west-2",
            "StateChangeTime": "2024-05-01T12:34:56.789+0000",
        }))
    }

    #[test]
    fn card_document_layout() {
        let card = CardFormatter::new("eu-west-1").format(&high_cpu(), &ALARM_STYLE);
        let doc = serde_json::to_value(&card).expect("serialize");

        assert_eq!(doc["type"], "message");
        let attachment = &doc["attachments"][0];
        assert_eq!(attachment["contentType"], ADAPTIVE_CARD_CONTENT_TYPE);
        assert!(attachment["contentUrl"].is_null());

        let content = &attachment["content"];
        assert_eq!(content["$schema"], ADAPTIVE_CARD_SCHEMA);
        assert_eq!(content["type"], "AdaptiveCard");
        assert_eq!(content["version"], "1.4");

        let body = content["body"].as_array().expect("body");
        assert_eq!(body.len(), 6);
        assert_eq!(body[0]["type"], "TextBlock");
        assert_eq!(body[0]["text"], "🚨 **Alarm Triggered: HighCPU**");
        assert_eq!(body[0]["size"], "Large");
        assert_eq!(body[1]["text"], "**State:** ALARM");
        assert_eq!(body[1]["color"], "Attention");
        assert_eq!(body[2]["text"], "**Description:** CPU above 80%");
        assert_eq!(body[3]["text"], "**Reason:** Threshold crossed");
        assert_eq!(body[4]["type"], "FactSet");
        assert_eq!(body[4]["facts"][0]["title"], "AWS Account ID");
        assert_eq!(body[4]["facts"][0]["value"], "123456789012");
        assert_eq!(body[4]["facts"][2]["value"], "80");
        assert_eq!(body[4]["facts"][3]["value"], "us-west-2");
        assert_eq!(body[5]["text"], "**Time:** 2024-05-01T12:34:56.789+0000");
        assert_eq!(body[5]["isSubtle"], true);

        let action = &content["actions"][0];
        assert_eq!(action["type"], "Action.OpenUrl");
        assert_eq!(action["title"], "View Alarm in CloudWatch");
        assert_eq!(
            action["url"],
            "https://us-west-2.console.aws.amazon.com/cloudwatch/home?region=us-west-2#alarmsV2:alarm/HighCPU"
        );
    }

    #[test]
    fn unset_text_block_attributes_are_omitted() {
        let card = CardFormatter::new("eu-west-1").format(&high_cpu(), &ALARM_STYLE);
        let doc = serde_json::to_value(&card).expect("serialize");
        let description = &doc["attachments"][0]["content"]["body"][2];
        let keys: Vec<&str> = description
            .as_object()
            .expect("object")
            .keys()
            .map(String::as_str)
            .collect();
        assert_eq!(keys.len(), 4);
        assert!(description.get("weight").is_none());
        assert!(description.get("isSubtle").is_none());
    }

    #[test]
    fn console_link_uses_raw_name() {
        let alarm = alarm(json!({"AlarmName": "Critical_Alarm*", "Region": "eu-west-1"}));
        assert_eq!(alarm.alarm_name, "Critical\\_Alarm\\*");

        let link = CardFormatter::new("eu-west-1").console_link(&alarm);
        assert_eq!(
            link.url,
            "https://eu-west-1.console.aws.amazon.com/cloudwatch/home?region=eu-west-1#alarmsV2:alarm/Critical_Alarm%2A"
        );
        assert_eq!(link.region_source, RegionSource::Alarm);
    }

    #[test]
    fn console_link_encodes_reserved_characters() {
        let alarm = alarm(json!({"AlarmName": "prod/api 5xx rate>1%"}));
        let link = CardFormatter::new("eu-west-1").console_link(&alarm);
        assert!(link.url.ends_with("#alarmsV2:alarm/prod%2Fapi%205xx%20rate%3E1%25"));
    }

    #[test]
    fn console_link_region_fallbacks() {
        let mut alarm = high_cpu();
        alarm.region = UNKNOWN_REGION.to_string();

        let link = CardFormatter::new("ap-southeast-2").console_link(&alarm);
        assert_eq!(link.region, "ap-southeast-2");
        assert_eq!(link.region_source, RegionSource::Configured);

        let link = CardFormatter::new("  ").console_link(&alarm);
        assert_eq!(link.region, FALLBACK_CONSOLE_REGION);
        assert_eq!(link.region_source, RegionSource::Fallback);
        assert!(link.url.starts_with("https://us-east-1.console.aws.amazon.com/"));
    }

    #[test]
    fn unknown_state_formats_with_default_style() {
        let alarm = alarm(json!({"AlarmName": "Odd", "NewStateValue": "WEIRD"}));
        let style = StateStyle::resolve(&alarm.state);
        let card = CardFormatter::new("eu-west-1").format(&alarm, style);
        let doc = serde_json::to_value(&card).expect("serialize");
        let body = &doc["attachments"][0]["content"]["body"];
        assert_eq!(body[0]["text"], "❓ **Alarm State Changed: Odd**");
        assert_eq!(body[1]["color"], DEFAULT_STYLE.colour);
    }

    proptest! {
        #[test]
        fn format_is_deterministic(name in ".{0,60}", state in "(ALARM|OK|INSUFFICIENT_DATA|[A-Z]{1,8})") {
            let alarm = alarm(json!({"AlarmName": name, "NewStateValue": state}));
            let formatter = CardFormatter::new("eu-west-1");
            let style = StateStyle::resolve(&alarm.state);

            let first = serde_json::to_vec(&formatter.format(&alarm, style)).expect("serialize");
            let second = serde_json::to_vec(&formatter.format(&alarm, style)).expect("serialize");
            prop_assert_eq!(first, second);
        }
    }
}
