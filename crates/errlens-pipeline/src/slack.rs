//! Slack webhook integration

use crate::alerting::{AlertError, AlertSummary};
use errlens_rag::Severity;
use reqwest::Client;
use serde::Serialize;

// Slack client for sending run summaries
pub struct SlackClient {
    client: Client,
    webhook_url: String,
    enabled: bool,
}

// slack message payload
#[derive(Serialize)]
struct SlackMessage {
    text: String,
    attachments: Vec<SlackAttachment>,
}

// slack attachment (colored sidebar with details)
#[derive(Serialize)]
struct SlackAttachment {
    color: String,
    title: String,
    text: String,
    fields: Vec<SlackField>,
    footer: String,
    ts: i64,
}

// slack field (key value in attachment)
#[derive(Serialize)]
struct SlackField {
    title: String,
    value: String,
    short: bool,
}

impl SlackClient {
    pub fn new(webhook_url: String, enabled: bool) -> Self {
        Self {
            client: Client::new(),
            webhook_url,
            enabled,
        }
    }

    /// Ok(false) when the channel is disabled
    pub async fn send_summary(&self, summary: &AlertSummary) -> Result<bool, AlertError> {
        if !self.enabled {
            return Ok(false);
        }
        let message = build_message(summary);

        let response = self.client.post(&self.webhook_url).json(&message).send().await?;

        let status = response.status();
        if status.is_success() {
            Ok(true)
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(AlertError::Rejected {
                channel: "slack",
                status: status.as_u16(),
                body,
            })
        }
    }
}

fn build_message(summary: &AlertSummary) -> SlackMessage {
    let emoji = match summary.highest {
        Some(Severity::Critical) => "🚨",
        Some(Severity::High) => "⚠️",
        _ => "ℹ️",
    };

    SlackMessage {
        text: format!("{} {}", emoji, summary.headline()),
        attachments: vec![SlackAttachment {
            color: severity_to_color(summary.highest).to_string(),
            title: format!("Run {}", summary.run_id),
            text: summary.body(),
            fields: vec![
                SlackField {
                    title: "Critical".to_string(),
                    value: summary.critical.to_string(),
                    short: true,
                },
                SlackField {
                    title: "High".to_string(),
                    value: summary.high.to_string(),
                    short: true,
                },
                SlackField {
                    title: "Degraded / Failed".to_string(),
                    value: format!("{} / {}", summary.degraded, summary.failed),
                    short: true,
                },
            ],
            footer: "errlens".to_string(),
            ts: summary.generated_at.timestamp(),
        }],
    }
}

// Convert severity to slack color
fn severity_to_color(severity: Option<Severity>) -> &'static str {
    match severity {
        Some(Severity::Critical) => "danger",
        Some(Severity::High) | Some(Severity::Medium) => "warning",
        _ => "good",
    }
}
