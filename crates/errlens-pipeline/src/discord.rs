//! Discord webhook integration

use crate::alerting::{AlertError, AlertSummary};
use errlens_rag::Severity;
use reqwest::Client;
use serde::Serialize;

pub struct DiscordClient {
    client: Client,
    webhook_url: String,
    enabled: bool,
}

#[derive(Serialize)]
struct DiscordMessage {
    content: String,
    embeds: Vec<DiscordEmbed>,
}

#[derive(Serialize)]
struct DiscordEmbed {
    title: String,
    description: String,
    color: u32,
    timestamp: String,
}

impl DiscordClient {
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

        let response = self
            .client
            .post(&self.webhook_url)
            .json(&build_message(summary))
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(true)
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(AlertError::Rejected {
                channel: "discord",
                status: status.as_u16(),
                body,
            })
        }
    }
}

fn build_message(summary: &AlertSummary) -> DiscordMessage {
    // embed colors are 0xRRGGBB
    let color = match summary.highest {
        Some(Severity::Critical) => 0xE0_1E_5A,
        Some(Severity::High) => 0xEC_B2_2E,
        Some(Severity::Medium) => 0x36_C5_F0,
        _ => 0x2E_B6_7D,
    };

    DiscordMessage {
        content: summary.headline(),
        embeds: vec![DiscordEmbed {
            title: format!("Run {}", summary.run_id),
            description: summary.body(),
            color,
            timestamp: summary.generated_at.to_rfc3339(),
        }],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    #[test]
    fn test_message_shape() {
        let summary = AlertSummary {
            run_id: Uuid::nil(),
            generated_at: Utc::now(),
            total: 2,
            critical: 2,
            high: 0,
            degraded: 0,
            failed: 0,
            highest: Some(Severity::Critical),
            critical_messages: vec!["disk full".to_string()],
        };
        let value = serde_json::to_value(build_message(&summary)).unwrap();
        assert!(value["content"].as_str().unwrap().contains("2 critical"));
        assert_eq!(value["embeds"][0]["color"], 0xE01E5A);
        assert!(value["embeds"][0]["description"].as_str().unwrap().contains("- disk full"));
    }
}
