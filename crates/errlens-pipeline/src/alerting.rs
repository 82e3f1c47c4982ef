//! Alert summary built from a finished report, and fan-out to webhook channels

use crate::aggregate::AnalysisReport;
use crate::config::AlertConfig;
use crate::discord::DiscordClient;
use crate::slack::SlackClient;
use chrono::{DateTime, Utc};
use errlens_core::Fingerprint;
use errlens_rag::Severity;
use std::collections::HashSet;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

// critical messages quoted in an alert
const MAX_QUOTED: usize = 3;

#[derive(Error, Debug)]
pub enum AlertError {
    #[error("webhook request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{channel} rejected the alert ({status}): {body}")]
    Rejected {
        channel: &'static str,
        status: u16,
        body: String,
    },
}

/// What an alert says about one run
#[derive(Debug, Clone, PartialEq)]
pub struct AlertSummary {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub total: usize,
    pub critical: usize,
    pub high: usize,
    pub degraded: usize,
    pub failed: usize,
    /// most severe result in the report
    pub highest: Option<Severity>,
    /// first critical errors in report order, one per fingerprint
    pub critical_messages: Vec<String>,
}

impl AlertSummary {
    pub fn from_report(report: &AnalysisReport) -> Self {
        let mut seen: HashSet<Fingerprint> = HashSet::new();
        let critical_messages = report
            .at_least(Severity::Critical)
            .filter(|e| seen.insert(e.fingerprint.clone()))
            .take(MAX_QUOTED)
            .map(|e| e.result.error_message.clone())
            .collect();

        let s = &report.summary;
        Self {
            run_id: report.run_id,
            generated_at: report.generated_at,
            total: s.total,
            critical: s.critical,
            high: s.high,
            degraded: s.degraded,
            failed: s.failed,
            highest: report.entries.iter().map(|e| e.result.severity).max(),
            critical_messages,
        }
    }

    pub fn should_alert(&self, min_severity: Severity) -> bool {
        self.highest.is_some_and(|s| s >= min_severity)
    }

    pub fn headline(&self) -> String {
        format!(
            "Error analysis: {} errors ({} critical, {} high)",
            self.total, self.critical, self.high
        )
    }

    /// Plain-text body shared by every channel
    pub fn body(&self) -> String {
        let mut lines = vec![format!(
            "Total: {} | Critical: {} | High: {} | Degraded: {} | Failed: {}",
            self.total, self.critical, self.high, self.degraded, self.failed
        )];
        if !self.critical_messages.is_empty() {
            lines.push("Critical errors:".to_string());
            for message in &self.critical_messages {
                lines.push(format!("- {}", truncate(message, 200)));
            }
        }
        lines.join("\n")
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max_chars).collect();
        format!("{}...", cut)
    }
}

/// Sends a run summary to every configured channel
pub struct AlertDispatcher {
    slack: Option<SlackClient>,
    discord: Option<DiscordClient>,
    min_severity: Severity,
}

impl AlertDispatcher {
    pub fn from_config(config: &AlertConfig) -> Self {
        let slack = config.slack_url().map(|url| SlackClient::new(url, config.enabled));
        let discord = config.discord_url().map(|url| DiscordClient::new(url, config.enabled));
        Self {
            slack,
            discord,
            min_severity: config.min_severity,
        }
    }

    pub fn has_channels(&self) -> bool {
        self.slack.is_some() || self.discord.is_some()
    }

    /// Returns how many channels accepted the alert. Channel failures are
    /// logged, never propagated.
    pub async fn dispatch(&self, report: &AnalysisReport) -> usize {
        let summary = AlertSummary::from_report(report);
        if !summary.should_alert(self.min_severity) {
            info!(min_severity = %self.min_severity, "Nothing severe enough to alert on");
            return 0;
        }

        let mut delivered = 0;
        if let Some(slack) = &self.slack {
            match slack.send_summary(&summary).await {
                Ok(true) => delivered += 1,
                Ok(false) => {}
                Err(e) => warn!(channel = "slack", error = %e, "Failed to send alert"),
            }
        }
        if let Some(discord) = &self.discord {
            match discord.send_summary(&summary).await {
                Ok(true) => delivered += 1,
                Ok(false) => {}
                Err(e) => warn!(channel = "discord", error = %e, "Failed to send alert"),
            }
        }
        info!(delivered, "Alerts dispatched");
        delivered
    }
}
