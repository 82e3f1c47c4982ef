// Analysis result types shared by the analyzer, the history store and the report

use chrono::{DateTime, Utc};
use errlens_core::{Fingerprint, LogLevel};
use serde::{Deserialize, Serialize};

/// Severity assigned by the analysis (ordered from lowest to highest)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Map any model-supplied label onto the nearest known severity.
    /// Unrecognized labels land on MEDIUM.
    pub fn coerce(label: &str) -> Self {
        let upper = label.trim().to_uppercase();
        match upper.as_str() {
            "LOW" | "MINOR" | "TRIVIAL" | "INFO" | "INFORMATIONAL" | "DEBUG" | "NONE" => Severity::Low,
            "MEDIUM" | "MED" | "MODERATE" | "NORMAL" | "WARN" | "WARNING" => Severity::Medium,
            "HIGH" | "MAJOR" | "SEVERE" | "ERROR" | "URGENT" | "IMPORTANT" => Severity::High,
            "CRITICAL" | "CRIT" | "FATAL" | "BLOCKER" | "EMERGENCY" | "P0" | "SEV0" | "SEV1" => {
                Severity::Critical
            }
            _ => {
                if let Ok(n) = upper.parse::<f64>() {
                    return Self::from_rank(n);
                }
                if upper.contains("CRIT") || upper.contains("FATAL") {
                    Severity::Critical
                } else if upper.contains("HIGH") {
                    Severity::High
                } else if upper.contains("LOW") {
                    Severity::Low
                } else {
                    Severity::Medium
                }
            }
        }
    }

    /// numeric scale 1 (low) .. 4 (critical), rounded and clamped
    pub fn from_rank(rank: f64) -> Self {
        if rank.is_nan() {
            return Severity::Medium;
        }
        match rank.round().clamp(1.0, 4.0) as u8 {
            1 => Severity::Low,
            2 => Severity::Medium,
            3 => Severity::High,
            _ => Severity::Critical,
        }
    }

    /// Fallback severity when the model gave us nothing usable
    pub fn from_log_level(level: LogLevel) -> Self {
        match level {
            LogLevel::Critical => Severity::Critical,
            LogLevel::Error => Severity::High,
            _ => Severity::Medium,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
            Severity::Critical => "CRITICAL",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResultStatus {
    Ok,
    Degraded,
    Failed,
}

/// A previously analyzed error retrieved as context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryReference {
    pub fingerprint: Fingerprint,
    pub similarity: f32,
    pub error_message: String,
    pub explanation: String,
    pub severity: Severity,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub error_message: String,
    pub explanation: String,
    pub possible_causes: Vec<String>,
    pub severity: Severity,
    pub recommendations: Vec<String>,
    /// final score in [0, 1]
    pub confidence_score: f32,
    #[serde(default)]
    pub similar_history: Vec<HistoryReference>,
    pub status: ResultStatus,
    /// history index was unreachable for this unit
    #[serde(default)]
    pub no_history_context: bool,
    #[serde(default)]
    pub truncated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_cause: Option<String>,
}

impl AnalysisResult {
    /// Placeholder used after schema repair attempts ran out
    pub fn degraded(error_message: impl Into<String>, severity: Severity, cause: impl Into<String>) -> Self {
        Self {
            error_message: error_message.into(),
            explanation: "Automated analysis could not produce a valid explanation for this error."
                .to_string(),
            possible_causes: Vec::new(),
            severity,
            recommendations: vec!["Review the error manually or re-run the analysis.".to_string()],
            confidence_score: 0.0,
            similar_history: Vec::new(),
            status: ResultStatus::Degraded,
            no_history_context: false,
            truncated: false,
            failure_cause: Some(cause.into()),
        }
    }

    /// Result for a unit whose analysis never completed
    pub fn failed(error_message: impl Into<String>, severity: Severity, cause: impl Into<String>) -> Self {
        Self {
            explanation: "Analysis failed for this error.".to_string(),
            status: ResultStatus::Failed,
            recommendations: Vec::new(),
            ..Self::degraded(error_message, severity, cause)
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == ResultStatus::Ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coerce_known_and_nearby_labels() {
        assert_eq!(Severity::coerce("high"), Severity::High);
        assert_eq!(Severity::coerce(" Critical "), Severity::Critical);
        assert_eq!(Severity::coerce("SEVERE"), Severity::High);
        assert_eq!(Severity::coerce("warning"), Severity::Medium);
        assert_eq!(Severity::coerce("very high"), Severity::High);
        assert_eq!(Severity::coerce("3"), Severity::High);
        assert_eq!(Severity::coerce("9"), Severity::Critical);
        assert_eq!(Severity::coerce("banana"), Severity::Medium);
    }

    #[test]
    fn test_ordering() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Medium > Severity::Low);
    }

    #[test]
    fn test_failed_result_shape() {
        let result = AnalysisResult::failed("disk full", Severity::Critical, "timed out");
        assert_eq!(result.status, ResultStatus::Failed);
        assert_eq!(result.confidence_score, 0.0);
        assert_eq!(result.failure_cause.as_deref(), Some("timed out"));

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"], "FAILED");
        assert_eq!(json["severity"], "CRITICAL");
    }
}
