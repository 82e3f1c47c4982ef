//! Error pattern statistics over parsed entries

use crate::LogEntry;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const ERROR_KEYWORDS: &[&str] = &[
    "timeout",
    "connection",
    "failed",
    "error",
    "exception",
    "denied",
    "invalid",
    "not found",
    "unauthorized",
];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorPatterns {
    pub total_errors: usize,
    pub component_distribution: BTreeMap<String, usize>,
    pub error_keywords: BTreeMap<String, usize>,
    /// min/max timestamp over errors that carry one
    pub time_range: Option<TimeRange>,
}

pub fn extract_error_patterns(entries: &[LogEntry]) -> ErrorPatterns {
    let mut patterns = ErrorPatterns::default();

    for entry in entries.iter().filter(|e| e.is_error_candidate()) {
        patterns.total_errors += 1;

        let component = entry.component.clone().unwrap_or_else(|| "unknown".to_string());
        *patterns.component_distribution.entry(component).or_insert(0) += 1;

        let message = entry.message.to_lowercase();
        for keyword in ERROR_KEYWORDS {
            if message.contains(keyword) {
                *patterns.error_keywords.entry(keyword.to_string()).or_insert(0) += 1;
            }
        }

        if let Some(ts) = entry.timestamp {
            patterns.time_range = Some(match patterns.time_range {
                Some(range) => TimeRange {
                    start: range.start.min(ts),
                    end: range.end.max(ts),
                },
                None => TimeRange { start: ts, end: ts },
            });
        }
    }

    patterns
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LogParser;

    #[test]
    fn test_extract_patterns() {
        let text = "\
2024-01-15 10:30:45 ERROR [database] Connection timeout after 30 seconds
2024-01-15 10:31:02 INFO [api] request served
2024-01-15 10:29:10 ERROR [auth] Access denied for user bob
2024-01-15 10:35:00 CRITICAL [database] Connection pool exhausted";
        let entries = LogParser::default().parse(text);
        let patterns = extract_error_patterns(&entries);

        assert_eq!(patterns.total_errors, 3);
        assert_eq!(patterns.component_distribution.get("database"), Some(&2));
        assert_eq!(patterns.error_keywords.get("connection"), Some(&2));
        assert_eq!(patterns.error_keywords.get("denied"), Some(&1));
        let range = patterns.time_range.unwrap();
        // timestamps are out of order in the source
        assert!(range.start < range.end);
        assert_eq!(range.start.format("%H:%M:%S").to_string(), "10:29:10");
    }

    #[test]
    fn test_no_errors() {
        let patterns = extract_error_patterns(&[]);
        assert_eq!(patterns.total_errors, 0);
        assert!(patterns.time_range.is_none());
    }
}
