// Syslog line format (RFC 3164 / BSD)

use super::{LineFormat, ParseError, ParsedLine};
use crate::LogLevel;
use chrono::{DateTime, Datelike, NaiveDateTime, Utc};
use regex::Regex;

pub struct SyslogFormat {
    // BSD syslog: <priority>Mon DD HH:MM:SS hostname process[pid]: message
    pattern: Regex,
    // Simpler pattern without hostname
    simple_pattern: Regex,
}

impl SyslogFormat {
    pub fn new() -> Self {
        Self {
            pattern: Regex::new(
                r"^(?:<(\d+)>)?(\w{3}\s+\d{1,2}\s+\d{2}:\d{2}:\d{2})\s+(\S+)\s+([^\s\[:]+(?:\([^)]*\))?)(?:\[(\d+)\])?:\s*(.+)$",
            )
            .unwrap(),
            simple_pattern: Regex::new(
                r"^(?:<(\d+)>)?(\w{3}\s+\d{1,2}\s+\d{2}:\d{2}:\d{2})\s+([^\s\[:]+)(?:\[(\d+)\])?:\s*(.+)$",
            )
            .unwrap(),
        }
    }

    fn parse_timestamp(ts: &str) -> Option<DateTime<Utc>> {
        // Format: Oct 11 22:14:15 (no year, assume current year)
        let ts_with_year = format!("{} {}", ts, Utc::now().year());

        NaiveDateTime::parse_from_str(&ts_with_year, "%b %d %H:%M:%S %Y")
            .ok()
            .map(|naive| DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc))
    }

    fn priority_to_level(priority: u8) -> LogLevel {
        // Syslog severity is priority % 8
        match priority % 8 {
            0..=2 => LogLevel::Critical, // Emergency, Alert, Critical
            3 => LogLevel::Error,
            4 => LogLevel::Warn,
            5 | 6 => LogLevel::Info, // Notice, Informational
            _ => LogLevel::Debug,
        }
    }

    fn level(priority: Option<u8>, message: &str) -> LogLevel {
        priority
            .map(Self::priority_to_level)
            .or_else(|| LogLevel::infer_from_message(message))
            .unwrap_or(LogLevel::Info)
    }
}

impl Default for SyslogFormat {
    fn default() -> Self {
        Self::new()
    }
}

impl LineFormat for SyslogFormat {
    fn name(&self) -> &'static str {
        "syslog"
    }

    fn parse_line(&self, line: &str) -> Result<ParsedLine, ParseError> {
        // Try full pattern with hostname
        if let Some(caps) = self.pattern.captures(line) {
            let priority: Option<u8> = caps.get(1).and_then(|m| m.as_str().parse().ok());
            let timestamp_str = caps.get(2).map(|m| m.as_str()).unwrap_or("");
            let process = caps.get(4).map(|m| m.as_str()).unwrap_or("");
            let message = caps.get(6).map(|m| m.as_str()).unwrap_or(line);

            return Ok(ParsedLine {
                timestamp: Self::parse_timestamp(timestamp_str),
                level: Some(Self::level(priority, message)),
                component: Some(process.to_string()),
                message: message.to_string(),
            });
        }

        // Try simple pattern without hostname
        if let Some(caps) = self.simple_pattern.captures(line) {
            let priority: Option<u8> = caps.get(1).and_then(|m| m.as_str().parse().ok());
            let timestamp_str = caps.get(2).map(|m| m.as_str()).unwrap_or("");
            let process = caps.get(3).map(|m| m.as_str()).unwrap_or("");
            let message = caps.get(5).map(|m| m.as_str()).unwrap_or(line);

            return Ok(ParsedLine {
                timestamp: Self::parse_timestamp(timestamp_str),
                level: Some(Self::level(priority, message)),
                component: Some(process.to_string()),
                message: message.to_string(),
            });
        }

        Err(ParseError::new("not a syslog line"))
    }
}
