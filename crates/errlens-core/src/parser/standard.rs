// Standard application log format
// 2024-01-15 10:30:45 ERROR [component] message
// 2024-01-15T10:30:45.123Z [ERROR] message

use super::{LineFormat, ParseError, ParsedLine};
use crate::LogLevel;
use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;

const TIMESTAMP: &str = r"\d{4}-\d{2}-\d{2}[ T]\d{2}:\d{2}:\d{2}(?:[.,]\d+)?(?:Z|[+-]\d{2}:?\d{2})?";
const LEVELS: &str =
    r"TRACE|DEBUG|INFO|NOTICE|WARN|WARNING|ERROR|ERR|SEVERE|CRITICAL|CRIT|FATAL|EMERG|EMERGENCY|ALERT|PANIC";

pub struct StandardFormat {
    // timestamp + level + optional [component]
    pattern: Regex,
    // timestamp with no recognizable level
    bare_pattern: Regex,
}

impl StandardFormat {
    pub fn new() -> Self {
        Self {
            pattern: Regex::new(&format!(
                r"^({TIMESTAMP})\s+\[?(?i:({LEVELS}))\]?:?\s+(?:\[([^\]]+)\]:?\s*)?(.*)$"
            ))
            .unwrap(),
            bare_pattern: Regex::new(&format!(r"^({TIMESTAMP})\s+(?:\[([^\]]+)\]:?\s*)?(.*)$"))
                .unwrap(),
        }
    }

    pub(crate) fn parse_timestamp(ts: &str) -> Option<DateTime<Utc>> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(ts) {
            return Some(dt.with_timezone(&Utc));
        }
        let ts = ts.replace(',', ".").replace('T', " ");
        let ts = ts.trim_end_matches('Z');
        NaiveDateTime::parse_from_str(ts, "%Y-%m-%d %H:%M:%S%.f")
            .ok()
            .map(|naive| DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc))
    }
}

impl Default for StandardFormat {
    fn default() -> Self {
        Self::new()
    }
}

impl LineFormat for StandardFormat {
    fn name(&self) -> &'static str {
        "standard"
    }

    fn parse_line(&self, line: &str) -> Result<ParsedLine, ParseError> {
        if let Some(caps) = self.pattern.captures(line) {
            let timestamp = caps.get(1).and_then(|m| Self::parse_timestamp(m.as_str()));
            let level = caps.get(2).and_then(|m| LogLevel::from_str(m.as_str()));
            let component = caps.get(3).map(|m| m.as_str().trim().to_string());
            let message = caps.get(4).map(|m| m.as_str()).unwrap_or("");

            return Ok(ParsedLine {
                timestamp,
                level,
                component,
                message: message.to_string(),
            });
        }

        if let Some(caps) = self.bare_pattern.captures(line) {
            let message = caps.get(3).map(|m| m.as_str()).unwrap_or("");
            return Ok(ParsedLine {
                timestamp: caps.get(1).and_then(|m| Self::parse_timestamp(m.as_str())),
                level: LogLevel::infer_from_message(message),
                component: caps.get(2).map(|m| m.as_str().trim().to_string()),
                message: message.to_string(),
            });
        }

        Err(ParseError::new("not a standard log line"))
    }
}
