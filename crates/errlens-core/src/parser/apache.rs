// Apache error log format
// [Sun Dec 04 04:47:44 2005] [error] message
// [Wed Oct 11 14:32:52.123456 2000] [core:error] [pid 35708] message

use super::{LineFormat, ParseError, ParsedLine};
use crate::LogLevel;
use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;

pub struct ApacheFormat {
    // apache error log pattern, module prefix on the level is optional
    error_pattern: Regex,
}

impl ApacheFormat {
    pub fn new() -> Self {
        Self {
            error_pattern: Regex::new(r"^\[([^\]]+)\] \[(?:(\w+):)?(\w+)\] (?:\[pid \d+(?::tid \d+)?\] )?(.+)$")
                .unwrap(),
        }
    }

    fn parse_timestamp(ts: &str) -> Option<DateTime<Utc>> {
        NaiveDateTime::parse_from_str(ts, "%a %b %d %H:%M:%S %Y")
            .or_else(|_| NaiveDateTime::parse_from_str(ts, "%a %b %d %H:%M:%S%.f %Y"))
            .ok()
            .map(|naive| DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc))
    }
}

impl Default for ApacheFormat {
    fn default() -> Self {
        Self::new()
    }
}

impl LineFormat for ApacheFormat {
    fn name(&self) -> &'static str {
        "apache"
    }

    fn parse_line(&self, line: &str) -> Result<ParsedLine, ParseError> {
        let caps = self
            .error_pattern
            .captures(line)
            .ok_or_else(|| ParseError::new("not an apache error log line"))?;

        let timestamp_str = caps.get(1).map(|m| m.as_str()).unwrap_or("");
        let module = caps.get(2).map(|m| m.as_str());
        let level_str = caps.get(3).map(|m| m.as_str()).unwrap_or("");
        let message = caps.get(4).map(|m| m.as_str()).unwrap_or(line);

        let timestamp = Self::parse_timestamp(timestamp_str);
        // "[client 1.2.3.4]" style brackets also match; only accept real timestamps
        if timestamp.is_none() {
            return Err(ParseError::new("unparsable apache timestamp"));
        }

        Ok(ParsedLine {
            timestamp,
            level: LogLevel::from_str(level_str),
            component: Some(module.unwrap_or("apache").to_string()),
            message: message.to_string(),
        })
    }
}
