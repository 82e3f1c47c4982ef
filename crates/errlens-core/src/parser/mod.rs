//! log parser - turns raw text into ordered structured entries
//!
//! Each physical line is offered to the registered line formats in order.
//! A line no format recognizes is a continuation of the previous entry
//! (stack traces, multi-line payloads) or, at the very start of the input,
//! an entry of its own with level UNKNOWN. Parsing never fails.

pub mod apache;
pub mod standard;
pub mod syslog;

pub use apache::ApacheFormat;
pub use standard::StandardFormat;
pub use syslog::SyslogFormat;

use crate::{LogEntry, LogLevel};
use chrono::{DateTime, Utc};

// parse error type, never leaves this module
#[derive(Debug)]
pub struct ParseError {
    pub message: String,
}

impl ParseError {
    pub fn new(msg: &str) -> Self {
        Self { message: msg.to_string() }
    }
}

/// Fields a line format managed to extract from one physical line
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedLine {
    pub timestamp: Option<DateTime<Utc>>,
    pub level: Option<LogLevel>,
    pub component: Option<String>,
    pub message: String,
}

// Line format trait - every format implements this
pub trait LineFormat: Send + Sync {
    fn name(&self) -> &'static str;
    fn parse_line(&self, line: &str) -> Result<ParsedLine, ParseError>;
}

/// Ordered registry of line formats
pub struct LogParser {
    formats: Vec<Box<dyn LineFormat>>,
}

impl LogParser {
    /// empty parser: every line becomes an UNKNOWN entry or a continuation
    pub fn new() -> Self {
        Self { formats: Vec::new() }
    }

    // register a format, tried after the ones already registered
    pub fn register(&mut self, format: Box<dyn LineFormat>) {
        self.formats.push(format);
    }

    // Get format by name
    pub fn get(&self, name: &str) -> Option<&dyn LineFormat> {
        self.formats
            .iter()
            .find(|f| f.name() == name)
            .map(|f| f.as_ref())
    }

    pub fn format_names(&self) -> Vec<&'static str> {
        self.formats.iter().map(|f| f.name()).collect()
    }

    fn parse_line(&self, line: &str) -> Option<ParsedLine> {
        self.formats.iter().find_map(|f| f.parse_line(line).ok())
    }

    /// Parse a whole log text into entries in source order
    pub fn parse(&self, text: &str) -> Vec<LogEntry> {
        let mut entries: Vec<LogEntry> = Vec::new();

        for (idx, line) in text.lines().enumerate() {
            let line = line.trim_end();
            if line.trim().is_empty() {
                continue;
            }

            match self.parse_line(line) {
                Some(parsed) => entries.push(LogEntry {
                    sequence: entries.len(),
                    line_number: idx + 1,
                    timestamp: parsed.timestamp,
                    level: parsed.level.unwrap_or(LogLevel::Unknown),
                    component: parsed.component,
                    message: parsed.message,
                    raw_line: line.to_string(),
                }),
                None => match entries.last_mut() {
                    // continuation of the previous entry
                    Some(prev) => {
                        prev.message.push('\n');
                        prev.message.push_str(line.trim());
                        prev.raw_line.push('\n');
                        prev.raw_line.push_str(line);
                    }
                    None => entries.push(LogEntry {
                        sequence: 0,
                        line_number: idx + 1,
                        timestamp: None,
                        level: LogLevel::Unknown,
                        component: None,
                        message: line.trim().to_string(),
                        raw_line: line.to_string(),
                    }),
                },
            }
        }

        entries
    }
}

impl Default for LogParser {
    /// standard application format, then syslog, then apache error log
    fn default() -> Self {
        let mut parser = Self::new();
        parser.register(Box::new(StandardFormat::new()));
        parser.register(Box::new(SyslogFormat::new()));
        parser.register(Box::new(ApacheFormat::new()));
        parser
    }
}
