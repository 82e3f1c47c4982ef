//! Core types for the error analysis pipeline
//! this crate holds the deterministic half of the system: parsing raw log
//! text, packing entries into token-bounded chunks, and collapsing repeated
//! failures into analysis units.
pub mod chunker;
pub mod dedup;
pub mod fingerprint;
pub mod parser;
pub mod patterns;

pub use chunker::{Chunker, TokenEstimator};
pub use dedup::{AnalysisUnit, Deduplicator};
pub use fingerprint::{Fingerprint, Normalizer};
pub use parser::LogParser;
pub use patterns::{extract_error_patterns, ErrorPatterns};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// LOG LEVEL //

/// Log severity levels (ordered from lowest to highest, Unknown sorts first)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Unknown,
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Critical,
}

impl LogLevel {
    /// Parse log level from string (case-insensitive)
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "trace" => Some(Self::Trace),
            "debug" => Some(Self::Debug),
            "info" | "notice" => Some(Self::Info),
            "warn" | "warning" => Some(Self::Warn),
            "error" | "err" | "severe" => Some(Self::Error),
            "critical" | "crit" | "fatal" | "emerg" | "emergency" | "alert" | "panic" => {
                Some(Self::Critical)
            }
            _ => None,
        }
    }

    /// Best-effort level guess for formats that carry no level field
    pub fn infer_from_message(message: &str) -> Option<Self> {
        let upper = message.to_uppercase();
        if upper.contains("CRITICAL") || upper.contains("FATAL") || upper.contains("PANIC") {
            Some(Self::Critical)
        } else if upper.contains("ERROR") || upper.contains("EXCEPTION") || upper.contains("FAILED") {
            Some(Self::Error)
        } else if upper.contains("WARN") {
            Some(Self::Warn)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "UNKNOWN",
            Self::Trace => "TRACE",
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
            Self::Critical => "CRITICAL",
        }
    }

    /// ERROR and CRITICAL entries are the ones the report must account for
    pub fn is_error_candidate(&self) -> bool {
        matches!(self, Self::Error | Self::Critical)
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// PARSED LOG ENTRY //

/// One logical log entry, possibly spanning several physical lines
/// (stack traces and multi-line payloads are folded into `message`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Position in source order. The only trusted ordering key.
    pub sequence: usize,

    /// 1-based line number where the entry starts.
    pub line_number: usize,

    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,

    pub level: LogLevel,

    #[serde(default)]
    pub component: Option<String>,

    pub message: String,

    /// Original text, continuation lines included
    pub raw_line: String,
}

impl LogEntry {
    pub fn is_error_candidate(&self) -> bool {
        self.level.is_error_candidate()
    }

    // short "LEVEL [component]" prefix used when an entry has to be re-rendered
    pub fn header(&self) -> String {
        match &self.component {
            Some(component) => format!("{} [{}]", self.level, component),
            None => self.level.to_string(),
        }
    }
}

// CHUNK //

/// An ordered, non-empty run of entries sent to the model together.
///
/// Entries are never split or reordered. A chunk holding a single entry that
/// alone exceeds the token budget carries a truncated rendering in `excerpt`
/// and is flagged `truncated`; the entry itself stays untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub entries: Vec<LogEntry>,
    pub token_count: usize,
    #[serde(default)]
    pub truncated: bool,
    /// truncated message of the single oversized entry
    #[serde(default)]
    pub excerpt: Option<String>,
}

impl Chunk {
    /// Text handed to the model for this chunk
    pub fn text(&self) -> String {
        match (&self.excerpt, self.entries.first()) {
            (Some(excerpt), Some(entry)) => format!("{} {}", entry.header(), excerpt),
            _ => self
                .entries
                .iter()
                .map(|e| e.raw_line.as_str())
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    /// Message of `entry` as the model sees it (truncated when the chunk is)
    pub fn message_of<'a>(&'a self, entry: &'a LogEntry) -> &'a str {
        match &self.excerpt {
            Some(excerpt) if self.truncated => excerpt,
            _ => &entry.message,
        }
    }

    /// First ERROR/CRITICAL entry, the one a chunk is keyed by
    pub fn dominant_entry(&self) -> Option<&LogEntry> {
        self.entries.iter().find(|e| e.is_error_candidate())
    }

    pub fn entry(&self, sequence: usize) -> Option<&LogEntry> {
        self.entries.iter().find(|e| e.sequence == sequence)
    }

    pub fn sequences(&self) -> impl Iterator<Item = usize> + '_ {
        self.entries.iter().map(|e| e.sequence)
    }

    pub fn error_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_error_candidate()).count()
    }
}
