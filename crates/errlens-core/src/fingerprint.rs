//! Fingerprinting - a pure string transform that keys structurally
//! identical errors together.
//!
//! Variable tokens (UUIDs, timestamps, IPs, ports, hex ids, numbers) are
//! replaced by placeholders through an ordered list of regex rules. The rule
//! set is configurable; `Normalizer::default()` carries the built-in rules.

use crate::{Chunk, LogEntry};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// applied in order, earlier rules see the text first
const DEFAULT_RULES: &[(&str, &str)] = &[
    (
        r"(?i)\b[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}\b",
        "<uuid>",
    ),
    (
        r"\b\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}:\d{2}(?:[.,]\d+)?(?:Z|[+-]\d{2}:?\d{2})?",
        "<ts>",
    ),
    (r"\b\d{1,2}:\d{2}:\d{2}(?:[.,]\d+)?\b", "<time>"),
    (r"\b\d{1,3}(?:\.\d{1,3}){3}(?::\d{1,5})?\b", "<ip>"),
    (r"\b0x[0-9a-fA-F]+\b", "<hex>"),
    (r"\b[0-9a-fA-F]{16,}\b", "<id>"),
    (r":\d{2,5}\b", ":<port>"),
    (r"\d+(?:\.\d+)?", "<num>"),
];

#[derive(Debug, Clone)]
struct NormalizationRule {
    pattern: Regex,
    placeholder: String,
}

#[derive(Debug, Clone)]
pub struct Normalizer {
    rules: Vec<NormalizationRule>,
    whitespace: Regex,
}

impl Normalizer {
    /// Normalizer with no placeholder rules (whitespace collapsing only)
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            whitespace: Regex::new(r"\s+").unwrap(),
        }
    }

    pub fn with_default_rules() -> Self {
        let mut normalizer = Self::new();
        for (pattern, placeholder) in DEFAULT_RULES {
            normalizer.rules.push(NormalizationRule {
                pattern: Regex::new(pattern).unwrap(),
                placeholder: placeholder.to_string(),
            });
        }
        normalizer
    }

    /// Append a rule; fails on an invalid pattern
    pub fn add_rule(&mut self, pattern: &str, placeholder: &str) -> Result<(), regex::Error> {
        self.rules.push(NormalizationRule {
            pattern: Regex::new(pattern)?,
            placeholder: placeholder.to_string(),
        });
        Ok(())
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    pub fn normalize(&self, text: &str) -> String {
        let mut normalized = text.to_string();
        for rule in &self.rules {
            normalized = rule
                .pattern
                .replace_all(&normalized, rule.placeholder.as_str())
                .into_owned();
        }
        self.whitespace.replace_all(normalized.trim(), " ").into_owned()
    }

    /// level + component + normalized message
    pub fn fingerprint_entry(&self, entry: &LogEntry) -> Fingerprint {
        Fingerprint(format!(
            "{}|{}|{}",
            entry.level,
            entry.component.as_deref().unwrap_or("-"),
            self.normalize(&entry.message)
        ))
    }

    /// whole-chunk key, used when a chunk has no error entry
    pub fn fingerprint_chunk(&self, chunk: &Chunk) -> Fingerprint {
        let parts: Vec<String> = chunk
            .entries
            .iter()
            .map(|e| self.fingerprint_entry(e).0)
            .collect();
        Fingerprint(format!("chunk:{}", parts.join("\n")))
    }
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::with_default_rules()
    }
}
