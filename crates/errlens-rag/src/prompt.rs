// Prompt construction for error analysis

use errlens_core::AnalysisUnit;

use crate::response::SchemaError;
use crate::result::HistoryReference;

const RESPONSE_SHAPE: &str = r#"{
  "error_message": "<the error being analyzed>",
  "explanation": "<what went wrong, in plain language>",
  "possible_causes": ["<cause>", "..."],
  "severity": "LOW | MEDIUM | HIGH | CRITICAL",
  "recommendations": ["<actionable step>", "..."],
  "confidence_score": <number between 0 and 1>
}"#;

#[derive(Debug, Clone)]
pub struct PromptBuilder {
    max_history: usize,
}

impl PromptBuilder {
    pub fn new(max_history: usize) -> Self {
        Self { max_history }
    }

    pub fn max_history(&self) -> usize {
        self.max_history
    }

    /// Analysis prompt for one unit with at most `max_history` references
    pub fn build(&self, unit: &AnalysisUnit, history: &[HistoryReference]) -> String {
        let chunk = &unit.representative_chunk;
        let mut prompt = String::with_capacity(1024);

        prompt.push_str("Analyze the following error from an application log.\n\n");
        prompt.push_str(&format!("ERROR: {}\n", unit.error_message()));
        if let Some(entry) = unit.dominant_entry() {
            prompt.push_str(&format!("LEVEL: {}\n", entry.level));
            if let Some(component) = &entry.component {
                prompt.push_str(&format!("COMPONENT: {}\n", component));
            }
            if let Some(ts) = entry.timestamp {
                prompt.push_str(&format!("FIRST SEEN: {}\n", ts.format("%Y-%m-%d %H:%M:%S")));
            }
        }
        if unit.occurrence_count() > 1 {
            prompt.push_str(&format!("OCCURRENCES IN THIS LOG: {}\n", unit.occurrence_count()));
        }
        if chunk.truncated {
            prompt.push_str("NOTE: the entry was too long and has been truncated.\n");
        }

        prompt.push_str("\nLOG CONTEXT:\n");
        prompt.push_str(&chunk.text());
        prompt.push('\n');

        let history: Vec<&HistoryReference> = history.iter().take(self.max_history).collect();
        if !history.is_empty() {
            prompt.push_str("\nSIMILAR ERRORS ANALYZED BEFORE:\n");
            for (i, reference) in history.iter().enumerate() {
                prompt.push_str(&format!(
                    "{}. [{} | similarity {:.2}] {}\n   Explanation: {}\n",
                    i + 1,
                    reference.severity,
                    reference.similarity,
                    reference.error_message,
                    reference.explanation
                ));
            }
        }

        prompt.push_str("\nRespond ONLY with a JSON object (no markdown) of this shape:\n");
        prompt.push_str(RESPONSE_SHAPE);
        prompt
    }

    /// Re-prompt after a response failed validation
    pub fn corrective(&self, original: &str, error: &SchemaError) -> String {
        format!(
            "{}\n\nYour previous answer was rejected: {}.\n\
             Reply again with exactly one JSON object containing every field above. \
             Do not add any text before or after it.",
            original, error
        )
    }
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new(3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::Severity;
    use chrono::Utc;
    use errlens_core::{Chunker, Deduplicator, Fingerprint, LogParser};

    fn unit_for(text: &str, max_tokens: usize) -> AnalysisUnit {
        let entries = LogParser::default().parse(text);
        let chunks = Chunker::new(max_tokens).chunk(&entries);
        Deduplicator::default().deduplicate(chunks).remove(0)
    }

    fn reference(i: usize) -> HistoryReference {
        HistoryReference {
            fingerprint: Fingerprint::new(format!("fp-{}", i)),
            similarity: 0.9,
            error_message: format!("old error {}", i),
            explanation: format!("old explanation {}", i),
            severity: Severity::High,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_prompt_contains_error_and_history() {
        let unit = unit_for(
            "2024-01-15 10:30:45 ERROR [database] Connection timeout after 30 seconds",
            500,
        );
        let history: Vec<_> = (0..5).map(reference).collect();
        let prompt = PromptBuilder::new(3).build(&unit, &history);

        assert!(prompt.contains("ERROR: Connection timeout after 30 seconds"));
        assert!(prompt.contains("COMPONENT: database"));
        assert!(prompt.contains("old error 2"));
        assert!(!prompt.contains("old error 3"));
        assert!(prompt.contains("confidence_score"));
    }

    #[test]
    fn test_prompt_without_history() {
        let unit = unit_for("2024-01-15 10:30:45 ERROR [api] boom", 500);
        let prompt = PromptBuilder::default().build(&unit, &[]);
        assert!(!prompt.contains("SIMILAR ERRORS"));
    }

    #[test]
    fn test_corrective_prompt_names_the_problem() {
        let prompt = PromptBuilder::default().corrective("base", &SchemaError::MissingField("severity"));
        assert!(prompt.starts_with("base"));
        assert!(prompt.contains("missing field `severity`"));
    }
}
