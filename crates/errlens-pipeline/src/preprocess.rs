//! The synchronous half of a run: parse, chunk and deduplicate.
//! Needs no model client, so it also backs the `preprocess` command.

use errlens_core::{AnalysisUnit, Chunk, Chunker, Deduplicator, LogEntry, LogParser};

use crate::config::{ConfigError, PipelineConfig};

/// Output of the synchronous half of a run
#[derive(Debug, Clone)]
pub struct Preprocessed {
    pub entries: Vec<LogEntry>,
    pub chunks: Vec<Chunk>,
    pub units: Vec<AnalysisUnit>,
}

pub struct Preprocessor {
    parser: LogParser,
    chunker: Chunker,
    dedup: Deduplicator,
    errors_only: bool,
}

impl Preprocessor {
    pub fn from_config(config: &PipelineConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            parser: LogParser::default(),
            chunker: config.chunker(),
            dedup: Deduplicator::new(config.fingerprint.build_normalizer()?),
            errors_only: config.pipeline.errors_only,
        })
    }

    pub fn max_tokens(&self) -> usize {
        self.chunker.max_tokens()
    }

    pub fn parse(&self, text: &str) -> Vec<LogEntry> {
        self.parser.parse(text)
    }

    /// Chunks the entries that go to analysis (errors only unless configured otherwise)
    pub fn chunk(&self, entries: &[LogEntry]) -> Vec<Chunk> {
        if self.errors_only {
            let errors: Vec<LogEntry> = entries.iter().filter(|e| e.is_error_candidate()).cloned().collect();
            self.chunker.chunk(&errors)
        } else {
            self.chunker.chunk(entries)
        }
    }

    pub fn run(&self, text: &str) -> Preprocessed {
        let entries = self.parse(text);
        let chunks = self.chunk(&entries);
        let units = self.dedup.deduplicate(chunks.clone());
        Preprocessed { entries, chunks, units }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOG: &str = "\
2024-01-15 10:30:45 ERROR [database] Connection timeout after 30 seconds
2024-01-15 10:30:46 INFO [api] request served
2024-01-15 10:30:47 ERROR [database] Connection timeout after 45 seconds";

    #[test]
    fn test_errors_only_by_default() {
        let pre = Preprocessor::from_config(&PipelineConfig::default()).unwrap().run(LOG);
        assert_eq!(pre.entries.len(), 3);
        assert!(pre.chunks.iter().flat_map(|c| &c.entries).all(|e| e.is_error_candidate()));
        assert_eq!(pre.units.len(), 1);
        assert_eq!(pre.units[0].occurrence_count(), 2);
    }

    #[test]
    fn test_all_entries_when_configured() {
        let mut config = PipelineConfig::default();
        config.pipeline.errors_only = false;
        let pre = Preprocessor::from_config(&config).unwrap().run(LOG);
        let chunked: usize = pre.chunks.iter().map(|c| c.entries.len()).sum();
        assert_eq!(chunked, 3);
    }
}
