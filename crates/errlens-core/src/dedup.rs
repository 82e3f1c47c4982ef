//! Deduplicator - folds structurally identical failures into one analysis
//! unit while keeping every occurrence addressable.

use crate::fingerprint::{Fingerprint, Normalizer};
use crate::{Chunk, LogEntry};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// One distinct fingerprint within a batch
#[derive(Debug, Clone)]
pub struct AnalysisUnit {
    pub fingerprint: Fingerprint,
    /// first chunk the fingerprint was seen in, shared with sibling units
    pub representative_chunk: Arc<Chunk>,
    /// sequence of the entry that produced the fingerprint in that chunk
    pub dominant_sequence: usize,
    pub occurrence_sequences: BTreeSet<usize>,
}

impl AnalysisUnit {
    pub fn dominant_entry(&self) -> Option<&LogEntry> {
        self.representative_chunk.entry(self.dominant_sequence)
    }

    /// message under analysis, truncated if the chunk is
    pub fn error_message(&self) -> String {
        match self.dominant_entry() {
            Some(entry) => self.representative_chunk.message_of(entry).to_string(),
            None => self.representative_chunk.text(),
        }
    }

    pub fn occurrence_count(&self) -> usize {
        self.occurrence_sequences.len()
    }
}

pub struct Deduplicator {
    normalizer: Normalizer,
}

impl Deduplicator {
    pub fn new(normalizer: Normalizer) -> Self {
        Self { normalizer }
    }

    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    /// Units come out in order of first appearance.
    ///
    /// Every error entry of a chunk is keyed by its own fingerprint, so a
    /// chunk holding several distinct errors yields several units sharing it
    /// as context. A chunk without errors is keyed as a whole and its unit
    /// owns all of its entries.
    pub fn deduplicate(&self, chunks: Vec<Chunk>) -> Vec<AnalysisUnit> {
        let mut units: Vec<AnalysisUnit> = Vec::new();
        let mut index: HashMap<Fingerprint, usize> = HashMap::new();

        for chunk in chunks {
            let chunk = Arc::new(chunk);

            let keyed: Vec<(Fingerprint, usize, Vec<usize>)> = if chunk.dominant_entry().is_some() {
                chunk
                    .entries
                    .iter()
                    .filter(|e| e.is_error_candidate())
                    .map(|e| (self.normalizer.fingerprint_entry(e), e.sequence, vec![e.sequence]))
                    .collect()
            } else {
                let first = chunk.entries.first().map(|e| e.sequence).unwrap_or(0);
                vec![(
                    self.normalizer.fingerprint_chunk(&chunk),
                    first,
                    chunk.sequences().collect(),
                )]
            };

            for (fingerprint, dominant, sequences) in keyed {
                match index.get(&fingerprint) {
                    Some(&pos) => units[pos].occurrence_sequences.extend(sequences),
                    None => {
                        index.insert(fingerprint.clone(), units.len());
                        units.push(AnalysisUnit {
                            fingerprint,
                            representative_chunk: Arc::clone(&chunk),
                            dominant_sequence: dominant,
                            occurrence_sequences: sequences.into_iter().collect(),
                        });
                    }
                }
            }
        }

        units
    }
}

impl Default for Deduplicator {
    fn default() -> Self {
        Self::new(Normalizer::default())
    }
}
