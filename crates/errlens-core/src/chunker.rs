//! Chunker - greedy, order-preserving packing of entries under a token budget

use crate::{Chunk, LogEntry};
use std::sync::OnceLock;
use tiktoken_rs::CoreBPE;

const TRUNCATION_MARKER: &str = "[truncated]";

// joining two raw lines costs one newline token
const SEPARATOR_TOKENS: usize = 1;

static CL100K: OnceLock<CoreBPE> = OnceLock::new();

/// Model-token counter over the cl100k_base encoding
#[derive(Clone, Copy)]
pub struct TokenEstimator {
    bpe: &'static CoreBPE,
}

impl TokenEstimator {
    pub fn cl100k() -> Self {
        let bpe = CL100K.get_or_init(|| tiktoken_rs::cl100k_base().expect("embedded cl100k_base ranks"));
        Self { bpe }
    }

    pub fn count(&self, text: &str) -> usize {
        self.bpe.encode_ordinary(text).len()
    }

    /// Longest token prefix of `text` that fits in `max_tokens`. A cut that
    /// lands inside a multi-byte character backs off to the previous token.
    pub fn truncate(&self, text: &str, max_tokens: usize) -> String {
        let tokens = self.bpe.encode_ordinary(text);
        if tokens.len() <= max_tokens {
            return text.to_string();
        }

        let mut keep = max_tokens;
        while keep > 0 {
            if let Ok(prefix) = self.bpe.decode(tokens[..keep].to_vec()) {
                return prefix.trim_end().to_string();
            }
            keep -= 1;
        }
        String::new()
    }
}

impl Default for TokenEstimator {
    fn default() -> Self {
        Self::cl100k()
    }
}

impl std::fmt::Debug for TokenEstimator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("TokenEstimator(cl100k_base)")
    }
}

pub struct Chunker {
    max_tokens: usize,
    estimator: TokenEstimator,
}

impl Chunker {
    pub fn new(max_tokens: usize) -> Self {
        Self {
            max_tokens,
            estimator: TokenEstimator::default(),
        }
    }

    pub fn with_estimator(max_tokens: usize, estimator: TokenEstimator) -> Self {
        Self { max_tokens, estimator }
    }

    pub fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    pub fn entry_tokens(&self, entry: &LogEntry) -> usize {
        self.estimator.count(&entry.raw_line)
    }

    /// Pack entries in source order. Same entries and budget always yield
    /// the same boundaries.
    pub fn chunk(&self, entries: &[LogEntry]) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        let mut current: Vec<LogEntry> = Vec::new();
        let mut current_tokens = 0;

        for entry in entries {
            let tokens = self.entry_tokens(entry);

            if tokens > self.max_tokens {
                // close whatever is open, the oversized entry stands alone
                if !current.is_empty() {
                    chunks.push(self.close(&mut current, &mut current_tokens));
                }
                chunks.push(self.truncated_chunk(entry));
                continue;
            }

            if !current.is_empty() && current_tokens + SEPARATOR_TOKENS + tokens > self.max_tokens {
                chunks.push(self.close(&mut current, &mut current_tokens));
            }

            current_tokens += if current.is_empty() { tokens } else { tokens + SEPARATOR_TOKENS };
            current.push(entry.clone());
        }

        if !current.is_empty() {
            chunks.push(self.close(&mut current, &mut current_tokens));
        }

        chunks
    }

    fn close(&self, current: &mut Vec<LogEntry>, current_tokens: &mut usize) -> Chunk {
        let mut chunk = Chunk {
            entries: std::mem::take(current),
            token_count: 0,
            truncated: false,
            excerpt: None,
        };
        chunk.token_count = self.estimator.count(&chunk.text());
        *current_tokens = 0;
        chunk
    }

    // budget covers "LEVEL [component] <message prefix> [truncated]"
    fn truncated_chunk(&self, entry: &LogEntry) -> Chunk {
        let overhead =
            self.estimator.count(&entry.header()) + self.estimator.count(TRUNCATION_MARKER) + 2;
        let mut budget = self.max_tokens.saturating_sub(overhead);

        loop {
            let kept = self.estimator.truncate(&entry.message, budget);
            let excerpt = if kept.is_empty() {
                TRUNCATION_MARKER.to_string()
            } else {
                format!("{} {}", kept, TRUNCATION_MARKER)
            };

            let mut chunk = Chunk {
                entries: vec![entry.clone()],
                token_count: 0,
                truncated: true,
                excerpt: Some(excerpt),
            };
            chunk.token_count = self.estimator.count(&chunk.text());

            // merges at the joins can cost a token more than the parts
            if chunk.token_count <= self.max_tokens || kept.is_empty() {
                return chunk;
            }
            budget = budget.saturating_sub(chunk.token_count - self.max_tokens);
        }
    }
}

/// Convenience wrapper with the default estimator
pub fn chunk(entries: &[LogEntry], max_tokens: usize) -> Vec<Chunk> {
    Chunker::new(max_tokens).chunk(entries)
}
