// History index - durable memory of previously analyzed errors
// Records are append-only; a newer record for the same fingerprint supersedes older ones.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use errlens_core::Fingerprint;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

use crate::result::{AnalysisResult, HistoryReference};

#[derive(Error, Debug)]
pub enum VectorStoreError {
    #[error("history index unavailable: {0}")]
    Unavailable(String),

    #[error("embedding failed: {0}")]
    Embedding(String),

    #[error("history store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("history record serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub fingerprint: Fingerprint,
    pub embedding: Vec<f32>,
    pub result: AnalysisResult,
    pub created_at: DateTime<Utc>,
}

impl HistoryRecord {
    /// Stored results never carry their own retrieved context
    pub fn new(fingerprint: Fingerprint, embedding: Vec<f32>, mut result: AnalysisResult) -> Self {
        result.similar_history.clear();
        Self {
            fingerprint,
            embedding,
            result,
            created_at: Utc::now(),
        }
    }

    pub fn to_reference(&self, similarity: f32) -> HistoryReference {
        HistoryReference {
            fingerprint: self.fingerprint.clone(),
            similarity,
            error_message: self.result.error_message.clone(),
            explanation: self.result.explanation.clone(),
            severity: self.result.severity,
            created_at: self.created_at,
        }
    }
}

#[async_trait]
pub trait HistoryIndex: Send + Sync {
    /// Up to `k` references ranked by descending similarity, newest first on ties
    async fn query(&self, embedding: &[f32], k: usize) -> Result<Vec<HistoryReference>, VectorStoreError>;

    /// Append a record. Visible to every `query` issued after this returns.
    async fn write(&self, record: HistoryRecord) -> Result<(), VectorStoreError>;

    fn backend(&self) -> &str;
}

/// Cosine similarity; vectors of different length or zero norm score 0
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Keep the newest reference per fingerprint, then order and cut to `k`
pub fn rank_references(candidates: Vec<HistoryReference>, k: usize) -> Vec<HistoryReference> {
    let mut newest: HashMap<Fingerprint, HistoryReference> = HashMap::new();
    for candidate in candidates {
        match newest.get(&candidate.fingerprint) {
            Some(existing) if existing.created_at >= candidate.created_at => {}
            _ => {
                newest.insert(candidate.fingerprint.clone(), candidate);
            }
        }
    }

    let mut ranked: Vec<HistoryReference> = newest.into_values().collect();
    ranked.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(Ordering::Equal)
            .then_with(|| b.created_at.cmp(&a.created_at))
            .then_with(|| a.fingerprint.cmp(&b.fingerprint))
    });
    ranked.truncate(k);
    ranked
}

/// JSON-lines file plus an in-memory copy searched by brute force.
///
/// Writes append to the file before they become visible in memory, and both
/// happen under the same lock, so a write that returned is seen by every
/// later query.
pub struct LocalHistoryIndex {
    path: Option<PathBuf>,
    records: RwLock<Vec<HistoryRecord>>,
}

impl LocalHistoryIndex {
    /// Non-durable index (tests, dry runs)
    pub fn in_memory() -> Self {
        Self {
            path: None,
            records: RwLock::new(Vec::new()),
        }
    }

    /// Open or create the store at `path`. Corrupt lines are skipped.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, VectorStoreError> {
        let path = path.as_ref().to_path_buf();
        let mut records = Vec::new();

        match tokio::fs::read_to_string(&path).await {
            Ok(content) => {
                for (i, line) in content.lines().enumerate() {
                    if line.trim().is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<HistoryRecord>(line) {
                        Ok(record) => records.push(record),
                        Err(e) => {
                            tracing::warn!(path = %path.display(), line = i + 1, error = %e, "Skipping corrupt history record");
                        }
                    }
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    tokio::fs::create_dir_all(parent).await?;
                }
            }
            Err(e) => return Err(e.into()),
        }

        tracing::info!(path = %path.display(), records = records.len(), "History store opened");

        Ok(Self {
            path: Some(path),
            records: RwLock::new(records),
        })
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl HistoryIndex for LocalHistoryIndex {
    async fn query(&self, embedding: &[f32], k: usize) -> Result<Vec<HistoryReference>, VectorStoreError> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let records = self.records.read().await;
        let candidates = records
            .iter()
            .map(|r| r.to_reference(cosine_similarity(embedding, &r.embedding)))
            .collect();
        Ok(rank_references(candidates, k))
    }

    async fn write(&self, record: HistoryRecord) -> Result<(), VectorStoreError> {
        let mut records = self.records.write().await;

        if let Some(path) = &self.path {
            let mut line = serde_json::to_string(&record)?;
            line.push('\n');
            let mut file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .await?;
            file.write_all(line.as_bytes()).await?;
            file.flush().await?;
        }

        records.push(record);
        Ok(())
    }

    fn backend(&self) -> &str {
        "local"
    }
}
