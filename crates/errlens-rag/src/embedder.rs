// Text -> vector embedding

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};

use crate::history::VectorStoreError;

#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, VectorStoreError>;

    fn dimensions(&self) -> usize;
}

/// Local AllMiniLM-L6-v2 model, 384 dimensions, no API key needed
pub struct FastEmbedder {
    model: Arc<Mutex<TextEmbedding>>,
}

impl FastEmbedder {
    pub const DIMENSIONS: usize = 384;

    /// Loads (and on first use downloads) the model
    pub fn try_new() -> Result<Self, VectorStoreError> {
        let model = TextEmbedding::try_new(InitOptions::new(EmbeddingModel::AllMiniLML6V2))
            .map_err(|e| VectorStoreError::Embedding(e.to_string()))?;
        Ok(Self {
            model: Arc::new(Mutex::new(model)),
        })
    }
}

#[async_trait]
impl Embedder for FastEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, VectorStoreError> {
        let model = Arc::clone(&self.model);
        let text = text.to_string();

        // inference is CPU bound, keep it off the async workers
        tokio::task::spawn_blocking(move || {
            let mut model = model
                .lock()
                .map_err(|_| VectorStoreError::Embedding("embedding model lock poisoned".to_string()))?;
            let embeddings = model
                .embed(vec![text], None)
                .map_err(|e| VectorStoreError::Embedding(e.to_string()))?;
            embeddings
                .into_iter()
                .next()
                .ok_or_else(|| VectorStoreError::Embedding("No embedding".to_string()))
        })
        .await
        .map_err(|e| VectorStoreError::Embedding(e.to_string()))?
    }

    fn dimensions(&self) -> usize {
        Self::DIMENSIONS
    }
}
