//! Builders for the pipeline's external collaborators
//!
//! Model credentials are mandatory and fail the run up front. The embedder and
//! the history store are best effort: when they can't be reached the run goes
//! on without historical context.

use std::sync::Arc;

use async_trait::async_trait;
use errlens_rag::{
    Embedder, FastEmbedder, GroqClient, HistoryIndex, HistoryRecord, HistoryReference, LlmClient,
    LlmError, LocalHistoryIndex, OllamaClient, QdrantHistoryIndex, VectorStoreError,
};
use tracing::{info, warn};

use crate::config::{ConfigError, HistoryBackend, HistoryConfig, ModelConfig, Provider};

pub fn build_llm_client(config: &ModelConfig) -> Result<Arc<dyn LlmClient>, ConfigError> {
    let client: Arc<dyn LlmClient> = match config.provider {
        Provider::Groq => {
            let client = GroqClient::from_env_var(&config.api_key_env, config.model_id()).map_err(|e| match e {
                LlmError::MissingApiKey(var) => ConfigError::MissingCredentials(var),
                other => ConfigError::Invalid(other.to_string()),
            })?;
            Arc::new(client.with_temperature(config.temperature))
        }
        Provider::Ollama => Arc::new(
            OllamaClient::new(&config.ollama_url, config.model_id()).with_temperature(config.temperature),
        ),
    };
    info!(provider = client.provider(), model = client.model(), "Model client ready");
    Ok(client)
}

pub fn build_embedder() -> Arc<dyn Embedder> {
    match FastEmbedder::try_new() {
        Ok(embedder) => Arc::new(embedder),
        Err(e) => {
            warn!(error = %e, "Embedding model unavailable, running without history context");
            Arc::new(Offline::new(e.to_string()))
        }
    }
}

pub async fn build_history_index(config: &HistoryConfig) -> Arc<dyn HistoryIndex> {
    let index: Result<Arc<dyn HistoryIndex>, VectorStoreError> = match config.backend {
        HistoryBackend::Local => LocalHistoryIndex::open(&config.path)
            .await
            .map(|index| Arc::new(index) as Arc<dyn HistoryIndex>),
        HistoryBackend::Qdrant => {
            QdrantHistoryIndex::connect(&config.qdrant_url, config.collection.clone(), config.dimensions as u64)
                .await
                .map(|index| Arc::new(index) as Arc<dyn HistoryIndex>)
        }
    };

    match index {
        Ok(index) => index,
        Err(e) => {
            warn!(backend = ?config.backend, error = %e, "History index unavailable, running without history context");
            Arc::new(Offline::new(e.to_string()))
        }
    }
}

/// Stand-in for a collaborator that could not be set up; every call fails
/// with `VectorStoreError::Unavailable`.
pub struct Offline {
    cause: String,
}

impl Offline {
    pub fn new(cause: impl Into<String>) -> Self {
        Self { cause: cause.into() }
    }
}

#[async_trait]
impl Embedder for Offline {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, VectorStoreError> {
        Err(VectorStoreError::Unavailable(self.cause.clone()))
    }

    fn dimensions(&self) -> usize {
        0
    }
}

#[async_trait]
impl HistoryIndex for Offline {
    async fn query(&self, _embedding: &[f32], _k: usize) -> Result<Vec<HistoryReference>, VectorStoreError> {
        Err(VectorStoreError::Unavailable(self.cause.clone()))
    }

    async fn write(&self, _record: HistoryRecord) -> Result<(), VectorStoreError> {
        Err(VectorStoreError::Unavailable(self.cause.clone()))
    }

    fn backend(&self) -> &str {
        "offline"
    }
}
