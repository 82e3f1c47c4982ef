// errlens RAG layer - retrieval-augmented analysis of deduplicated errors

pub mod analyzer;
pub mod embedder;
pub mod groq_client;
pub mod history;
pub mod llm_client;
pub mod ollama_client;
pub mod prompt;
pub mod qdrant;
pub mod response;
pub mod result;
pub mod scorer;

pub use analyzer::{AnalysisOutcome, Analyzer, HistoryContext, RetryPolicy};
pub use embedder::{Embedder, FastEmbedder};
pub use groq_client::GroqClient;
pub use history::{cosine_similarity, rank_references, HistoryIndex, HistoryRecord, LocalHistoryIndex, VectorStoreError};
pub use llm_client::{LlmClient, LlmError};
pub use ollama_client::OllamaClient;
pub use prompt::PromptBuilder;
pub use qdrant::QdrantHistoryIndex;
pub use response::{parse_model_output, ModelAnalysis, SchemaError};
pub use result::{AnalysisResult, HistoryReference, ResultStatus, Severity};
pub use scorer::{ConfidenceScorer, ScoringWeights};
