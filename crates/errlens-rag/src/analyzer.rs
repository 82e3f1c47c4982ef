// Analyzer - one analysis unit in, one result out
// Model invocation and schema repair are bounded loops; nothing here aborts the batch.

use std::sync::Arc;
use std::time::Duration;

use errlens_core::{AnalysisUnit, LogLevel};
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::llm_client::{LlmClient, LlmError};
use crate::prompt::PromptBuilder;
use crate::response::{parse_model_output, ModelAnalysis, SchemaError};
use crate::result::{AnalysisResult, HistoryReference, ResultStatus, Severity};
use crate::scorer::ConfidenceScorer;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// total model invocations allowed per unit
    pub max_attempts: u32,
    /// base delay before retrying a failed invocation, doubled each time
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    fn delay_for(&self, failures: u32, err: &LlmError) -> Duration {
        let exp = failures.saturating_sub(1).min(6);
        let delay = self.backoff * 2u32.pow(exp);
        match err {
            LlmError::RateLimited(_) => delay * 2,
            _ => delay,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(500))
    }
}

/// What the history index gave us for this unit
#[derive(Debug, Clone)]
pub enum HistoryContext {
    Retrieved(Vec<HistoryReference>),
    /// index unreachable; the cause is kept for logging
    Unavailable(String),
}

impl HistoryContext {
    pub fn references(&self) -> &[HistoryReference] {
        match self {
            HistoryContext::Retrieved(refs) => refs,
            HistoryContext::Unavailable(_) => &[],
        }
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, HistoryContext::Unavailable(_))
    }

    fn similarities(&self) -> Option<Vec<f32>> {
        match self {
            HistoryContext::Retrieved(refs) => Some(refs.iter().map(|r| r.similarity).collect()),
            HistoryContext::Unavailable(_) => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AnalysisOutcome {
    pub result: AnalysisResult,
    /// validated self-reported confidence, before scoring
    pub model_confidence: Option<f32>,
    pub invocations: u32,
}

enum Failure {
    Invocation(LlmError),
    Schema(SchemaError),
}

pub struct Analyzer {
    client: Arc<dyn LlmClient>,
    prompts: PromptBuilder,
    retry: RetryPolicy,
    scorer: ConfidenceScorer,
}

impl Analyzer {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self {
            client,
            prompts: PromptBuilder::default(),
            retry: RetryPolicy::default(),
            scorer: ConfidenceScorer::default(),
        }
    }

    pub fn with_prompts(mut self, prompts: PromptBuilder) -> Self {
        self.prompts = prompts;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_scorer(mut self, scorer: ConfidenceScorer) -> Self {
        self.scorer = scorer;
        self
    }

    pub fn model(&self) -> &str {
        self.client.model()
    }

    /// Analyze one unit. Always yields a result: OK, or DEGRADED after schema
    /// repair ran out, or FAILED when the model could not be invoked.
    pub async fn analyze(&self, unit: &AnalysisUnit, context: HistoryContext) -> AnalysisOutcome {
        let references: Vec<HistoryReference> = context
            .references()
            .iter()
            .take(self.prompts.max_history())
            .cloned()
            .collect();
        let base_prompt = self.prompts.build(unit, &references);
        let mut prompt = base_prompt.clone();

        let error_message = unit.error_message();
        let fallback_severity = Severity::from_log_level(
            unit.dominant_entry().map(|e| e.level).unwrap_or(LogLevel::Unknown),
        );

        let mut invocations = 0;
        let mut invocation_failures = 0;
        let mut last_failure: Option<Failure> = None;

        while invocations < self.retry.max_attempts {
            if let Some(Failure::Invocation(err)) = &last_failure {
                sleep(self.retry.delay_for(invocation_failures, err)).await;
            }

            invocations += 1;
            let raw = match self.client.generate(&prompt).await {
                Ok(raw) => raw,
                Err(err) => {
                    invocation_failures += 1;
                    warn!(
                        fingerprint = %unit.fingerprint,
                        attempt = invocations,
                        class = err.class(),
                        error = %err,
                        "Model invocation failed"
                    );
                    let retryable = err.is_retryable();
                    last_failure = Some(Failure::Invocation(err));
                    if !retryable {
                        break;
                    }
                    continue;
                }
            };

            match parse_model_output(&raw) {
                Ok(model) => {
                    debug!(fingerprint = %unit.fingerprint, attempt = invocations, "Model response accepted");
                    let confidence = model.confidence;
                    let result = self.finish(unit, error_message, model, references, &context);
                    return AnalysisOutcome {
                        result,
                        model_confidence: Some(confidence),
                        invocations,
                    };
                }
                Err(err) => {
                    warn!(
                        fingerprint = %unit.fingerprint,
                        attempt = invocations,
                        class = "schema",
                        error = %err,
                        "Model response rejected"
                    );
                    prompt = self.prompts.corrective(&base_prompt, &err);
                    last_failure = Some(Failure::Schema(err));
                }
            }
        }

        let mut result = match last_failure {
            Some(Failure::Schema(err)) => {
                warn!(fingerprint = %unit.fingerprint, invocations, cause = %err, "Unit degraded");
                AnalysisResult::degraded(
                    error_message,
                    fallback_severity,
                    format!("model output rejected after {} attempts: {}", invocations, err),
                )
            }
            Some(Failure::Invocation(err)) => {
                warn!(fingerprint = %unit.fingerprint, invocations, cause = %err, "Unit failed");
                AnalysisResult::failed(
                    error_message,
                    fallback_severity,
                    format!("model invocation failed after {} attempts: {}", invocations, err),
                )
            }
            None => AnalysisResult::failed(error_message, fallback_severity, "model was never invoked"),
        };
        result.no_history_context = context.is_unavailable();
        result.truncated = unit.representative_chunk.truncated;

        AnalysisOutcome {
            result,
            model_confidence: None,
            invocations,
        }
    }

    fn finish(
        &self,
        unit: &AnalysisUnit,
        error_message: String,
        model: ModelAnalysis,
        references: Vec<HistoryReference>,
        context: &HistoryContext,
    ) -> AnalysisResult {
        let similarities = context.similarities();
        let confidence_score = self.scorer.score(model.confidence, similarities.as_deref());

        let error_message = if error_message.trim().is_empty() {
            model.error_message.unwrap_or(error_message)
        } else {
            error_message
        };

        AnalysisResult {
            error_message,
            explanation: model.explanation,
            possible_causes: model.possible_causes,
            severity: model.severity,
            recommendations: model.recommendations,
            confidence_score,
            similar_history: references,
            status: ResultStatus::Ok,
            no_history_context: context.is_unavailable(),
            truncated: unit.representative_chunk.truncated,
            failure_cause: None,
        }
    }
}
