//! Pipeline orchestration
//!
//! parse -> chunk -> deduplicate runs synchronously; units are then analyzed
//! on a bounded pool of tasks. Every unit ends with exactly one result: a
//! slow, failing or cancelled unit turns into a FAILED result instead of
//! taking the batch down with it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use errlens_core::{AnalysisUnit, Chunk, Fingerprint, LogEntry, LogLevel};
use errlens_rag::{
    AnalysisResult, Analyzer, ConfidenceScorer, Embedder, HistoryContext, HistoryIndex, HistoryRecord,
    LlmClient, PromptBuilder, RetryPolicy, Severity,
};
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{Instant, timeout, timeout_at};
use tracing::{debug, info, warn};

use crate::aggregate::{AnalysisReport, ResultAggregator};
use crate::config::{ConfigError, PipelineConfig, PipelineSettings};
use crate::preprocess::{Preprocessed, Preprocessor};
use crate::setup;

// time history writes get past the run deadline
const WRITE_GRACE: Duration = Duration::from_millis(200);

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("fatal configuration error: {0}")]
    Configuration(#[from] ConfigError),
}

pub struct Pipeline {
    preprocessor: Preprocessor,
    settings: PipelineSettings,
    analyzer: Arc<Analyzer>,
    embedder: Arc<dyn Embedder>,
    history: Arc<dyn HistoryIndex>,
}

impl Pipeline {
    /// Wire a pipeline around explicit collaborators.
    /// Fails before any work is done if the configuration is unusable.
    pub fn new(
        config: &PipelineConfig,
        client: Arc<dyn LlmClient>,
        embedder: Arc<dyn Embedder>,
        history: Arc<dyn HistoryIndex>,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        let preprocessor = Preprocessor::from_config(config)?;

        let analyzer = Analyzer::new(client)
            .with_prompts(PromptBuilder::new(config.pipeline.history_k))
            .with_retry(RetryPolicy::new(config.model.max_attempts, config.model.backoff()))
            .with_scorer(ConfidenceScorer::new(config.scoring));

        Ok(Self {
            preprocessor,
            settings: config.pipeline.clone(),
            analyzer: Arc::new(analyzer),
            embedder,
            history,
        })
    }

    /// Build the configured model client, embedder and history index.
    /// Missing model credentials are fatal; an unreachable history is not.
    pub async fn from_config(config: &PipelineConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        let client = setup::build_llm_client(&config.model)?;
        let embedder = setup::build_embedder();
        if embedder.dimensions() != 0 && embedder.dimensions() != config.history.dimensions {
            warn!(
                embedder = embedder.dimensions(),
                configured = config.history.dimensions,
                "Embedding size differs from history.dimensions"
            );
        }
        let history = setup::build_history_index(&config.history).await;
        Self::new(config, client, embedder, history)
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn history(&self) -> &Arc<dyn HistoryIndex> {
        &self.history
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    pub fn parse(&self, text: &str) -> Vec<LogEntry> {
        self.preprocessor.parse(text)
    }

    pub fn chunk(&self, entries: &[LogEntry]) -> Vec<Chunk> {
        self.preprocessor.chunk(entries)
    }

    pub fn preprocess(&self, text: &str) -> Preprocessed {
        self.preprocessor.run(text)
    }

    pub async fn run(&self, text: &str) -> AnalysisReport {
        self.run_with_deadline(text, None).await
    }

    /// Run with an overall deadline. Units still pending when it passes are
    /// cancelled and reported FAILED; finished ones are kept.
    pub async fn run_with_deadline(&self, text: &str, deadline: Option<Duration>) -> AnalysisReport {
        let started = std::time::Instant::now();
        let Preprocessed { entries, chunks, units } = self.preprocess(text);

        info!(
            entries = entries.len(),
            chunks = chunks.len(),
            units = units.len(),
            concurrency = self.settings.concurrency,
            model = self.analyzer.model(),
            history = self.history.backend(),
            "Starting analysis run"
        );

        let results = self.analyze_units(&units, deadline).await;
        let analyzed: Vec<(AnalysisUnit, AnalysisResult)> = units.into_iter().zip(results).collect();
        let report = ResultAggregator::new().aggregate(&analyzed, &entries);

        let s = &report.summary;
        info!(
            total = s.total,
            critical = s.critical,
            high = s.high,
            ok = s.ok,
            degraded = s.degraded,
            failed = s.failed,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Analysis run complete"
        );
        report
    }

    async fn analyze_units(&self, units: &[AnalysisUnit], deadline: Option<Duration>) -> Vec<AnalysisResult> {
        // a deadline too far out to represent is no deadline at all
        let deadline = deadline.and_then(|d| Instant::now().checked_add(d));
        let semaphore = Arc::new(Semaphore::new(self.settings.concurrency));
        let worker = Arc::new(UnitWorker {
            analyzer: Arc::clone(&self.analyzer),
            embedder: Arc::clone(&self.embedder),
            history: Arc::clone(&self.history),
            history_k: self.settings.history_k,
        });
        let writer = Arc::new(HistoryWriter::new(Arc::clone(&self.history)));
        let unit_timeout = self.settings.unit_timeout();

        let mut tasks = JoinSet::new();
        for (idx, unit) in units.iter().cloned().enumerate() {
            let worker = Arc::clone(&worker);
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return (idx, UnitDone::failed(&unit, "worker pool closed"));
                };
                match timeout(unit_timeout, worker.process(&unit)).await {
                    Ok(done) => (idx, done),
                    Err(_) => {
                        warn!(fingerprint = %unit.fingerprint, timeout_secs = unit_timeout.as_secs(), "Unit timed out");
                        let cause = format!("analysis timed out after {}s", unit_timeout.as_secs());
                        (idx, UnitDone::failed(&unit, cause))
                    }
                }
            });
        }

        let mut slots: Vec<Option<AnalysisResult>> = vec![None; units.len()];
        let mut writes = JoinSet::new();
        let mut deadline_hit = false;

        loop {
            let next = match deadline {
                Some(at) => match timeout_at(at, tasks.join_next()).await {
                    Ok(next) => next,
                    Err(_) => {
                        deadline_hit = true;
                        break;
                    }
                },
                None => tasks.join_next().await,
            };
            let Some(joined) = next else { break };

            match joined {
                Ok((idx, done)) => {
                    if self.settings.write_history && done.result.is_ok() {
                        if let Some(embedding) = done.embedding {
                            let unit = &units[idx];
                            let record = HistoryRecord::new(unit.fingerprint.clone(), embedding, done.result.clone());
                            let writer = Arc::clone(&writer);
                            writes.spawn(async move {
                                if timeout(unit_timeout, writer.write(record)).await.is_err() {
                                    warn!("History write timed out");
                                }
                            });
                        }
                    }
                    slots[idx] = Some(done.result);
                }
                Err(e) => warn!(error = %e, "Analysis task aborted"),
            }
        }

        if deadline_hit {
            warn!(pending = tasks.len(), "Run deadline reached, cancelling unfinished units");
            tasks.shutdown().await;
        }

        // writes that already started may land, within the run deadline
        let drain_until = deadline.map(|at| at.checked_add(WRITE_GRACE).unwrap_or(at));
        loop {
            let next = match drain_until {
                Some(at) => match timeout_at(at, writes.join_next()).await {
                    Ok(next) => next,
                    Err(_) => {
                        warn!(dropped = writes.len(), "Run deadline reached, abandoning pending history writes");
                        writes.shutdown().await;
                        break;
                    }
                },
                None => writes.join_next().await,
            };
            let Some(joined) = next else { break };
            if let Err(e) = joined {
                warn!(error = %e, "History write task aborted");
            }
        }

        slots
            .into_iter()
            .zip(units)
            .map(|(slot, unit)| {
                slot.unwrap_or_else(|| {
                    let cause = if deadline_hit {
                        "analysis cancelled: run deadline exceeded"
                    } else {
                        "analysis task aborted"
                    };
                    UnitDone::failed(unit, cause).result
                })
            })
            .collect()
    }
}

struct UnitDone {
    result: AnalysisResult,
    /// kept for the history write
    embedding: Option<Vec<f32>>,
}

impl UnitDone {
    fn failed(unit: &AnalysisUnit, cause: impl Into<String>) -> Self {
        let level = unit.dominant_entry().map(|e| e.level).unwrap_or(LogLevel::Unknown);
        let mut result = AnalysisResult::failed(unit.error_message(), Severity::from_log_level(level), cause);
        result.truncated = unit.representative_chunk.truncated;
        Self { result, embedding: None }
    }
}

struct UnitWorker {
    analyzer: Arc<Analyzer>,
    embedder: Arc<dyn Embedder>,
    history: Arc<dyn HistoryIndex>,
    history_k: usize,
}

impl UnitWorker {
    async fn process(&self, unit: &AnalysisUnit) -> UnitDone {
        let text = match unit.dominant_entry() {
            Some(entry) => format!("{} {}", entry.header(), unit.error_message()),
            None => unit.error_message(),
        };

        let (context, embedding) = match self.embedder.embed(&text).await {
            Ok(embedding) => match self.history.query(&embedding, self.history_k).await {
                Ok(references) => (HistoryContext::Retrieved(references), Some(embedding)),
                Err(e) => {
                    warn!(fingerprint = %unit.fingerprint, error = %e, "History index unavailable");
                    (HistoryContext::Unavailable(e.to_string()), Some(embedding))
                }
            },
            Err(e) => {
                warn!(fingerprint = %unit.fingerprint, error = %e, "History index unavailable");
                (HistoryContext::Unavailable(e.to_string()), None)
            }
        };

        let outcome = self.analyzer.analyze(unit, context).await;
        debug!(
            fingerprint = %unit.fingerprint,
            status = ?outcome.result.status,
            invocations = outcome.invocations,
            occurrences = unit.occurrence_count(),
            "Unit analyzed"
        );

        UnitDone {
            result: outcome.result,
            embedding,
        }
    }
}

/// Serializes history writes per fingerprint and writes each one at most once per run
struct HistoryWriter {
    history: Arc<dyn HistoryIndex>,
    gates: Mutex<HashMap<Fingerprint, Arc<tokio::sync::Mutex<bool>>>>,
}

impl HistoryWriter {
    fn new(history: Arc<dyn HistoryIndex>) -> Self {
        Self {
            history,
            gates: Mutex::new(HashMap::new()),
        }
    }

    async fn write(&self, record: HistoryRecord) {
        let gate = {
            let mut gates = match self.gates.lock() {
                Ok(gates) => gates,
                Err(poisoned) => poisoned.into_inner(),
            };
            Arc::clone(gates.entry(record.fingerprint.clone()).or_default())
        };

        let mut written = gate.lock().await;
        if *written {
            debug!(fingerprint = %record.fingerprint, "History record already written this run");
            return;
        }

        let fingerprint = record.fingerprint.clone();
        match self.history.write(record).await {
            Ok(()) => *written = true,
            Err(e) => warn!(fingerprint = %fingerprint, error = %e, "History write failed"),
        }
    }
}
