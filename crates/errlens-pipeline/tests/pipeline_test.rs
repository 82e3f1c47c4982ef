use async_trait::async_trait;
use errlens_pipeline::{Offline, Pipeline, PipelineConfig, PipelineError};
use errlens_rag::{
    Embedder, HistoryIndex, HistoryRecord, HistoryReference, LlmClient, LlmError, LocalHistoryIndex, ResultStatus,
    Severity, VectorStoreError,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Scripted model: explains whatever error it is shown.
/// Messages containing FAIL_ME always time out, SLOW ones hang for seconds.
#[derive(Default)]
struct FakeModel {
    calls: Mutex<HashMap<String, usize>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    delay: Duration,
}

impl FakeModel {
    fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }

    fn calls_for(&self, needle: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(msg, _)| msg.contains(needle))
            .map(|(_, n)| n)
            .sum()
    }
}

fn error_line(prompt: &str) -> String {
    prompt
        .lines()
        .find_map(|l| l.strip_prefix("ERROR: "))
        .unwrap_or_default()
        .to_string()
}

#[async_trait]
impl LlmClient for FakeModel {
    async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        let message = error_line(prompt);
        *self.calls.lock().unwrap().entry(message.clone()).or_insert(0) += 1;

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if message.contains("SLOW") {
            tokio::time::sleep(Duration::from_secs(10)).await;
        } else {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if message.contains("FAIL_ME") {
            return Err(LlmError::Timeout);
        }

        let severity = if message.contains("memory") { "CRITICAL" } else { "HIGH" };
        Ok(serde_json::json!({
            "error_message": message,
            "explanation": format!("Explanation of: {}", message),
            "possible_causes": ["something upstream"],
            "severity": severity,
            "recommendations": ["look at the logs"],
            "confidence_score": 0.7
        })
        .to_string())
    }

    fn model(&self) -> &str {
        "fake"
    }

    fn provider(&self) -> &str {
        "test"
    }
}

/// Deterministic 16-dim byte histogram
struct FakeEmbedder;

#[async_trait]
impl Embedder for FakeEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, VectorStoreError> {
        let mut v = vec![0.0; 16];
        for b in text.bytes() {
            v[(b % 16) as usize] += 1.0;
        }
        Ok(v)
    }

    fn dimensions(&self) -> usize {
        16
    }
}

/// History store that answers queries at once but takes seconds to persist
struct SlowWrites {
    inner: LocalHistoryIndex,
    delay: Duration,
}

#[async_trait]
impl HistoryIndex for SlowWrites {
    async fn query(&self, embedding: &[f32], k: usize) -> Result<Vec<HistoryReference>, VectorStoreError> {
        self.inner.query(embedding, k).await
    }

    async fn write(&self, record: HistoryRecord) -> Result<(), VectorStoreError> {
        tokio::time::sleep(self.delay).await;
        self.inner.write(record).await
    }

    fn backend(&self) -> &str {
        "slow"
    }
}

fn config() -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.model.backoff_ms = 1;
    config.pipeline.unit_timeout_secs = 30;
    config
}

fn pipeline(config: &PipelineConfig, model: Arc<FakeModel>, history: Arc<dyn HistoryIndex>) -> Pipeline {
    Pipeline::new(config, model, Arc::new(FakeEmbedder), history).unwrap()
}

const TIMEOUT_LINE: &str = "Connection timeout after 30 seconds to database server db-prod-01:5432";

#[tokio::test]
async fn duplicate_errors_share_one_analysis() {
    let log = format!(
        "2024-01-15 10:30:45 ERROR [database] {t}\n\
         2024-01-15 10:30:46 INFO [api] GET /health 200\n\
         2024-01-15 10:30:47 WARN [cache] slow response\n\
         2024-01-15 10:31:45 ERROR [database] {t}\n",
        t = TIMEOUT_LINE
    );
    let model = Arc::new(FakeModel::default());
    let report = pipeline(&config(), model.clone(), Arc::new(LocalHistoryIndex::in_memory()))
        .run(&log)
        .await;

    assert_eq!(model.total_calls(), 1);
    assert_eq!(report.entries.len(), 2);
    assert_eq!(report.summary.units, 1);

    let (a, b) = (&report.entries[0].result, &report.entries[1].result);
    assert_eq!(a.explanation, b.explanation);
    assert_eq!(a.severity, b.severity);
    assert_eq!(a.confidence_score, b.confidence_score);
    assert_eq!(report.entries[0].occurrence_sequences, vec![0, 3]);
    assert_eq!(report.entries[0].line_number, 1);
    assert_eq!(report.entries[1].line_number, 4);
}

#[tokio::test]
async fn failing_unit_does_not_affect_the_others() {
    let log = "\
2024-01-15 10:30:45 ERROR [database] Connection refused
2024-01-15 10:30:46 ERROR [payment] FAIL_ME gateway rejected the charge
2024-01-15 10:30:47 CRITICAL [kernel] Out of memory: killed process
2024-01-15 10:30:48 ERROR [auth] invalid token for user";
    let model = Arc::new(FakeModel::default());
    let history = Arc::new(LocalHistoryIndex::in_memory());
    let report = pipeline(&config(), model.clone(), history.clone()).run(log).await;

    assert_eq!(report.entries.len(), 4);
    assert_eq!(report.summary.failed, 1);
    assert_eq!(report.summary.ok, 3);

    let failed: Vec<_> = report
        .entries
        .iter()
        .filter(|e| e.result.status == ResultStatus::Failed)
        .collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].sequence, 1);
    assert!(failed[0].result.error_message.contains("FAIL_ME"));
    assert_eq!(model.calls_for("FAIL_ME"), 3);

    // only successful analyses are remembered
    assert_eq!(history.len().await, 3);

    // CRITICAL first, then by source order
    let order: Vec<usize> = report.entries.iter().map(|e| e.sequence).collect();
    assert_eq!(order, vec![2, 0, 1, 3]);
}

#[tokio::test]
async fn oversized_line_is_truncated_and_still_explained() {
    let long_message = (0..200).map(|i| format!("frame{}", i)).collect::<Vec<_>>().join(" ");
    let log = format!("2024-01-15 10:30:45 ERROR [worker] {}", long_message);

    let mut config = config();
    config.pipeline.max_tokens = 40;
    let model = Arc::new(FakeModel::default());
    let p = pipeline(&config, model.clone(), Arc::new(LocalHistoryIndex::in_memory()));

    let pre = p.preprocess(&log);
    assert_eq!(pre.chunks.len(), 1);
    assert!(pre.chunks[0].truncated);

    let report = p.run(&log).await;
    let result = &report.entries[0].result;
    assert_eq!(result.status, ResultStatus::Ok);
    assert!(result.truncated);
    assert!(result.error_message.ends_with("[truncated]"));
    assert!(result.explanation.contains(&result.error_message));
}

#[tokio::test]
async fn unreachable_history_lowers_confidence_but_stays_ok() {
    let log = "\
2024-01-15 10:30:45 ERROR [database] Connection refused
2024-01-15 10:30:47 CRITICAL [kernel] Out of memory: killed process";

    let reachable = pipeline(
        &config(),
        Arc::new(FakeModel::default()),
        Arc::new(LocalHistoryIndex::in_memory()),
    )
    .run(log)
    .await;
    let unreachable = pipeline(
        &config(),
        Arc::new(FakeModel::default()),
        Arc::new(Offline::new("connection refused")),
    )
    .run(log)
    .await;

    assert_eq!(reachable.entries.len(), unreachable.entries.len());
    for (with, without) in reachable.entries.iter().zip(&unreachable.entries) {
        assert_eq!(with.sequence, without.sequence);
        assert_eq!(without.result.status, ResultStatus::Ok);
        assert!(without.result.no_history_context);
        assert!(without.result.confidence_score < with.result.confidence_score);
    }
}

#[tokio::test]
async fn history_from_a_previous_run_raises_confidence() {
    let log = "2024-01-15 10:30:45 ERROR [database] Connection refused by db-prod-01";
    let history: Arc<dyn HistoryIndex> = Arc::new(LocalHistoryIndex::in_memory());

    let first = pipeline(&config(), Arc::new(FakeModel::default()), history.clone())
        .run(log)
        .await;
    let second = pipeline(&config(), Arc::new(FakeModel::default()), history.clone())
        .run(log)
        .await;

    assert!(first.entries[0].result.similar_history.is_empty());
    let references = &second.entries[0].result.similar_history;
    assert_eq!(references.len(), 1);
    assert!(references[0].similarity > 0.99);
    assert!(second.entries[0].result.confidence_score > first.entries[0].result.confidence_score);
}

#[tokio::test]
async fn worker_pool_respects_concurrency_limit() {
    let log: String = (0..10)
        .map(|i| format!("2024-01-15 10:30:4{} ERROR [svc{}] distinct failure kind {}\n", i, i, "abcdefghij".as_bytes()[i] as char))
        .collect();

    let mut config = config();
    config.pipeline.concurrency = 2;
    let model = Arc::new(FakeModel::with_delay(Duration::from_millis(30)));
    let report = pipeline(&config, model.clone(), Arc::new(LocalHistoryIndex::in_memory()))
        .run(&log)
        .await;

    assert_eq!(report.summary.units, 10);
    assert_eq!(model.total_calls(), 10);
    assert!(model.max_in_flight.load(Ordering::SeqCst) <= 2);
}

#[tokio::test]
async fn deadline_keeps_finished_units_and_fails_the_rest() {
    let log = "\
2024-01-15 10:30:45 ERROR [database] Connection refused
2024-01-15 10:30:46 ERROR [batch] SLOW export never finishes
2024-01-15 10:30:47 ERROR [auth] invalid token for user";

    let model = Arc::new(FakeModel::default());
    let report = pipeline(&config(), model, Arc::new(LocalHistoryIndex::in_memory()))
        .run_with_deadline(log, Some(Duration::from_millis(500)))
        .await;

    assert_eq!(report.entries.len(), 3);
    for entry in &report.entries {
        if entry.sequence == 1 {
            assert_eq!(entry.result.status, ResultStatus::Failed);
            assert!(entry.result.failure_cause.as_deref().unwrap().contains("deadline"));
        } else {
            assert_eq!(entry.result.status, ResultStatus::Ok);
        }
    }
}

#[tokio::test]
async fn slow_unit_hits_its_own_timeout() {
    let log = "\
2024-01-15 10:30:45 ERROR [batch] SLOW export never finishes
2024-01-15 10:30:47 ERROR [auth] invalid token for user";

    let mut config = config();
    config.pipeline.unit_timeout_secs = 1;
    let report = pipeline(&config, Arc::new(FakeModel::default()), Arc::new(LocalHistoryIndex::in_memory()))
        .run(log)
        .await;

    let slow = report.entries.iter().find(|e| e.sequence == 0).unwrap();
    assert_eq!(slow.result.status, ResultStatus::Failed);
    assert!(slow.result.failure_cause.as_deref().unwrap().contains("timed out"));
    assert_eq!(report.summary.ok, 1);
}

#[tokio::test]
async fn unrelated_entries_do_not_change_a_result() {
    let target = "2024-01-15 10:30:45 CRITICAL [kernel] Out of memory: killed process 4411";
    let noise_a = "2024-01-15 10:30:44 ERROR [api] upstream returned 502";
    let noise_b = "2024-01-15 10:30:46 INFO [api] request served";

    let run = |log: String| async move {
        let report = pipeline(&config(), Arc::new(FakeModel::default()), Arc::new(LocalHistoryIndex::in_memory()))
            .run(&log)
            .await;
        report
            .entries
            .into_iter()
            .find(|e| e.result.severity == Severity::Critical)
            .unwrap()
            .result
    };

    let first = run(format!("{}\n{}\n{}", noise_a, target, noise_b)).await;
    let second = run(format!("{}\n{}\n{}", noise_b, target, noise_a)).await;

    assert_eq!(first.explanation, second.explanation);
    assert_eq!(first.severity, second.severity);
    assert_eq!(first.confidence_score, second.confidence_score);
}

#[tokio::test]
async fn all_entries_mode_analyzes_quiet_chunks() {
    let log = "\
2024-01-15 10:30:45 INFO [api] started
2024-01-15 10:30:46 INFO [api] listening";

    let mut config = config();
    config.pipeline.errors_only = false;
    let report = pipeline(&config, Arc::new(FakeModel::default()), Arc::new(LocalHistoryIndex::in_memory()))
        .run(log)
        .await;

    assert_eq!(report.summary.units, 1);
    assert_eq!(report.entries.len(), 2);

    let quiet = pipeline(&crate::config(), Arc::new(FakeModel::default()), Arc::new(LocalHistoryIndex::in_memory()))
        .run(log)
        .await;
    assert!(quiet.entries.is_empty());
    assert_eq!(quiet.summary.entries_scanned, 2);
}

#[test]
fn invalid_configuration_is_fatal_before_any_work() {
    let mut config = config();
    config.pipeline.concurrency = 0;
    let result = Pipeline::new(
        &config,
        Arc::new(FakeModel::default()),
        Arc::new(FakeEmbedder),
        Arc::new(LocalHistoryIndex::in_memory()),
    );
    assert!(matches!(result, Err(PipelineError::Configuration(_))));
}

#[tokio::test]
async fn missing_model_credentials_abort_the_run() {
    let mut config = config();
    config.model.api_key_env = "ERRLENS_TEST_UNSET_GROQ_KEY".to_string();
    let result = Pipeline::from_config(&config).await;
    assert!(matches!(result, Err(PipelineError::Configuration(_))));
}

#[test]
fn shipped_config_file_loads() {
    let config = errlens_pipeline::load_config("../../config/errlens.toml").expect("Failed to load config");
    assert_eq!(config.pipeline.concurrency, 4);
    assert_eq!(config.history.dimensions, 384);
    assert_eq!(config.fingerprint.rules.len(), 1);
    assert_eq!(config.alerts.min_severity, Severity::High);
    assert!(config.fingerprint.build_normalizer().is_ok());
}

#[tokio::test]
async fn slow_history_writes_do_not_outlast_the_deadline() {
    let log = "2024-01-15 10:30:45 ERROR [database] Connection refused";
    let history = Arc::new(SlowWrites {
        inner: LocalHistoryIndex::in_memory(),
        delay: Duration::from_secs(10),
    });

    let started = std::time::Instant::now();
    let report = pipeline(&config(), Arc::new(FakeModel::default()), history)
        .run_with_deadline(log, Some(Duration::from_millis(500)))
        .await;

    assert!(started.elapsed() < Duration::from_secs(3), "run took {:?}", started.elapsed());
    assert_eq!(report.entries.len(), 1);
    assert_eq!(report.entries[0].result.status, ResultStatus::Ok);
}

#[tokio::test]
async fn unrepresentable_deadline_runs_to_completion() {
    let log = "2024-01-15 10:30:45 ERROR [database] Connection refused";
    let report = pipeline(&config(), Arc::new(FakeModel::default()), Arc::new(LocalHistoryIndex::in_memory()))
        .run_with_deadline(log, Some(Duration::MAX))
        .await;

    assert_eq!(report.entries.len(), 1);
    assert_eq!(report.entries[0].result.status, ResultStatus::Ok);
}
