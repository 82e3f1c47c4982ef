//! Pipeline configuration, loaded from TOML
//!
//! Every section and key is optional; missing values take the defaults below.
//! Secrets never live in the file: the model API key and webhook URLs fall
//! back to environment variables.

use errlens_core::{Chunker, Normalizer};
use errlens_rag::{ScoringWeights, Severity};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("missing credentials: {0} is not set")]
    MissingCredentials(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

// upper bound on concurrent units, far below tokio's semaphore limit
pub const MAX_CONCURRENCY: usize = 1024;

// Main config structure
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub pipeline: PipelineSettings,
    pub model: ModelConfig,
    pub history: HistoryConfig,
    pub scoring: ScoringWeights,
    pub fingerprint: FingerprintConfig,
    pub alerts: AlertConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    // token budget per chunk
    pub max_tokens: usize,

    // units analyzed at the same time
    pub concurrency: usize,

    // only ERROR/CRITICAL entries are chunked
    pub errors_only: bool,

    // wall-clock limit for one unit, permit wait excluded
    pub unit_timeout_secs: u64,

    // history references handed to the model
    pub history_k: usize,

    // record OK results in the history index
    pub write_history: bool,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            max_tokens: 500,
            concurrency: 4,
            errors_only: true,
            unit_timeout_secs: 120,
            history_k: 3,
            write_history: true,
        }
    }
}

impl PipelineSettings {
    pub fn unit_timeout(&self) -> Duration {
        Duration::from_secs(self.unit_timeout_secs)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    Groq,
    Ollama,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub provider: Provider,

    // defaults depend on the provider
    pub model_id: Option<String>,

    // env var holding the Groq API key
    pub api_key_env: String,

    pub ollama_url: String,

    // model invocations per unit, first one included
    pub max_attempts: u32,

    pub backoff_ms: u64,

    pub temperature: f32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: Provider::Groq,
            model_id: None,
            api_key_env: "GROQ_API_KEY".to_string(),
            ollama_url: "http://localhost:11434".to_string(),
            max_attempts: 3,
            backoff_ms: 500,
            temperature: 0.1,
        }
    }
}

impl ModelConfig {
    pub fn model_id(&self) -> &str {
        match (&self.model_id, self.provider) {
            (Some(id), _) => id,
            (None, Provider::Groq) => "llama-3.3-70b-versatile",
            (None, Provider::Ollama) => "llama3.2:3b",
        }
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryBackend {
    #[default]
    Local,
    Qdrant,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub backend: HistoryBackend,

    // JSON-lines file for the local backend
    pub path: PathBuf,

    pub qdrant_url: String,

    pub collection: String,

    // embedding size, must match the embedding model
    pub dimensions: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            backend: HistoryBackend::Local,
            path: PathBuf::from(".errlens/history.jsonl"),
            qdrant_url: "http://localhost:6334".to_string(),
            collection: "error_history".to_string(),
            dimensions: 384,
        }
    }
}

// Extra normalization rule applied after (or instead of) the built-in ones
#[derive(Debug, Clone, Deserialize)]
pub struct FingerprintRule {
    pub pattern: String,
    pub placeholder: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FingerprintConfig {
    pub use_default_rules: bool,
    pub rules: Vec<FingerprintRule>,
}

impl Default for FingerprintConfig {
    fn default() -> Self {
        Self {
            use_default_rules: true,
            rules: Vec::new(),
        }
    }
}

impl FingerprintConfig {
    pub fn build_normalizer(&self) -> Result<Normalizer, ConfigError> {
        let mut normalizer = if self.use_default_rules {
            Normalizer::with_default_rules()
        } else {
            Normalizer::new()
        };
        for rule in &self.rules {
            normalizer
                .add_rule(&rule.pattern, &rule.placeholder)
                .map_err(|e| ConfigError::Invalid(format!("fingerprint rule `{}`: {}", rule.pattern, e)))?;
        }
        Ok(normalizer)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    pub enabled: bool,

    // falls back to SLACK_WEBHOOK_URL
    pub slack_webhook_url: Option<String>,

    // falls back to DISCORD_WEBHOOK_URL
    pub discord_webhook_url: Option<String>,

    // alerts fire only if some result is at least this severe
    pub min_severity: Severity,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            slack_webhook_url: None,
            discord_webhook_url: None,
            min_severity: Severity::High,
        }
    }
}

impl AlertConfig {
    pub fn slack_url(&self) -> Option<String> {
        non_empty(self.slack_webhook_url.clone()).or_else(|| non_empty(std::env::var("SLACK_WEBHOOK_URL").ok()))
    }

    pub fn discord_url(&self) -> Option<String> {
        non_empty(self.discord_webhook_url.clone())
            .or_else(|| non_empty(std::env::var("DISCORD_WEBHOOK_URL").ok()))
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl PipelineConfig {
    /// Reject settings that would make a run meaningless.
    /// Credentials are checked separately when the model client is built.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let p = &self.pipeline;
        if p.max_tokens == 0 {
            return Err(ConfigError::Invalid("pipeline.max_tokens must be greater than 0".into()));
        }
        if p.concurrency == 0 || p.concurrency > MAX_CONCURRENCY {
            return Err(ConfigError::Invalid(format!(
                "pipeline.concurrency must be between 1 and {}",
                MAX_CONCURRENCY
            )));
        }
        if p.unit_timeout_secs == 0 {
            return Err(ConfigError::Invalid("pipeline.unit_timeout_secs must be greater than 0".into()));
        }
        if self.model.max_attempts == 0 {
            return Err(ConfigError::Invalid("model.max_attempts must be greater than 0".into()));
        }
        if self.history.dimensions == 0 {
            return Err(ConfigError::Invalid("history.dimensions must be greater than 0".into()));
        }

        let w = &self.scoring;
        for (name, value) in [
            ("history_weight", w.history_weight),
            ("no_match_penalty", w.no_match_penalty),
            ("unavailable_penalty", w.unavailable_penalty),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Invalid(format!("scoring.{} must be within [0, 1]", name)));
            }
        }

        self.fingerprint.build_normalizer()?;
        Ok(())
    }

    pub fn chunker(&self) -> Chunker {
        Chunker::new(self.pipeline.max_tokens)
    }
}

// Load configuration from a TOML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<PipelineConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let config: PipelineConfig = toml::from_str(&content)?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_config() {
        let toml_content = r#"
[pipeline]
max_tokens = 800
concurrency = 8

[model]
provider = "ollama"

[history]
backend = "qdrant"
collection = "errors"

[scoring]
history_weight = 0.5

[[fingerprint.rules]]
pattern = 'host-[a-z]+'
placeholder = "<host>"

[alerts]
enabled = true
min_severity = "CRITICAL"
"#;
        let config: PipelineConfig = toml::from_str(toml_content).unwrap();
        assert_eq!(config.pipeline.max_tokens, 800);
        assert_eq!(config.pipeline.concurrency, 8);
        assert!(config.pipeline.errors_only);
        assert_eq!(config.model.provider, Provider::Ollama);
        assert_eq!(config.model.model_id(), "llama3.2:3b");
        assert_eq!(config.history.backend, HistoryBackend::Qdrant);
        assert_eq!(config.history.dimensions, 384);
        assert_eq!(config.scoring.history_weight, 0.5);
        assert_eq!(config.scoring.unavailable_penalty, 0.25);
        assert_eq!(config.alerts.min_severity, Severity::Critical);
        assert!(config.validate().is_ok());

        let normalizer = config.fingerprint.build_normalizer().unwrap();
        assert_eq!(normalizer.normalize("lost db on host-alpha"), "lost db on <host>");
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: PipelineConfig = toml::from_str("").unwrap();
        assert_eq!(config.pipeline.max_tokens, 500);
        assert_eq!(config.model.provider, Provider::Groq);
        assert_eq!(config.model.max_attempts, 3);
        assert!(!config.alerts.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_errors() {
        let mut config = PipelineConfig::default();
        config.pipeline.max_tokens = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = PipelineConfig::default();
        config.pipeline.concurrency = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = PipelineConfig::default();
        config.pipeline.concurrency = usize::MAX >> 3;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = PipelineConfig::default();
        config.pipeline.concurrency = MAX_CONCURRENCY;
        assert!(config.validate().is_ok());

        let mut config = PipelineConfig::default();
        config.fingerprint.rules.push(FingerprintRule {
            pattern: "(unclosed".to_string(),
            placeholder: "<x>".to_string(),
        });
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = PipelineConfig::default();
        config.scoring.no_match_penalty = 1.5;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_load_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("errlens.toml");
        std::fs::write(&path, "[pipeline]\nconcurrency = 0\n").unwrap();
        assert!(matches!(load_config(&path), Err(ConfigError::Invalid(_))));

        std::fs::write(&path, "[pipeline\n").unwrap();
        assert!(matches!(load_config(&path), Err(ConfigError::Parse(_))));

        assert!(matches!(load_config(dir.path().join("missing.toml")), Err(ConfigError::Io(_))));
    }
}
