//! errlens pipeline - configuration, orchestration, reporting and alerting

pub mod aggregate;
pub mod alerting;
pub mod config;
pub mod discord;
pub mod pipeline;
pub mod preprocess;
pub mod setup;
pub mod slack;

pub use aggregate::{AnalysisReport, ReportEntry, ReportSummary, ResultAggregator};
pub use alerting::{AlertDispatcher, AlertError, AlertSummary};
pub use config::{load_config, ConfigError, PipelineConfig};
pub use discord::DiscordClient;
pub use pipeline::{Pipeline, PipelineError};
pub use preprocess::{Preprocessed, Preprocessor};
pub use setup::Offline;
pub use slack::SlackClient;
