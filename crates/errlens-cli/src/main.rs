// errlens CLI - explain the errors in a log file

use clap::{Parser, Subcommand};
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, Table};
use errlens_pipeline::config::PipelineConfig;
use errlens_pipeline::{
    load_config, setup, AlertDispatcher, AnalysisReport, Pipeline, Preprocessed, Preprocessor,
};
use errlens_rag::{ResultStatus, Severity};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG: &str = "errlens.toml";

#[derive(Parser)]
#[command(name = "errlens")]
#[command(version = "0.1.0")]
#[command(about = "Retrieval-augmented error log analysis", long_about = None)]
struct Cli {
    /// Config file (defaults to ./errlens.toml when present)
    #[arg(short, long, env = "ERRLENS_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze the errors in a log file
    Analyze {
        /// Path to log file
        file: PathBuf,

        /// Directory for the JSON report
        #[arg(short, long, default_value = ".")]
        output_dir: PathBuf,

        /// Give up on unfinished errors after this many seconds
        #[arg(short, long)]
        deadline_secs: Option<u64>,

        /// Post the summary to the configured Slack / Discord webhooks
        #[arg(long)]
        send_alerts: bool,

        /// Rows shown in the results table
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Parse and chunk a log file without calling the model
    Preprocess {
        /// Path to log file
        file: PathBuf,

        /// Write the chunks as JSON to this path
        #[arg(short, long)]
        save_chunks: Option<PathBuf>,
    },

    /// Search previously analyzed errors
    History {
        /// Error text to look up
        query: String,

        /// Maximum results to return
        #[arg(short, long, default_value = "5")]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = resolve_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Analyze {
            file,
            output_dir,
            deadline_secs,
            send_alerts,
            limit,
        } => {
            analyze(&config, &file, &output_dir, deadline_secs, send_alerts, limit).await?;
        }
        Commands::Preprocess { file, save_chunks } => {
            preprocess(&config, &file, save_chunks.as_deref())?;
        }
        Commands::History { query, limit } => {
            history(&config, &query, limit).await?;
        }
    }

    Ok(())
}

fn resolve_config(path: Option<&Path>) -> Result<PipelineConfig, Box<dyn std::error::Error>> {
    match path {
        Some(path) => {
            debug!(path = %path.display(), "Loading config");
            Ok(load_config(path)?)
        }
        None if Path::new(DEFAULT_CONFIG).exists() => {
            debug!(path = DEFAULT_CONFIG, "Loading config");
            Ok(load_config(DEFAULT_CONFIG)?)
        }
        None => {
            debug!("No config file, using defaults");
            let config = PipelineConfig::default();
            config.validate()?;
            Ok(config)
        }
    }
}

async fn analyze(
    config: &PipelineConfig,
    file: &Path,
    output_dir: &Path,
    deadline_secs: Option<u64>,
    send_alerts: bool,
    limit: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    let text = read_log(file)?;
    let pipeline = Pipeline::from_config(config).await?;

    println!("\n{} {}", "Analyzing".cyan().bold(), file.display());
    println!("{}", "─".repeat(60).dimmed());

    let spinner = indicatif::ProgressBar::new_spinner();
    spinner.set_style(indicatif::ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")?);
    spinner.set_message("waiting for the model...");
    spinner.enable_steady_tick(Duration::from_millis(120));

    let report = pipeline
        .run_with_deadline(&text, deadline_secs.map(Duration::from_secs))
        .await;
    spinner.finish_and_clear();

    print_report(&report, limit);

    std::fs::create_dir_all(output_dir)?;
    let path = output_dir.join(format!("analysis_{}.json", report.generated_at.format("%Y%m%d_%H%M%S")));
    std::fs::write(&path, serde_json::to_string_pretty(&report)?)?;
    println!("\n{} {}", "Report saved:".dimmed(), path.display().to_string().green());

    if send_alerts {
        let dispatcher = AlertDispatcher::from_config(&config.alerts);
        if !config.alerts.enabled || !dispatcher.has_channels() {
            println!("{}", "Alerts are disabled or no webhook is configured.".yellow());
        } else {
            let delivered = dispatcher.dispatch(&report).await;
            println!("{} {}", "Alerts delivered:".dimmed(), delivered.to_string().green());
        }
    }

    Ok(())
}

// invalid UTF-8 is replaced, never fatal
fn read_log(file: &Path) -> Result<String, std::io::Error> {
    let bytes = std::fs::read(file)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn severity_colored(severity: Severity) -> String {
    match severity {
        Severity::Critical => severity.as_str().red().bold().to_string(),
        Severity::High => severity.as_str().red().to_string(),
        Severity::Medium => severity.as_str().yellow().to_string(),
        Severity::Low => severity.as_str().green().to_string(),
    }
}

fn status_colored(status: ResultStatus) -> String {
    match status {
        ResultStatus::Ok => "OK".green().to_string(),
        ResultStatus::Degraded => "DEGRADED".yellow().to_string(),
        ResultStatus::Failed => "FAILED".red().to_string(),
    }
}

fn shorten(text: &str, max: usize) -> String {
    let first_line = text.lines().next().unwrap_or_default();
    if first_line.chars().count() > max {
        let cut: String = first_line.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", cut)
    } else {
        first_line.to_string()
    }
}

fn print_report(report: &AnalysisReport, limit: usize) {
    let s = &report.summary;

    if report.entries.is_empty() {
        println!("{}", "No errors found.".green());
    } else {
        let mut table = Table::new();
        table.load_preset(UTF8_FULL);
        table.set_header(vec!["Line", "Severity", "Status", "Conf", "Error", "Explanation"]);

        for entry in report.entries.iter().take(limit) {
            let r = &entry.result;
            table.add_row(vec![
                entry.line_number.to_string(),
                severity_colored(r.severity),
                status_colored(r.status),
                format!("{:.2}", r.confidence_score),
                shorten(&r.error_message, 40),
                shorten(&r.explanation, 60),
            ]);
        }
        println!("{table}");
        if report.entries.len() > limit {
            println!("{}", format!("... {} more in the report", report.entries.len() - limit).dimmed());
        }
    }

    println!("\n{}", "Summary:".green().bold());
    println!(
        "  {} {} | {} {} | {} {} | {} {} | {} {}",
        "Errors:".dimmed(),
        s.total.to_string().yellow(),
        "Critical:".dimmed(),
        s.critical.to_string().red(),
        "High:".dimmed(),
        s.high.to_string().red(),
        "Medium:".dimmed(),
        s.medium.to_string().yellow(),
        "Low:".dimmed(),
        s.low.to_string().green()
    );
    println!(
        "  {} {} | {} {} | {} {} | {} {} of {} entries",
        "OK:".dimmed(),
        s.ok.to_string().green(),
        "Degraded:".dimmed(),
        s.degraded.to_string().yellow(),
        "Failed:".dimmed(),
        s.failed.to_string().red(),
        "Distinct:".dimmed(),
        s.units.to_string().cyan(),
        s.entries_scanned
    );

    let patterns = &report.patterns;
    if !patterns.error_keywords.is_empty() {
        let mut keywords: Vec<_> = patterns.error_keywords.iter().collect();
        keywords.sort_by(|a, b| b.1.cmp(a.1));
        let top: Vec<String> = keywords.iter().take(5).map(|(k, n)| format!("{} ({})", k, n)).collect();
        println!("  {} {}", "Keywords:".dimmed(), top.join(", "));
    }
    if let Some(range) = &patterns.time_range {
        println!(
            "  {} {} → {}",
            "Time range:".dimmed(),
            range.start.format("%Y-%m-%d %H:%M:%S"),
            range.end.format("%Y-%m-%d %H:%M:%S")
        );
    }
}

fn preprocess(
    config: &PipelineConfig,
    file: &Path,
    save_chunks: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let text = read_log(file)?;
    let preprocessor = Preprocessor::from_config(config)?;
    let Preprocessed { entries, chunks, units } = preprocessor.run(&text);
    let patterns = errlens_core::extract_error_patterns(&entries);

    println!("\n{} {}", "Preprocessed".cyan().bold(), file.display());
    println!("{}", "─".repeat(50).dimmed());

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Metric", "Value"]);
    table.add_row(vec!["Entries".to_string(), entries.len().to_string()]);
    table.add_row(vec!["Error entries".to_string(), patterns.total_errors.to_string()]);
    table.add_row(vec!["Chunks".to_string(), chunks.len().to_string()]);
    table.add_row(vec![
        "Truncated chunks".to_string(),
        chunks.iter().filter(|c| c.truncated).count().to_string(),
    ]);
    table.add_row(vec!["Distinct errors".to_string(), units.len().to_string()]);
    table.add_row(vec!["Token budget".to_string(), preprocessor.max_tokens().to_string()]);
    println!("{table}");

    if !patterns.component_distribution.is_empty() {
        let mut components = Table::new();
        components.load_preset(UTF8_FULL);
        components.set_header(vec!["Component", "Errors"]);
        for (component, count) in &patterns.component_distribution {
            components.add_row(vec![component.clone(), count.to_string()]);
        }
        println!("{components}");
    }

    if let Some(path) = save_chunks {
        std::fs::write(path, serde_json::to_string_pretty(&chunks)?)?;
        println!("\n{} {}", "Chunks saved:".dimmed(), path.display().to_string().green());
    }

    Ok(())
}

async fn history(config: &PipelineConfig, query: &str, limit: usize) -> Result<(), Box<dyn std::error::Error>> {
    println!("\n{} \"{}\"", "Searching history:".cyan().bold(), query);
    println!("{}", "─".repeat(60).dimmed());

    let embedder = setup::build_embedder();
    let index = setup::build_history_index(&config.history).await;

    let embedding = embedder.embed(query).await?;
    let references = index.query(&embedding, limit).await?;

    if references.is_empty() {
        println!("{}", "No similar errors found.".yellow());
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Similarity", "Severity", "Error", "Explanation", "Analyzed"]);
    for r in &references {
        table.add_row(vec![
            format!("{:.2}", r.similarity),
            severity_colored(r.severity),
            shorten(&r.error_message, 40),
            shorten(&r.explanation, 60),
            r.created_at.format("%Y-%m-%d %H:%M").to_string(),
        ]);
    }
    println!("{table}");
    println!("\n{} {}", "Found:".dimmed(), references.len().to_string().green());

    Ok(())
}
