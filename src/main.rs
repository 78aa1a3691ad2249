/*!
 * CDR Worker CLI
 *
 * Processes exactly one file per invocation. Configuration is layered:
 * TOML file, then `CDR_*` environment variables, then command-line flags.
 */

use anyhow::{Context, Result};
use cdr_observability::{metrics, EventSink, JsonlEventLog, TracingEventSink};
use cdr_worker::{
    authority::{DecisionAuthority, HttpDecisionAuthority},
    config::{LogLevel, WorkerConfig},
    core::{Collaborators, PolicyAction, ProcessingSupervisor},
    engine::ProcessEngine,
    error::{WorkerError, EXIT_FATAL, EXIT_SUCCESS},
    logging,
    messaging::JsonlChannel,
    report::{HtmlReportRenderer, ReportRenderer},
    system::LocalSystem,
};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "cdr-worker")]
#[command(version, about = "Disarm and rebuild one file, publishing exactly one outcome", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Correlation id of the file
    #[arg(long)]
    file_id: Option<String>,

    /// Policy identifier
    #[arg(long)]
    policy_id: Option<String>,

    /// Input artifact
    #[arg(short = 'i', long = "input", value_name = "PATH")]
    input: Option<PathBuf>,

    /// Output artifact
    #[arg(short = 'o', long = "output", value_name = "PATH")]
    output: Option<PathBuf>,

    /// Destination for the outcome message
    #[arg(long)]
    reply_to: Option<String>,

    /// Write a failure report to the output on Failed outcomes
    #[arg(long)]
    generate_report: bool,

    /// Processing deadline in seconds
    #[arg(long = "timeout", value_name = "SECS")]
    timeout: Option<u64>,

    /// Policy for unrecognised file types
    #[arg(long, value_enum)]
    unmanaged_action: Option<ActionArg>,

    /// Policy for files the engine refused to rebuild
    #[arg(long, value_enum)]
    blocked_action: Option<ActionArg>,

    /// Decision authority base URL
    #[arg(long = "authority-url", value_name = "URL")]
    authority_url: Option<String>,

    /// Rebuild engine executable
    #[arg(long = "engine", value_name = "PATH")]
    engine: Option<PathBuf>,

    /// Lifecycle event log (JSON Lines)
    #[arg(long = "event-log", value_name = "FILE")]
    event_log: Option<PathBuf>,

    /// Outcome message log (JSON Lines, default stdout)
    #[arg(long = "outcome-log", value_name = "FILE")]
    outcome_log: Option<PathBuf>,

    /// Archive request log (JSON Lines, default stdout)
    #[arg(long = "archive-log", value_name = "FILE")]
    archive_log: Option<PathBuf>,

    /// Write Prometheus metrics here after the run
    #[arg(long = "metrics-file", value_name = "FILE")]
    metrics_file: Option<PathBuf>,

    /// Log level
    #[arg(long, value_enum)]
    log_level: Option<LogLevelArg>,

    /// Log file (JSON); default stderr
    #[arg(long = "log", value_name = "FILE")]
    log: Option<PathBuf>,

    /// Verbose logging (debug level)
    #[arg(short = 'v', long)]
    verbose: bool,
}

#[derive(Copy, Clone, ValueEnum)]
enum ActionArg {
    Block,
    Relay,
    Refer,
}

impl From<ActionArg> for PolicyAction {
    fn from(arg: ActionArg) -> Self {
        match arg {
            ActionArg::Block => PolicyAction::Block,
            ActionArg::Relay => PolicyAction::Relay,
            ActionArg::Refer => PolicyAction::Refer,
        }
    }
}

#[derive(Copy, Clone, ValueEnum)]
enum LogLevelArg {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevelArg> for LogLevel {
    fn from(arg: LogLevelArg) -> Self {
        match arg {
            LogLevelArg::Error => LogLevel::Error,
            LogLevelArg::Warn => LogLevel::Warn,
            LogLevelArg::Info => LogLevel::Info,
            LogLevelArg::Debug => LogLevel::Debug,
            LogLevelArg::Trace => LogLevel::Trace,
        }
    }
}

fn main() {
    let code = match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            EXIT_FATAL
        }
    };
    std::process::exit(code);
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli)?;

    if let Err(e) = logging::init_logging(&config) {
        eprintln!("Warning: Failed to initialize logging: {}", e);
    }

    let collaborators = build_collaborators(&config)?;
    let item = config.work_item();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    runtime.block_on(async {
        ProcessingSupervisor::new(collaborators).execute(item).await;
    });

    if let Some(ref path) = config.metrics_file {
        std::fs::write(path, metrics::metrics_text())
            .with_context(|| format!("Failed to write metrics to {}", path.display()))?;
        info!(path = %path.display(), "Metrics written");
    }

    Ok(())
}

fn load_config(cli: Cli) -> Result<WorkerConfig> {
    let mut config = match cli.config {
        Some(ref path) => WorkerConfig::from_file(path)?,
        None => WorkerConfig::default(),
    };
    config.apply_env()?;

    if let Some(v) = cli.file_id {
        config.file_id = v;
    }
    if let Some(v) = cli.policy_id {
        config.policy_id = v;
    }
    if let Some(v) = cli.input {
        config.input_path = v;
    }
    if let Some(v) = cli.output {
        config.output_path = v;
    }
    if let Some(v) = cli.reply_to {
        config.reply_to = v;
    }
    if cli.generate_report {
        config.generate_report = true;
    }
    if let Some(v) = cli.timeout {
        config.processing_timeout_secs = v;
    }
    if let Some(v) = cli.unmanaged_action {
        config.unmanaged_action = v.into();
    }
    if let Some(v) = cli.blocked_action {
        config.blocked_action = v.into();
    }
    if cli.authority_url.is_some() {
        config.decision_authority_url = cli.authority_url;
    }
    if cli.engine.is_some() {
        config.engine_command = cli.engine;
    }
    if cli.event_log.is_some() {
        config.event_log_path = cli.event_log;
    }
    if cli.outcome_log.is_some() {
        config.outcome_log_path = cli.outcome_log;
    }
    if cli.archive_log.is_some() {
        config.archive_request_path = cli.archive_log;
    }
    if cli.metrics_file.is_some() {
        config.metrics_file = cli.metrics_file;
    }
    if let Some(v) = cli.log_level {
        config.log_level = v.into();
    }
    if cli.log.is_some() {
        config.log_file = cli.log;
    }
    if cli.verbose {
        config.verbose = true;
    }

    config.validate()?;
    Ok(config)
}

fn build_collaborators(config: &WorkerConfig) -> Result<Collaborators> {
    let engine_command = config
        .engine_command
        .clone()
        .ok_or_else(|| WorkerError::Config("engine_command must be set".to_string()))?;

    let authority: Option<Arc<dyn DecisionAuthority>> = match config.decision_authority_url {
        Some(ref url) if !url.trim().is_empty() => Some(Arc::new(
            HttpDecisionAuthority::new(url, config.decision_timeout())
                .context("Failed to build decision authority client")?,
        )),
        _ => None,
    };

    let events: Arc<dyn EventSink> = match config.event_log_path {
        Some(ref path) => Arc::new(
            JsonlEventLog::new(Some(path))
                .with_context(|| format!("Failed to open event log {}", path.display()))?,
        ),
        None => Arc::new(TracingEventSink),
    };

    let outcomes = JsonlChannel::new(config.outcome_log_path.as_deref())
        .context("Failed to open outcome channel")?;
    let archives = JsonlChannel::new(config.archive_request_path.as_deref())
        .context("Failed to open archive channel")?;

    let renderer: Arc<dyn ReportRenderer> = match config.report_template {
        Some(ref path) => Arc::new(
            HtmlReportRenderer::from_template_file(path, config.report_message.clone())
                .map_err(WorkerError::from)?,
        ),
        None => Arc::new(HtmlReportRenderer::new(config.report_message.clone())),
    };

    Ok(Collaborators {
        storage: Arc::new(LocalSystem::new()),
        engine: Arc::new(ProcessEngine::new(engine_command)),
        authority,
        events,
        outcomes: Arc::new(outcomes),
        archives: Arc::new(archives),
        renderer,
    })
}
