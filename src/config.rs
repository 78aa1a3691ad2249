/*!
 * Configuration types for the CDR worker
 */

use crate::core::{EscalationPolicy, PolicyAction, WorkItem};
use crate::error::{Result, WorkerError};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable prefix for configuration overrides
pub const ENV_PREFIX: &str = "CDR_";

/// Default failure-report message
pub const DEFAULT_REPORT_MESSAGE: &str = "The file does not comply with the current policy";

/// Main configuration for one unit of work
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Opaque correlation id of the file
    #[serde(default)]
    pub file_id: String,

    /// Identifier of the policy in force
    #[serde(default)]
    pub policy_id: String,

    /// Location of the original artifact
    #[serde(default)]
    pub input_path: PathBuf,

    /// Location the rebuilt artifact is written to
    #[serde(default)]
    pub output_path: PathBuf,

    /// Destination for the outcome message
    #[serde(default)]
    pub reply_to: String,

    /// Write a failure report to the output location on Failed outcomes
    #[serde(default)]
    pub generate_report: bool,

    /// Processing deadline in seconds
    #[serde(default = "default_processing_timeout")]
    pub processing_timeout_secs: u64,

    /// Policy for files whose type is not recognised
    #[serde(default)]
    pub unmanaged_action: PolicyAction,

    /// Policy for files the rebuild engine refused
    #[serde(default)]
    pub blocked_action: PolicyAction,

    /// Base URL of the decision authority (required when either action is `refer`)
    #[serde(default)]
    pub decision_authority_url: Option<String>,

    /// Per-request timeout for the decision authority in seconds
    #[serde(default = "default_decision_timeout")]
    pub decision_timeout_secs: u64,

    /// Message shown in the failure report
    #[serde(default = "default_report_message")]
    pub report_message: String,

    /// Replacement HTML template for the failure report
    #[serde(default)]
    pub report_template: Option<PathBuf>,

    /// Per-document-family content management flags
    #[serde(default)]
    pub content_management: ContentManagementPolicy,

    /// Rebuild engine executable
    #[serde(default)]
    pub engine_command: Option<PathBuf>,

    /// Lifecycle event log (JSON Lines)
    #[serde(default)]
    pub event_log_path: Option<PathBuf>,

    /// Outcome message log (JSON Lines, None = stdout)
    #[serde(default)]
    pub outcome_log_path: Option<PathBuf>,

    /// Archive request log (JSON Lines, None = stdout)
    #[serde(default)]
    pub archive_request_path: Option<PathBuf>,

    /// Prometheus text dump written after the run
    #[serde(default)]
    pub metrics_file: Option<PathBuf>,

    /// Log level for diagnostic output
    #[serde(default)]
    pub log_level: LogLevel,

    /// Log file path (None = stdout)
    #[serde(default)]
    pub log_file: Option<PathBuf>,

    /// Enable verbose logging (shorthand for log_level = debug)
    #[serde(default)]
    pub verbose: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            file_id: String::new(),
            policy_id: String::new(),
            input_path: PathBuf::new(),
            output_path: PathBuf::new(),
            reply_to: String::new(),
            generate_report: false,
            processing_timeout_secs: default_processing_timeout(),
            unmanaged_action: PolicyAction::Block,
            blocked_action: PolicyAction::Block,
            decision_authority_url: None,
            decision_timeout_secs: default_decision_timeout(),
            report_message: default_report_message(),
            report_template: None,
            content_management: ContentManagementPolicy::default(),
            engine_command: None,
            event_log_path: None,
            outcome_log_path: None,
            archive_request_path: None,
            metrics_file: None,
            log_level: LogLevel::Info,
            log_file: None,
            verbose: false,
        }
    }
}

impl WorkerConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            WorkerError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        toml::from_str(&content)
            .map_err(|e| WorkerError::Config(format!("Failed to parse {}: {}", path.display(), e)))
    }

    /// Override fields from `CDR_*` environment variables
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Override fields from a key lookup
    ///
    /// Keys are the upper-cased field names prefixed with `CDR_`.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name));

        if let Some(v) = get("FILE_ID") {
            self.file_id = v;
        }
        if let Some(v) = get("POLICY_ID") {
            self.policy_id = v;
        }
        if let Some(v) = get("INPUT_PATH") {
            self.input_path = PathBuf::from(v);
        }
        if let Some(v) = get("OUTPUT_PATH") {
            self.output_path = PathBuf::from(v);
        }
        if let Some(v) = get("REPLY_TO") {
            self.reply_to = v;
        }
        if let Some(v) = get("GENERATE_REPORT") {
            self.generate_report = parse_bool("CDR_GENERATE_REPORT", &v)?;
        }
        if let Some(v) = get("PROCESSING_TIMEOUT_SECS") {
            self.processing_timeout_secs = parse_secs("CDR_PROCESSING_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = get("UNMANAGED_ACTION") {
            self.unmanaged_action = v.parse().map_err(WorkerError::Config)?;
        }
        if let Some(v) = get("BLOCKED_ACTION") {
            self.blocked_action = v.parse().map_err(WorkerError::Config)?;
        }
        if let Some(v) = get("DECISION_AUTHORITY_URL") {
            self.decision_authority_url = Some(v);
        }
        if let Some(v) = get("DECISION_TIMEOUT_SECS") {
            self.decision_timeout_secs = parse_secs("CDR_DECISION_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = get("REPORT_MESSAGE") {
            self.report_message = v;
        }
        if let Some(v) = get("ENGINE_COMMAND") {
            self.engine_command = Some(PathBuf::from(v));
        }
        if let Some(v) = get("EVENT_LOG_PATH") {
            self.event_log_path = Some(PathBuf::from(v));
        }
        if let Some(v) = get("OUTCOME_LOG_PATH") {
            self.outcome_log_path = Some(PathBuf::from(v));
        }
        if let Some(v) = get("ARCHIVE_REQUEST_PATH") {
            self.archive_request_path = Some(PathBuf::from(v));
        }

        Ok(())
    }

    /// Check the configuration describes a runnable unit of work
    pub fn validate(&self) -> Result<()> {
        if self.file_id.trim().is_empty() {
            return Err(WorkerError::Config("file_id must not be empty".to_string()));
        }
        if self.input_path.as_os_str().is_empty() {
            return Err(WorkerError::Config("input_path must be set".to_string()));
        }
        if self.output_path.as_os_str().is_empty() {
            return Err(WorkerError::Config("output_path must be set".to_string()));
        }
        if self.processing_timeout_secs == 0 {
            return Err(WorkerError::Config(
                "processing_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.decision_timeout_secs == 0 {
            return Err(WorkerError::Config(
                "decision_timeout_secs must be greater than zero".to_string(),
            ));
        }
        let refers = self.escalation_policy().refers();
        let has_url = self
            .decision_authority_url
            .as_deref()
            .is_some_and(|u| !u.trim().is_empty());
        if refers && !has_url {
            return Err(WorkerError::Config(
                "decision_authority_url is required when an action is 'refer'".to_string(),
            ));
        }
        Ok(())
    }

    pub fn escalation_policy(&self) -> EscalationPolicy {
        EscalationPolicy {
            unmanaged: self.unmanaged_action,
            blocked: self.blocked_action,
        }
    }

    pub fn processing_timeout(&self) -> Duration {
        Duration::from_secs(self.processing_timeout_secs)
    }

    pub fn decision_timeout(&self) -> Duration {
        Duration::from_secs(self.decision_timeout_secs)
    }

    /// Build the immutable unit of work, stamped now
    pub fn work_item(&self) -> WorkItem {
        WorkItem {
            file_id: self.file_id.clone(),
            policy_id: self.policy_id.clone(),
            input_path: self.input_path.clone(),
            output_path: self.output_path.clone(),
            reply_to: self.reply_to.clone(),
            content_management: self.content_management.clone(),
            escalation: self.escalation_policy(),
            generate_report: self.generate_report,
            deadline: self.processing_timeout(),
            timestamp: Utc::now(),
        }
    }
}

/// What the rebuild engine does with one class of active content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ContentFlagAction {
    /// Keep the content as is
    Allow,
    /// Remove or neutralise the content
    #[default]
    Sanitise,
    /// Refuse the whole document when the content is present
    Disallow,
}

/// Flags for Word and Excel documents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct OfficeFlags {
    pub dynamic_data_exchange: ContentFlagAction,
    pub embedded_files: ContentFlagAction,
    pub embedded_images: ContentFlagAction,
    pub external_hyperlinks: ContentFlagAction,
    pub internal_hyperlinks: ContentFlagAction,
    pub macros: ContentFlagAction,
    pub metadata: ContentFlagAction,
    pub review_comments: ContentFlagAction,
}

/// Flags for PowerPoint documents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PresentationFlags {
    pub embedded_files: ContentFlagAction,
    pub embedded_images: ContentFlagAction,
    pub external_hyperlinks: ContentFlagAction,
    pub internal_hyperlinks: ContentFlagAction,
    pub macros: ContentFlagAction,
    pub metadata: ContentFlagAction,
    pub review_comments: ContentFlagAction,
}

/// Flags for PDF documents
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PdfFlags {
    pub acroform: ContentFlagAction,
    pub actions_all: ContentFlagAction,
    pub embedded_files: ContentFlagAction,
    pub embedded_images: ContentFlagAction,
    pub external_hyperlinks: ContentFlagAction,
    pub internal_hyperlinks: ContentFlagAction,
    pub javascript: ContentFlagAction,
    pub metadata: ContentFlagAction,
    /// Watermark text stamped on rebuilt PDFs
    pub watermark: Option<String>,
}

/// Content management policy handed opaquely to the rebuild engine
///
/// Every flag defaults to `sanitise`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ContentManagementPolicy {
    pub word: OfficeFlags,
    pub excel: OfficeFlags,
    pub powerpoint: PresentationFlags,
    pub pdf: PdfFlags,
}

/// Log level for diagnostic output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Convert to tracing::Level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

// Default value functions for serde
fn default_processing_timeout() -> u64 {
    60
}

fn default_decision_timeout() -> u64 {
    30
}

fn default_report_message() -> String {
    DEFAULT_REPORT_MESSAGE.to_string()
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(WorkerError::Config(format!(
            "{} must be a boolean, got '{}'",
            key, other
        ))),
    }
}

fn parse_secs(key: &str, value: &str) -> Result<u64> {
    value
        .trim()
        .parse()
        .map_err(|_| WorkerError::Config(format!("{} must be whole seconds, got '{}'", key, value)))
}
