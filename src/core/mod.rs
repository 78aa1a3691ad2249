/*!
 * Core disposition logic: the unit of work, its classification, and the
 * orchestration components that turn one input file into one outcome.
 *
 * Control flow:
 *
 * ```text
 * ProcessingSupervisor::execute
 *   └─ (deadline) DispositionPipeline::run
 *        ├─ EventSequencer::emit        at every stage boundary
 *        └─ EscalationDecider::decide   on Unknown files and failed rebuilds
 *   └─ OutcomePublisher                 exactly once, on every path
 * ```
 */

pub mod escalation;
pub mod fence;
pub mod headers;
pub mod pipeline;
pub mod publisher;
pub mod sequencer;
pub mod supervisor;

use crate::config::ContentManagementPolicy;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub use escalation::{Decision, EscalationDecider};
pub use fence::OutputFence;
pub use headers::{HeaderSet, CONTENT_TYPE_HEADER};
pub use pipeline::{DispositionPipeline, PipelineOutcome};
pub use publisher::{AbortCause, OutcomePublisher};
pub use sequencer::EventSequencer;
pub use supervisor::{Collaborators, ProcessingSupervisor};

/// One unit of work: a single input file plus the policy to apply to it
///
/// Built once per invocation from configuration and never mutated.
#[derive(Debug, Clone)]
pub struct WorkItem {
    /// Opaque correlation id
    pub file_id: String,
    pub policy_id: String,
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    /// Destination for the outcome message
    pub reply_to: String,
    /// Per-document-family flags, passed opaquely to the rebuild engine
    pub content_management: ContentManagementPolicy,
    pub escalation: EscalationPolicy,
    pub generate_report: bool,
    pub deadline: Duration,
    pub timestamp: DateTime<Utc>,
}

/// Type names that route to the archive path
const ARCHIVE_TYPES: &[&str] = &["zip", "rar", "tar", "7z", "sevenzip", "gzip", "gz"];

/// Three-way classification of an input file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileCategory {
    /// A type the engine can analyse and rebuild
    Manageable(String),
    /// A container handled by the archive path
    Archive(String),
    Unknown,
}

impl FileCategory {
    /// Classify an engine-reported type name
    pub fn classify(type_name: &str) -> Self {
        let normalized = type_name.trim().to_ascii_lowercase();
        if normalized.is_empty() || normalized == "unknown" {
            FileCategory::Unknown
        } else if ARCHIVE_TYPES.contains(&normalized.as_str()) {
            FileCategory::Archive(type_name.trim().to_string())
        } else {
            FileCategory::Manageable(type_name.trim().to_string())
        }
    }

    /// Detected type name as reported to collaborators
    pub fn type_name(&self) -> &str {
        match self {
            FileCategory::Manageable(t) | FileCategory::Archive(t) => t,
            FileCategory::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for FileCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

/// Final classification of a processed unit of work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Disposition {
    /// Output equals input
    Unmodified,
    /// Output bytes differ from input
    Replaced,
    /// No usable output; terminally unsuccessful
    Failed,
}

impl Disposition {
    pub fn as_str(self) -> &'static str {
        match self {
            Disposition::Unmodified => "unmodified",
            Disposition::Replaced => "replaced",
            Disposition::Failed => "failed",
        }
    }
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Answer of the decision authority
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EscalationVerdict {
    Block,
    Relay,
    Replace {
        payload: Vec<u8>,
        mime_type: Option<String>,
    },
}

impl EscalationVerdict {
    /// Block -> Failed, Relay -> Unmodified, Replace -> Replaced
    pub fn disposition(&self) -> Disposition {
        match self {
            EscalationVerdict::Block => Disposition::Failed,
            EscalationVerdict::Relay => Disposition::Unmodified,
            EscalationVerdict::Replace { .. } => Disposition::Replaced,
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            EscalationVerdict::Block => "block",
            EscalationVerdict::Relay => "relay",
            EscalationVerdict::Replace { .. } => "replace",
        }
    }
}

/// Which situation triggered an escalation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscalationMode {
    /// The file type could not be classified
    Unmanaged,
    /// The rebuild produced no artifact
    Blocked,
}

impl fmt::Display for EscalationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EscalationMode::Unmanaged => write!(f, "unmanaged"),
            EscalationMode::Blocked => write!(f, "blocked"),
        }
    }
}

/// Policy setting for one escalation mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PolicyAction {
    /// Do not deliver the original
    #[default]
    Block,
    /// Deliver the original unchanged
    Relay,
    /// Ask the decision authority
    Refer,
}

impl FromStr for PolicyAction {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "block" => Ok(PolicyAction::Block),
            "relay" => Ok(PolicyAction::Relay),
            "refer" => Ok(PolicyAction::Refer),
            other => Err(format!("unknown policy action '{}'", other)),
        }
    }
}

/// Independent policy settings for the two escalation modes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EscalationPolicy {
    #[serde(default)]
    pub unmanaged: PolicyAction,
    #[serde(default)]
    pub blocked: PolicyAction,
}

impl EscalationPolicy {
    pub fn action_for(&self, mode: EscalationMode) -> PolicyAction {
        match mode {
            EscalationMode::Unmanaged => self.unmanaged,
            EscalationMode::Blocked => self.blocked,
        }
    }

    /// Whether either mode consults the decision authority
    pub fn refers(&self) -> bool {
        self.unmanaged == PolicyAction::Refer || self.blocked == PolicyAction::Refer
    }
}
