//! Lifecycle event schema for the disposition worker
//!
//! Every stage transition of a unit of work is recorded as one immutable
//! `LifecycleEvent`. Events are append-only: once emitted they are never
//! mutated or retracted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Request mode recorded on `NewDocument` events
pub const RESPONSE_MODE: &str = "response";

/// A single lifecycle record for one unit of work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifecycleEvent {
    /// Numeric event id understood by downstream consumers
    pub event_id: u16,

    /// Correlation id of the unit of work
    pub file_id: String,

    /// Event timestamp (UTC)
    pub timestamp: DateTime<Utc>,

    /// Per-run emission order, starting at 0
    pub sequence: u64,

    /// Kind-specific payload
    pub payload: EventPayload,
}

impl LifecycleEvent {
    /// Create an event with sequence 0; the sequencer assigns the real one.
    pub fn new(file_id: impl Into<String>, timestamp: DateTime<Utc>, payload: EventPayload) -> Self {
        Self {
            event_id: payload.kind().event_id(),
            file_id: file_id.into(),
            timestamp,
            sequence: 0,
            payload,
        }
    }

    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = sequence;
        self
    }

    pub fn kind(&self) -> EventKind {
        self.payload.kind()
    }
}

/// Kind tag of a lifecycle event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    NewDocument,
    FileTypeDetected,
    UnmanagedAction,
    ArchiveDetected,
    AnalysisCompleted,
    RebuildStarted,
    RebuildCompleted,
    EscalationStarted,
    EscalationCompleted,
    BlockedAction,
}

impl EventKind {
    /// Wire id of the event kind
    pub fn event_id(self) -> u16 {
        match self {
            EventKind::NewDocument => 0x10,
            EventKind::FileTypeDetected => 0x20,
            EventKind::UnmanagedAction => 0x30,
            EventKind::RebuildStarted => 0x40,
            EventKind::BlockedAction => 0x50,
            EventKind::RebuildCompleted => 0x60,
            EventKind::AnalysisCompleted => 0x70,
            EventKind::EscalationStarted => 0x80,
            EventKind::EscalationCompleted => 0x90,
            EventKind::ArchiveDetected => 0xA0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::NewDocument => "new_document",
            EventKind::FileTypeDetected => "file_type_detected",
            EventKind::UnmanagedAction => "unmanaged_action",
            EventKind::ArchiveDetected => "archive_detected",
            EventKind::AnalysisCompleted => "analysis_completed",
            EventKind::RebuildStarted => "rebuild_started",
            EventKind::RebuildCompleted => "rebuild_completed",
            EventKind::EscalationStarted => "escalation_started",
            EventKind::EscalationCompleted => "escalation_completed",
            EventKind::BlockedAction => "blocked_action",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event payload variants
///
/// Serialized with an internal `"type"` tag so each JSON line carries its kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    /// Work on a new document began
    NewDocument { policy_id: String, mode: String },

    /// The engine classified the input
    FileTypeDetected { file_type: String },

    /// Outcome chosen for an unclassifiable file
    UnmanagedAction { action: String },

    /// The input is an archive and was handed to the archive path
    ArchiveDetected { file_type: String },

    /// Engine analysis report
    AnalysisCompleted { report: String },

    RebuildStarted,

    /// Final outcome tag of the rebuild stage
    RebuildCompleted { outcome: String },

    /// The decision authority is being consulted
    EscalationStarted,

    /// The decision authority answered (or was treated as answering `block`)
    EscalationCompleted { decision: String },

    /// Outcome chosen after a failed rebuild
    BlockedAction { action: String },
}

impl EventPayload {
    pub fn kind(&self) -> EventKind {
        match self {
            EventPayload::NewDocument { .. } => EventKind::NewDocument,
            EventPayload::FileTypeDetected { .. } => EventKind::FileTypeDetected,
            EventPayload::UnmanagedAction { .. } => EventKind::UnmanagedAction,
            EventPayload::ArchiveDetected { .. } => EventKind::ArchiveDetected,
            EventPayload::AnalysisCompleted { .. } => EventKind::AnalysisCompleted,
            EventPayload::RebuildStarted => EventKind::RebuildStarted,
            EventPayload::RebuildCompleted { .. } => EventKind::RebuildCompleted,
            EventPayload::EscalationStarted => EventKind::EscalationStarted,
            EventPayload::EscalationCompleted { .. } => EventKind::EscalationCompleted,
            EventPayload::BlockedAction { .. } => EventKind::BlockedAction,
        }
    }
}
