//! Escalation decisions for unclassifiable files and refused rebuilds
//!
//! Static policy is a pure lookup (`decision_for`). Only `Refer` reaches the
//! decision authority, and any authority failure settles as `Block`.

use super::fence::OutputFence;
use super::headers::{HeaderSet, CONTENT_TYPE_HEADER};
use super::sequencer::EventSequencer;
use super::supervisor::Collaborators;
use super::{Disposition, EscalationMode, EscalationVerdict, FileCategory, PolicyAction, WorkItem};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use cdr_observability::EventPayload;
use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

/// Locally determined course of action for one escalation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Settle as Failed
    Fail,
    /// Replace the original with a rendered failure report
    Report,
    /// Deliver the original unchanged
    Relay,
    /// Ask the decision authority
    Refer,
}

/// Static policy table
///
/// `Block` is deliberately asymmetric: an unmanaged file fails outright, a
/// refused rebuild is replaced by a report.
pub fn decision_for(mode: EscalationMode, action: PolicyAction) -> Decision {
    match (mode, action) {
        (EscalationMode::Unmanaged, PolicyAction::Block) => Decision::Fail,
        (EscalationMode::Blocked, PolicyAction::Block) => Decision::Report,
        (_, PolicyAction::Relay) => Decision::Relay,
        (_, PolicyAction::Refer) => Decision::Refer,
    }
}

pub struct EscalationDecider<'a> {
    item: &'a WorkItem,
    collaborators: &'a Collaborators,
    sequencer: &'a EventSequencer,
    fence: &'a OutputFence,
}

impl<'a> EscalationDecider<'a> {
    pub fn new(
        item: &'a WorkItem,
        collaborators: &'a Collaborators,
        sequencer: &'a EventSequencer,
        fence: &'a OutputFence,
    ) -> Self {
        Self {
            item,
            collaborators,
            sequencer,
            fence,
        }
    }

    /// Settle one escalation; always yields a disposition
    pub async fn decide(
        &self,
        mode: EscalationMode,
        timestamp: DateTime<Utc>,
        payload: &[u8],
        category: &FileCategory,
    ) -> (Disposition, HeaderSet) {
        let action = self.item.escalation.action_for(mode);
        let decision = decision_for(mode, action);
        debug!(
            file_id = %self.item.file_id,
            %mode,
            ?action,
            ?decision,
            requested_at = %timestamp,
            "Escalating"
        );

        match decision {
            Decision::Fail => (Disposition::Failed, HeaderSet::new()),
            Decision::Relay => (Disposition::Unmodified, HeaderSet::new()),
            Decision::Report => (self.replace_with_report().await, HeaderSet::new()),
            Decision::Refer => self.refer(mode, payload, category).await,
        }
    }

    async fn replace_with_report(&self) -> Disposition {
        if !self.item.generate_report {
            return Disposition::Failed;
        }

        let report = match self.collaborators.renderer.render(&self.item.file_id) {
            Ok(report) => report,
            Err(e) => {
                error!(file_id = %self.item.file_id, error = %e, "Failed to render failure report");
                return Disposition::Failed;
            }
        };

        match self.write_output(report).await {
            true => Disposition::Replaced,
            false => Disposition::Failed,
        }
    }

    async fn refer(
        &self,
        mode: EscalationMode,
        payload: &[u8],
        category: &FileCategory,
    ) -> (Disposition, HeaderSet) {
        self.sequencer.emit(EventPayload::EscalationStarted);

        let verdict = match &self.collaborators.authority {
            Some(authority) => {
                let encoded = STANDARD.encode(payload);
                match authority.decide(&encoded, category).await {
                    Ok(verdict) => verdict,
                    Err(e) => {
                        warn!(
                            file_id = %self.item.file_id,
                            %mode,
                            error = %e,
                            "Decision authority failed, blocking"
                        );
                        EscalationVerdict::Block
                    }
                }
            }
            None => {
                error!(file_id = %self.item.file_id, %mode, "No decision authority configured, blocking");
                EscalationVerdict::Block
            }
        };

        self.sequencer.emit(EventPayload::EscalationCompleted {
            decision: verdict.tag().to_string(),
        });
        info!(file_id = %self.item.file_id, %mode, verdict = verdict.tag(), "Escalation settled");

        let mut headers = HeaderSet::new();
        let disposition = match verdict {
            EscalationVerdict::Replace { payload, mime_type } => {
                if self.write_output(payload).await {
                    if let Some(mime) = mime_type {
                        headers.insert(CONTENT_TYPE_HEADER, mime);
                    }
                    Disposition::Replaced
                } else {
                    Disposition::Failed
                }
            }
            other => other.disposition(),
        };

        (disposition, headers)
    }

    async fn write_output(&self, data: Vec<u8>) -> bool {
        let storage = self.collaborators.storage.clone();
        match self.fence.write(storage, &self.item.output_path, data).await {
            Ok(()) => true,
            Err(e) => {
                error!(
                    file_id = %self.item.file_id,
                    path = %self.item.output_path.display(),
                    error = %e,
                    "Failed to write replacement"
                );
                false
            }
        }
    }
}
