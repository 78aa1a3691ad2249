//! Disposition state machine for one file
//!
//! ```text
//! exists? ─no─> InputNotFound
//!   │
//! NewDocument ─> detect ─> FileTypeDetected
//!   ├─ Archive    ─> hand back to the supervisor
//!   ├─ Unknown    ─> escalate(unmanaged) ─> UnmanagedAction
//!   └─ Manageable ─> analyse ─> AnalysisCompleted ─> RebuildStarted ─> rebuild
//!                      ├─ artifact    ─> write ─> Replaced
//!                      └─ no artifact ─> escalate(blocked) ─> BlockedAction
//!                    ─> RebuildCompleted
//! ```

use super::escalation::EscalationDecider;
use super::fence::OutputFence;
use super::headers::HeaderSet;
use super::sequencer::EventSequencer;
use super::supervisor::Collaborators;
use super::{Disposition, EscalationMode, FileCategory, WorkItem};
use crate::error::{Result, WorkerError};
use cdr_observability::{EventPayload, RESPONSE_MODE};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// What a completed pipeline run hands back to the supervisor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineOutcome {
    /// The run settled on a disposition
    Disposed {
        disposition: Disposition,
        headers: HeaderSet,
    },
    /// The input is an archive; the archive path owns the outcome
    Archive { file_type: String },
}

pub struct DispositionPipeline<'a> {
    item: &'a WorkItem,
    collaborators: &'a Collaborators,
    sequencer: &'a EventSequencer,
    fence: &'a OutputFence,
    cancel: &'a CancellationToken,
}

impl<'a> DispositionPipeline<'a> {
    pub fn new(
        item: &'a WorkItem,
        collaborators: &'a Collaborators,
        sequencer: &'a EventSequencer,
        fence: &'a OutputFence,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            item,
            collaborators,
            sequencer,
            fence,
            cancel,
        }
    }

    pub async fn run(&self) -> Result<PipelineOutcome> {
        let item = self.item;
        let storage = &self.collaborators.storage;
        let engine = &self.collaborators.engine;

        if !storage.exists(&item.input_path).await {
            return Err(WorkerError::InputNotFound(item.input_path.clone()));
        }

        self.sequencer.emit(EventPayload::NewDocument {
            policy_id: item.policy_id.clone(),
            mode: RESPONSE_MODE.to_string(),
        });

        let data = storage.read(&item.input_path).await?;
        self.checkpoint()?;

        match engine.version().await {
            Ok(version) => debug!(file_id = %item.file_id, %version, "Engine version"),
            Err(e) => warn!(file_id = %item.file_id, error = %e, "Engine version unavailable"),
        }

        let category = FileCategory::classify(&engine.detect_type(&data).await?);
        self.checkpoint()?;
        info!(
            file_id = %item.file_id,
            file_type = category.type_name(),
            size = data.len(),
            "File type detected"
        );
        self.sequencer.emit(EventPayload::FileTypeDetected {
            file_type: category.type_name().to_string(),
        });

        let decider = EscalationDecider::new(item, self.collaborators, self.sequencer, self.fence);

        let file_type = match &category {
            FileCategory::Archive(file_type) => {
                return Ok(PipelineOutcome::Archive {
                    file_type: file_type.clone(),
                });
            }
            FileCategory::Unknown => {
                let (disposition, headers) = decider
                    .decide(EscalationMode::Unmanaged, item.timestamp, &data, &category)
                    .await;
                self.sequencer.emit(EventPayload::UnmanagedAction {
                    action: disposition.to_string(),
                });
                return Ok(PipelineOutcome::Disposed {
                    disposition,
                    headers,
                });
            }
            FileCategory::Manageable(file_type) => file_type.clone(),
        };

        let report = match engine
            .analyse(&item.content_management, &file_type, &data)
            .await
        {
            Ok(report) => report,
            Err(e) => {
                warn!(file_id = %item.file_id, error = %e, "Analysis failed");
                String::new()
            }
        };
        self.checkpoint()?;
        self.sequencer.emit(EventPayload::AnalysisCompleted { report });

        self.sequencer.emit(EventPayload::RebuildStarted);
        let rebuilt = match engine
            .rebuild(&item.content_management, &file_type, &data)
            .await
        {
            Ok(rebuilt) => rebuilt.filter(|bytes| !bytes.is_empty()),
            Err(e) => {
                warn!(file_id = %item.file_id, error = %e, "Rebuild failed");
                None
            }
        };
        self.checkpoint()?;

        let (disposition, headers) = match rebuilt {
            Some(bytes) => {
                self.fence
                    .write(storage.clone(), &item.output_path, bytes)
                    .await?;
                (Disposition::Replaced, HeaderSet::new())
            }
            None => {
                info!(file_id = %item.file_id, %file_type, "Rebuild produced no artifact");
                let (disposition, headers) = decider
                    .decide(EscalationMode::Blocked, item.timestamp, &data, &category)
                    .await;
                self.sequencer.emit(EventPayload::BlockedAction {
                    action: disposition.to_string(),
                });
                (disposition, headers)
            }
        };

        self.sequencer.emit(EventPayload::RebuildCompleted {
            outcome: disposition.to_string(),
        });

        Ok(PipelineOutcome::Disposed {
            disposition,
            headers,
        })
    }

    fn checkpoint(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            Err(WorkerError::Cancelled)
        } else {
            Ok(())
        }
    }
}
