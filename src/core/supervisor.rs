//! Bounded-time supervision of one pipeline run
//!
//! The pipeline runs in its own task under `WorkItem::deadline`. On expiry
//! the run is cancelled and aborted, then the supervisor seals the output
//! fence, removes any partial output, optionally writes a failure report,
//! and publishes Failed. Every path ends in exactly one terminal publisher
//! call, at most `ABORT_GRACE + SEAL_GRACE` after the deadline.
//!
//! Sealing stops new pipeline writes immediately but can only wait so long
//! for a write already handed to storage. If that write is still stuck when
//! `SEAL_GRACE` runs out, it may land after cleanup; this is logged.

use super::fence::OutputFence;
use super::pipeline::{DispositionPipeline, PipelineOutcome};
use super::publisher::{AbortCause, OutcomePublisher};
use super::sequencer::EventSequencer;
use super::{Disposition, WorkItem};
use crate::authority::DecisionAuthority;
use crate::engine::CdrEngine;
use crate::messaging::{ArchiveChannel, ArchiveRequest, OutcomeChannel};
use crate::report::ReportRenderer;
use cdr_core_interface::{StorageSystem, StorageSystemExt};
use cdr_observability::{metrics, EventPayload, EventSink};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// How long to wait for an aborted pipeline task to unwind
const ABORT_GRACE: Duration = Duration::from_secs(1);

/// How long to wait for an in-flight output write before cleaning up anyway
const SEAL_GRACE: Duration = Duration::from_secs(1);

/// External collaborators of a run
#[derive(Clone)]
pub struct Collaborators {
    pub storage: Arc<dyn StorageSystem>,
    pub engine: Arc<dyn CdrEngine>,
    /// Required only when a policy action is `refer`
    pub authority: Option<Arc<dyn DecisionAuthority>>,
    pub events: Arc<dyn EventSink>,
    pub outcomes: Arc<dyn OutcomeChannel>,
    pub archives: Arc<dyn ArchiveChannel>,
    pub renderer: Arc<dyn ReportRenderer>,
}

enum RunResult {
    Completed(PipelineOutcome),
    Aborted(AbortCause),
}

pub struct ProcessingSupervisor {
    collaborators: Collaborators,
    publisher: OutcomePublisher,
}

impl ProcessingSupervisor {
    pub fn new(collaborators: Collaborators) -> Self {
        let publisher =
            OutcomePublisher::new(collaborators.outcomes.clone(), collaborators.archives.clone());
        Self {
            collaborators,
            publisher,
        }
    }

    /// Process one unit of work to exactly one outcome
    pub async fn execute(&self, item: WorkItem) {
        let started = Instant::now();
        let item = Arc::new(item);
        let cancel = CancellationToken::new();
        let fence = OutputFence::new();
        let sequencer = Arc::new(EventSequencer::new(
            &item,
            self.collaborators.events.clone(),
            cancel.clone(),
        ));

        info!(
            file_id = %item.file_id,
            policy_id = %item.policy_id,
            input = %item.input_path.display(),
            deadline_secs = item.deadline.as_secs_f64(),
            "Processing started"
        );

        let mut handle = tokio::spawn({
            let item = item.clone();
            let collaborators = self.collaborators.clone();
            let sequencer = sequencer.clone();
            let fence = fence.clone();
            let cancel = cancel.clone();
            async move {
                DispositionPipeline::new(&item, &collaborators, &sequencer, &fence, &cancel)
                    .run()
                    .await
            }
        });

        let waited = timeout(item.deadline, &mut handle).await;
        let result = match waited {
            Ok(Ok(Ok(outcome))) => RunResult::Completed(outcome),
            Ok(Ok(Err(e))) if e.is_cancellation() => {
                warn!(file_id = %item.file_id, error = %e, "Processing stopped by cancellation");
                RunResult::Aborted(AbortCause::Exception)
            }
            Ok(Ok(Err(e))) => {
                error!(
                    file_id = %item.file_id,
                    category = %e.category(),
                    fatal = e.is_fatal(),
                    error = %e,
                    "Processing failed"
                );
                RunResult::Aborted(AbortCause::Exception)
            }
            Ok(Err(join_error)) => {
                error!(file_id = %item.file_id, error = %join_error, "Processing task died");
                RunResult::Aborted(AbortCause::Exception)
            }
            Err(_) => {
                warn!(
                    file_id = %item.file_id,
                    deadline_secs = item.deadline.as_secs_f64(),
                    "Processing deadline exceeded"
                );
                cancel.cancel();
                handle.abort();
                if timeout(ABORT_GRACE, handle).await.is_err() {
                    warn!(file_id = %item.file_id, "Aborted pipeline did not unwind in time");
                }
                RunResult::Aborted(AbortCause::Timeout)
            }
        };

        if timeout(SEAL_GRACE, fence.seal()).await.is_err() {
            warn!(
                file_id = %item.file_id,
                path = %item.output_path.display(),
                grace_secs = SEAL_GRACE.as_secs_f64(),
                "Output write still in flight after sealing; it may land after cleanup"
            );
        }

        match result {
            RunResult::Completed(PipelineOutcome::Disposed {
                disposition,
                headers,
            }) => {
                if disposition == Disposition::Failed && item.generate_report {
                    self.write_report(&item).await;
                }
                self.publisher
                    .publish(&item.file_id, disposition, &item.reply_to, headers);
            }
            RunResult::Completed(PipelineOutcome::Archive { file_type }) => {
                sequencer.emit(EventPayload::ArchiveDetected {
                    file_type: file_type.clone(),
                });
                self.publisher.delegate_archive(ArchiveRequest {
                    file_id: item.file_id.clone(),
                    file_type,
                    source_location: item.input_path.clone(),
                    rebuilt_location: item.output_path.clone(),
                    reply_to: item.reply_to.clone(),
                });
            }
            RunResult::Aborted(cause) => {
                self.clear_output(&item).await;
                if item.generate_report {
                    self.write_report(&item).await;
                }
                self.publisher
                    .publish_abnormal(&item.file_id, &item.reply_to, cause);
            }
        }

        let elapsed = started.elapsed();
        metrics::observe_processing_duration(elapsed.as_secs_f64());
        info!(
            file_id = %item.file_id,
            elapsed_ms = elapsed.as_millis() as u64,
            events = sequencer.emitted(),
            "Processing finished"
        );
    }

    async fn clear_output(&self, item: &WorkItem) {
        match self
            .collaborators
            .storage
            .remove_if_exists(&item.output_path)
            .await
        {
            Ok(true) => info!(
                file_id = %item.file_id,
                path = %item.output_path.display(),
                "Removed partial output"
            ),
            Ok(false) => {}
            Err(e) => error!(
                file_id = %item.file_id,
                path = %item.output_path.display(),
                error = %e,
                "Failed to remove partial output"
            ),
        }
    }

    async fn write_report(&self, item: &WorkItem) {
        let report = match self.collaborators.renderer.render(&item.file_id) {
            Ok(report) => report,
            Err(e) => {
                error!(file_id = %item.file_id, error = %e, "Failed to render failure report");
                return;
            }
        };

        if let Err(e) = self
            .collaborators
            .storage
            .write(&item.output_path, &report)
            .await
        {
            error!(
                file_id = %item.file_id,
                path = %item.output_path.display(),
                error = %e,
                "Failed to write failure report"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::PolicyAction;
    use crate::testing::{work_item, Harness, ScriptedEngine};
    use cdr_observability::EventKind;

    #[tokio::test]
    async fn test_normal_completion_publishes_once() {
        let harness = Harness::new();
        let item = work_item("F1");
        harness.storage.add_file(&item.input_path, b"original");

        harness.supervisor().execute(item.clone()).await;

        let outcomes = harness.channel.outcomes();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].outcome, Disposition::Replaced);
        assert_eq!(harness.channel.terminal_calls(), 1);
    }

    #[tokio::test]
    async fn test_missing_input_publishes_failed_with_report() {
        let harness = Harness::new();
        let mut item = work_item("F1");
        item.generate_report = true;

        harness.supervisor().execute(item.clone()).await;

        let outcomes = harness.channel.outcomes();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].outcome, Disposition::Failed);
        assert_eq!(
            harness.storage.get_data(&item.output_path),
            Some(harness.report_bytes())
        );
    }

    #[tokio::test]
    async fn test_failed_disposition_gets_report() {
        let harness = Harness::with_engine(ScriptedEngine::new().file_type("Unknown"));
        let mut item = work_item("F1");
        item.generate_report = true;
        item.escalation.unmanaged = PolicyAction::Block;
        harness.storage.add_file(&item.input_path, b"???");

        harness.supervisor().execute(item.clone()).await;

        assert_eq!(harness.channel.outcomes()[0].outcome, Disposition::Failed);
        assert_eq!(
            harness.storage.get_data(&item.output_path),
            Some(harness.report_bytes())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_removes_partial_output() {
        let harness = Harness::with_engine(
            ScriptedEngine::new().rebuild_delay(Duration::from_secs(120)),
        );
        let mut item = work_item("F1");
        item.deadline = Duration::from_secs(5);
        harness.storage.add_file(&item.input_path, b"original");
        harness.storage.add_file(&item.output_path, b"stale partial");

        harness.supervisor().execute(item.clone()).await;

        let outcomes = harness.channel.outcomes();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].outcome, Disposition::Failed);
        assert_eq!(harness.storage.get_data(&item.output_path), None);
        assert!(!harness.events.kinds().contains(&EventKind::RebuildCompleted));
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_pipeline_is_an_exception() {
        let harness = Harness::with_engine(ScriptedEngine::new().panic_on_rebuild());
        let item = work_item("F1");
        harness.storage.add_file(&item.input_path, b"original");

        harness.supervisor().execute(item.clone()).await;

        let outcomes = harness.channel.outcomes();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].outcome, Disposition::Failed);
    }
}
