//! The single outbound message of a run
//!
//! Each run ends in exactly one of `publish`, `publish_abnormal` or
//! `delegate_archive`. Calling more than one is a caller bug and is not
//! guarded against.

use super::headers::HeaderSet;
use super::Disposition;
use crate::messaging::{ArchiveChannel, ArchiveRequest, OutcomeChannel, OutcomeMessage};
use cdr_observability::metrics::{self, labels};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Why the supervisor abandoned a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortCause {
    Timeout,
    Exception,
}

impl AbortCause {
    pub fn metric_label(self) -> &'static str {
        match self {
            AbortCause::Timeout => labels::TIMEOUT,
            AbortCause::Exception => labels::EXCEPTION,
        }
    }
}

#[derive(Clone)]
pub struct OutcomePublisher {
    outcomes: Arc<dyn OutcomeChannel>,
    archives: Arc<dyn ArchiveChannel>,
}

impl OutcomePublisher {
    pub fn new(outcomes: Arc<dyn OutcomeChannel>, archives: Arc<dyn ArchiveChannel>) -> Self {
        Self { outcomes, archives }
    }

    /// Send the outcome of a run that settled normally
    pub fn publish(
        &self,
        file_id: &str,
        disposition: Disposition,
        reply_to: &str,
        headers: HeaderSet,
    ) {
        metrics::inc_outcome(disposition.as_str());
        self.send(file_id, disposition, reply_to, headers);
    }

    /// Send Failed for a run that timed out or raised
    pub fn publish_abnormal(&self, file_id: &str, reply_to: &str, cause: AbortCause) {
        metrics::inc_outcome(cause.metric_label());
        self.send(file_id, Disposition::Failed, reply_to, HeaderSet::new());
    }

    /// Hand an archive to the archive path, which owns its outcome
    pub fn delegate_archive(&self, request: ArchiveRequest) {
        metrics::inc_outcome(labels::ARCHIVE_FOUND);
        match self.archives.send(&request) {
            Ok(()) => info!(
                file_id = %request.file_id,
                file_type = %request.file_type,
                "Archive delegated"
            ),
            Err(e) => error!(
                file_id = %request.file_id,
                error = %e,
                "Failed to delegate archive"
            ),
        }
    }

    fn send(&self, file_id: &str, disposition: Disposition, reply_to: &str, headers: HeaderSet) {
        if reply_to.is_empty() {
            warn!(file_id, "Outcome has no reply target");
        }

        let message = OutcomeMessage {
            file_id: file_id.to_string(),
            outcome: disposition,
            reply_to: reply_to.to_string(),
            headers,
        };

        match self.outcomes.send(&message) {
            Ok(()) => info!(file_id, outcome = %disposition, reply_to, "Outcome published"),
            Err(e) => error!(file_id, error = %e, "Failed to publish outcome"),
        }
    }
}
