//! Lifecycle event emission for one run
//!
//! Delivery is at-most-once and order-preserving within the run. Sink
//! failures are logged and swallowed; once the run is cancelled, further
//! events are dropped so nothing trails the outcome message.

use super::WorkItem;
use cdr_observability::{EventPayload, EventSink, LifecycleEvent};
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub struct EventSequencer {
    file_id: String,
    timestamp: DateTime<Utc>,
    sink: Arc<dyn EventSink>,
    cancel: CancellationToken,
    next_sequence: AtomicU64,
}

impl EventSequencer {
    pub fn new(item: &WorkItem, sink: Arc<dyn EventSink>, cancel: CancellationToken) -> Self {
        Self {
            file_id: item.file_id.clone(),
            timestamp: item.timestamp,
            sink,
            cancel,
            next_sequence: AtomicU64::new(0),
        }
    }

    /// Emit one event; never fails
    pub fn emit(&self, payload: EventPayload) {
        let kind = payload.kind();
        if self.cancel.is_cancelled() {
            debug!(file_id = %self.file_id, event = %kind, "Run cancelled, event dropped");
            return;
        }

        let sequence = self.next_sequence.fetch_add(1, Ordering::SeqCst);
        let event =
            LifecycleEvent::new(self.file_id.as_str(), self.timestamp, payload).with_sequence(sequence);

        if let Err(e) = self.sink.send(&event) {
            warn!(
                file_id = %self.file_id,
                event = %kind,
                error = %e,
                "Failed to deliver lifecycle event"
            );
        }
    }

    /// Number of events handed to the sink so far
    pub fn emitted(&self) -> u64 {
        self.next_sequence.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::work_item;
    use cdr_observability::{EventCapture, EventKind, FailingSink};

    #[test]
    fn test_emits_in_order_with_sequence() {
        let capture = EventCapture::new();
        let item = work_item("F1");
        let sequencer =
            EventSequencer::new(&item, Arc::new(capture.clone()), CancellationToken::new());

        sequencer.emit(EventPayload::RebuildStarted);
        sequencer.emit(EventPayload::RebuildCompleted {
            outcome: "replaced".to_string(),
        });

        assert_eq!(
            capture.kinds(),
            vec![EventKind::RebuildStarted, EventKind::RebuildCompleted]
        );
        capture.assert_sequence_monotonic();
        let events = capture.events();
        assert!(events.iter().all(|e| e.file_id == "F1"));
        assert!(events.iter().all(|e| e.timestamp == item.timestamp));
        assert_eq!(sequencer.emitted(), 2);
    }

    #[test]
    fn test_sink_failure_is_swallowed() {
        let item = work_item("F1");
        let sequencer = EventSequencer::new(&item, Arc::new(FailingSink), CancellationToken::new());
        sequencer.emit(EventPayload::RebuildStarted);
        assert_eq!(sequencer.emitted(), 1);
    }

    #[test]
    fn test_cancelled_run_drops_events() {
        let capture = EventCapture::new();
        let cancel = CancellationToken::new();
        let sequencer =
            EventSequencer::new(&work_item("F1"), Arc::new(capture.clone()), cancel.clone());

        sequencer.emit(EventPayload::RebuildStarted);
        cancel.cancel();
        sequencer.emit(EventPayload::RebuildCompleted {
            outcome: "failed".to_string(),
        });

        assert_eq!(capture.kinds(), vec![EventKind::RebuildStarted]);
    }
}
