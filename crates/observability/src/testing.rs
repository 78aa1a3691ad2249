//! Testing utilities for lifecycle event trails
//!
//! `EventCapture` is an in-memory sink whose captured trail can be inspected
//! after a run; `FailingSink` rejects every event.

use crate::event::{EventKind, LifecycleEvent};
use crate::sink::{EventSink, Result, SinkError};
use std::sync::{Arc, Mutex};

/// Event capture utility for testing
///
/// ## Example
///
/// ```
/// use cdr_observability::{EventCapture, EventKind, EventPayload, EventSink, LifecycleEvent};
///
/// let capture = EventCapture::new();
/// let event = LifecycleEvent::new("file-1", chrono::Utc::now(), EventPayload::RebuildStarted);
/// capture.send(&event).unwrap();
///
/// assert_eq!(capture.event_count(), 1);
/// assert_eq!(capture.kinds(), vec![EventKind::RebuildStarted]);
/// ```
#[derive(Clone, Default)]
pub struct EventCapture {
    events: Arc<Mutex<Vec<LifecycleEvent>>>,
}

impl EventCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all captured events
    pub fn events(&self) -> Vec<LifecycleEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Kind tags of the captured events, in emission order
    pub fn kinds(&self) -> Vec<EventKind> {
        self.events().iter().map(LifecycleEvent::kind).collect()
    }

    pub fn event_count(&self) -> usize {
        self.events.lock().unwrap().len()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }

    /// Find events of one kind
    pub fn events_of(&self, kind: EventKind) -> Vec<LifecycleEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.kind() == kind)
            .collect()
    }

    /// Assert that sequence numbers are strictly increasing
    pub fn assert_sequence_monotonic(&self) {
        let events = self.events();
        for window in events.windows(2) {
            assert!(
                window[1].sequence > window[0].sequence,
                "Sequence not monotonic: {} -> {}",
                window[0].sequence,
                window[1].sequence
            );
        }
    }
}

impl EventSink for EventCapture {
    fn send(&self, event: &LifecycleEvent) -> Result<()> {
        self.events
            .lock()
            .map_err(|_| SinkError::Poisoned)?
            .push(event.clone());
        Ok(())
    }
}

/// Sink that rejects every event, for exercising delivery failures
#[derive(Debug, Clone, Copy, Default)]
pub struct FailingSink;

impl EventSink for FailingSink {
    fn send(&self, _event: &LifecycleEvent) -> Result<()> {
        Err(SinkError::Unavailable("event transport unreachable".to_string()))
    }
}
