//! CDR Worker Observability
//!
//! This crate provides the audit/telemetry surface of the disposition worker:
//! - **Lifecycle events**: one immutable record per stage transition
//! - **Event sinks**: JSON Lines file log and `tracing` output
//! - **Prometheus metrics**: outcome counter and processing-time histogram
//!
//! ## Delivery model
//!
//! Events are delivered at most once and in emission order within one run.
//! A failing sink never changes the outcome of a run; the caller logs the
//! `SinkError` and moves on.
//!
//! ## Quick Start
//!
//! ```no_run
//! use cdr_observability::{EventPayload, EventSink, JsonlEventLog, LifecycleEvent};
//! use std::path::Path;
//!
//! let log = JsonlEventLog::new(Some(Path::new("events.jsonl"))).unwrap();
//! let event = LifecycleEvent::new(
//!     "file-123",
//!     chrono::Utc::now(),
//!     EventPayload::FileTypeDetected { file_type: "docx".to_string() },
//! );
//! log.send(&event).unwrap();
//! ```
//!
//! ## Prometheus Metrics
//!
//! ```
//! use cdr_observability::metrics;
//!
//! metrics::inc_outcome(metrics::labels::REPLACED);
//! metrics::observe_processing_duration(1.5);
//!
//! let metrics_text = metrics::metrics_text();
//! assert!(metrics_text.contains("cdr_processing_outcomes_total"));
//! ```

pub mod event;
pub mod metrics;
pub mod sink;

// Testing utilities
pub mod testing;

pub use event::{EventKind, EventPayload, LifecycleEvent, RESPONSE_MODE};
pub use sink::{EventSink, JsonlEventLog, SinkError, TracingEventSink};
pub use testing::{EventCapture, FailingSink};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::event::{EventKind, EventPayload, LifecycleEvent};
    pub use crate::sink::{EventSink, JsonlEventLog, TracingEventSink};
}
