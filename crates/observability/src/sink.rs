//! Event sinks for lifecycle events
//!
//! A sink is the delivery end of the event trail. Delivery is fire-and-forget
//! from the pipeline's point of view: callers log a `SinkError` and carry on.

use crate::event::LifecycleEvent;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors that can occur while delivering an event
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Sink state poisoned by a panicked writer")]
    Poisoned,

    #[error("Sink unavailable: {0}")]
    Unavailable(String),
}

/// Result type for sink operations
pub type Result<T> = std::result::Result<T, SinkError>;

/// Destination for lifecycle events
pub trait EventSink: Send + Sync {
    /// Deliver one event
    fn send(&self, event: &LifecycleEvent) -> Result<()>;
}

/// Appends events to a file in JSON Lines format
///
/// ## Example
///
/// ```no_run
/// use cdr_observability::{EventPayload, EventSink, JsonlEventLog, LifecycleEvent};
/// use std::path::Path;
///
/// let log = JsonlEventLog::new(Some(Path::new("events.jsonl"))).unwrap();
/// let event = LifecycleEvent::new("file-1", chrono::Utc::now(), EventPayload::RebuildStarted);
/// log.send(&event).unwrap();
/// ```
#[derive(Clone)]
pub struct JsonlEventLog {
    inner: Arc<Mutex<LogInner>>,
}

struct LogInner {
    writer: Option<BufWriter<File>>,
    path: Option<PathBuf>,
}

impl JsonlEventLog {
    /// Create a new event log
    ///
    /// If `path` is None, events are discarded.
    /// If `path` is Some, events are appended to the file.
    pub fn new(path: Option<&Path>) -> Result<Self> {
        let writer = if let Some(p) = path {
            if let Some(parent) = p.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }

            let file = OpenOptions::new().create(true).append(true).open(p)?;

            Some(BufWriter::new(file))
        } else {
            None
        };

        Ok(Self {
            inner: Arc::new(Mutex::new(LogInner {
                writer,
                path: path.map(|p| p.to_path_buf()),
            })),
        })
    }

    /// Create a log that discards all events
    pub fn disabled() -> Self {
        Self {
            inner: Arc::new(Mutex::new(LogInner {
                writer: None,
                path: None,
            })),
        }
    }

    /// Get the log file path (if any)
    pub fn path(&self) -> Option<PathBuf> {
        self.inner.lock().ok().and_then(|inner| inner.path.clone())
    }
}

impl EventSink for JsonlEventLog {
    fn send(&self, event: &LifecycleEvent) -> Result<()> {
        let mut inner = self.inner.lock().map_err(|_| SinkError::Poisoned)?;

        if let Some(ref mut writer) = inner.writer {
            let json = serde_json::to_string(event)?;
            writeln!(writer, "{}", json)?;
            writer.flush()?;
        }

        Ok(())
    }
}

/// Emits events as structured `tracing` records
///
/// Used when no event log file is configured so the trail still shows up in
/// the worker's own logs.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn send(&self, event: &LifecycleEvent) -> Result<()> {
        let payload = serde_json::to_string(&event.payload)?;
        tracing::info!(
            target: "cdr_events",
            file_id = %event.file_id,
            event = %event.kind(),
            event_id = event.event_id,
            sequence = event.sequence,
            payload = %payload,
            "lifecycle event"
        );
        Ok(())
    }
}
