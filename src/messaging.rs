/*!
 * Outbound messages: the outcome message and the archive delegation request
 *
 * The transport is an external collaborator. `JsonlChannel` appends each
 * message as one JSON line to a file or to stdout, which is enough for a
 * process-per-file deployment where a sidecar forwards the lines.
 */

use crate::core::{Disposition, HeaderSet};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("channel I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("failed to serialize message: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("channel lock poisoned")]
    Poisoned,
}

pub type Result<T> = std::result::Result<T, ChannelError>;

/// The single outbound message of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeMessage {
    pub file_id: String,
    pub outcome: Disposition,
    pub reply_to: String,
    #[serde(default)]
    pub headers: HeaderSet,
}

/// Hand-off of an archive to the archive-handling path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveRequest {
    pub file_id: String,
    pub file_type: String,
    pub source_location: PathBuf,
    pub rebuilt_location: PathBuf,
    pub reply_to: String,
}

/// Transport for outcome messages
pub trait OutcomeChannel: Send + Sync + 'static {
    fn send(&self, message: &OutcomeMessage) -> Result<()>;
}

/// Transport for archive delegation requests
pub trait ArchiveChannel: Send + Sync + 'static {
    fn send(&self, request: &ArchiveRequest) -> Result<()>;
}

/// JSON Lines transport backed by a file or stdout
#[derive(Clone)]
pub struct JsonlChannel {
    writer: Arc<Mutex<Box<dyn Write + Send>>>,
    path: Option<PathBuf>,
}

impl JsonlChannel {
    /// Append to `path`, or write to stdout when `None`
    pub fn new(path: Option<&Path>) -> Result<Self> {
        let writer: Box<dyn Write + Send> = match path {
            Some(p) => {
                let file: File = OpenOptions::new().create(true).append(true).open(p)?;
                Box::new(BufWriter::new(file))
            }
            None => Box::new(io::stdout()),
        };
        Ok(Self {
            writer: Arc::new(Mutex::new(writer)),
            path: path.map(Path::to_path_buf),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn append<T: Serialize>(&self, value: &T) -> Result<()> {
        let line = serde_json::to_string(value)?;
        let mut writer = self.writer.lock().map_err(|_| ChannelError::Poisoned)?;
        writeln!(writer, "{}", line)?;
        writer.flush()?;
        Ok(())
    }
}

impl OutcomeChannel for JsonlChannel {
    fn send(&self, message: &OutcomeMessage) -> Result<()> {
        self.append(message)
    }
}

impl ArchiveChannel for JsonlChannel {
    fn send(&self, request: &ArchiveRequest) -> Result<()> {
        self.append(request)
    }
}
