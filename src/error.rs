/*!
 * Error types for the CDR worker
 */

use crate::engine::EngineError;
use crate::report::ReportError;
use cdr_core_interface::StorageError;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, WorkerError>;

/// Exit code constants for structured process exit
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FATAL: i32 = 2;

#[derive(Debug, Error)]
pub enum WorkerError {
    /// The input artifact does not exist
    #[error("Input not found: {}", .0.display())]
    InputNotFound(PathBuf),

    /// Storage operation failed
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Classification, analysis or rebuild engine failed
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    /// Failure report could not be rendered
    #[error("Report error: {0}")]
    Report(#[from] ReportError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// The supervisor has taken ownership of the output location
    #[error("Output location sealed: {}", .0.display())]
    OutputSealed(PathBuf),

    /// The run was cancelled by the supervisor
    #[error("Processing cancelled")]
    Cancelled,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

impl WorkerError {
    /// Check if this error is fatal for the unit of work
    ///
    /// Fatal errors are never escalated to the decision authority.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            WorkerError::InputNotFound(_) | WorkerError::Config(_)
        )
    }

    /// Check if this error stems from supervisor cancellation
    pub fn is_cancellation(&self) -> bool {
        matches!(self, WorkerError::Cancelled | WorkerError::OutputSealed(_))
    }

    /// Get error category for logging
    pub fn category(&self) -> ErrorCategory {
        match self {
            WorkerError::InputNotFound(_) => ErrorCategory::Validation,
            WorkerError::Storage(_) | WorkerError::Io(_) => ErrorCategory::Storage,
            WorkerError::Engine(_) => ErrorCategory::Engine,
            WorkerError::Report(_) => ErrorCategory::Report,
            WorkerError::Config(_) => ErrorCategory::Configuration,
            WorkerError::OutputSealed(_) | WorkerError::Cancelled => ErrorCategory::Cancellation,
            WorkerError::Other(_) => ErrorCategory::Unknown,
        }
    }
}

/// Error category for classification and reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Missing or invalid input
    Validation,
    /// Artifact storage errors
    Storage,
    /// External engine errors
    Engine,
    /// Report rendering errors
    Report,
    /// Configuration errors
    Configuration,
    /// Deadline cancellation
    Cancellation,
    /// Uncategorized errors
    Unknown,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Validation => write!(f, "validation"),
            ErrorCategory::Storage => write!(f, "storage"),
            ErrorCategory::Engine => write!(f, "engine"),
            ErrorCategory::Report => write!(f, "report"),
            ErrorCategory::Configuration => write!(f, "configuration"),
            ErrorCategory::Cancellation => write!(f, "cancellation"),
            ErrorCategory::Unknown => write!(f, "unknown"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_not_found_is_fatal() {
        let err = WorkerError::InputNotFound(PathBuf::from("/in/missing.docx"));
        assert!(err.is_fatal());
        assert_eq!(err.category(), ErrorCategory::Validation);
        assert!(err.to_string().contains("/in/missing.docx"));
    }

    #[test]
    fn test_engine_error_is_not_fatal() {
        let err = WorkerError::Engine(EngineError::Failed("segfault".to_string()));
        assert!(!err.is_fatal());
        assert_eq!(err.category(), ErrorCategory::Engine);
    }

    #[test]
    fn test_cancellation_errors() {
        assert!(WorkerError::Cancelled.is_cancellation());
        assert!(WorkerError::OutputSealed(PathBuf::from("/out")).is_cancellation());
        assert!(!WorkerError::Other("x".to_string()).is_cancellation());
    }

    #[test]
    fn test_storage_error_conversion() {
        let err: WorkerError = StorageError::NotFound(PathBuf::from("/x")).into();
        assert_eq!(err.category(), ErrorCategory::Storage);
        assert_eq!(err.category().to_string(), "storage");
    }
}
