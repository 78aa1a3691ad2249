//! CDR Core Interface: Artifact Storage Abstraction
//!
//! This crate defines the `StorageSystem` trait, which abstracts the handful of
//! storage operations the disposition worker performs on its input and output
//! artifacts. The worker never needs directory listings or streaming access:
//! a unit of work reads one input file whole and writes (or removes) one output
//! file.
//!
//! # Architecture
//!
//! The trait provides two categories of operations:
//!
//! 1. **Discovery**: Check existence, get metadata
//! 2. **Data Access**: Whole-artifact read, write and removal
//!
//! # Example
//!
//! ```rust,no_run
//! use cdr_core_interface::{StorageSystem, StorageSystemExt};
//! use std::path::Path;
//!
//! async fn copy_through<S: StorageSystem>(storage: &S) -> cdr_core_interface::Result<()> {
//!     let input = Path::new("/data/input/file.docx");
//!     if !storage.exists(input).await {
//!         return Ok(());
//!     }
//!
//!     let bytes = storage.read(input).await?;
//!     storage.write(Path::new("/data/output/file.docx"), &bytes).await?;
//!     storage.remove_if_exists(Path::new("/data/output/stale.docx")).await?;
//!     Ok(())
//! }
//! ```

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("File not found: {0}")]
    NotFound(PathBuf),

    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage error: {0}")]
    System(String),
}

impl StorageError {
    /// Map an I/O error for `path` onto the most specific variant
    pub fn from_io(path: &Path, err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => StorageError::NotFound(path.to_path_buf()),
            std::io::ErrorKind::PermissionDenied => {
                StorageError::PermissionDenied(path.to_path_buf())
            }
            _ => StorageError::Io(err),
        }
    }
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// Metadata for a stored artifact
#[derive(Debug, Clone)]
pub struct FileMetadata {
    /// Full path to the artifact
    pub path: PathBuf,

    /// Size in bytes
    pub len: u64,

    /// Last modification time
    pub modified: SystemTime,
}

impl FileMetadata {
    pub fn new(path: impl Into<PathBuf>, len: u64, modified: SystemTime) -> Self {
        Self {
            path: path.into(),
            len,
            modified,
        }
    }
}

/// Storage operations used by the disposition worker
///
/// Implementations:
/// - **LocalSystem**: Direct local filesystem access
/// - **MockSystem**: In-memory storage for tests
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync + 'static`: the supervisor and the
/// pipeline task share one instance across async boundaries.
#[async_trait]
pub trait StorageSystem: Send + Sync + 'static {
    // ═══════════════════════════════════════════════════════════════════════
    // 1. Discovery Operations
    // ═══════════════════════════════════════════════════════════════════════

    /// Check if a path exists
    async fn exists(&self, path: &Path) -> bool;

    /// Get metadata for an artifact
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the path doesn't exist.
    async fn metadata(&self, path: &Path) -> Result<FileMetadata>;

    // ═══════════════════════════════════════════════════════════════════════
    // 2. Data Access Operations
    // ═══════════════════════════════════════════════════════════════════════

    /// Read the whole artifact into memory
    async fn read(&self, path: &Path) -> Result<Vec<u8>>;

    /// Write `data` to `path`, creating or truncating it
    ///
    /// Parent directories are created as needed.
    async fn write(&self, path: &Path, data: &[u8]) -> Result<()>;

    /// Remove the artifact at `path`
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if nothing is stored at `path`.
    async fn remove(&self, path: &Path) -> Result<()>;
}

/// Convenience methods derived from the core trait
#[async_trait]
pub trait StorageSystemExt: StorageSystem {
    /// Remove the artifact if present
    ///
    /// Returns `true` when something was removed.
    async fn remove_if_exists(&self, path: &Path) -> Result<bool> {
        if !self.exists(path).await {
            return Ok(false);
        }
        match self.remove(path).await {
            Ok(()) => Ok(true),
            Err(StorageError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

// Blanket implementation for all StorageSystem implementations
impl<T: StorageSystem + ?Sized> StorageSystemExt for T {}
