//! In-memory storage for tests
//!
//! Besides plain storage, `MockSystem` records every write and can be told to
//! stall writes or fail them, which is how the late-write and
//! storage-failure paths of the supervisor are exercised.

use cdr_core_interface::{FileMetadata, Result, StorageError, StorageSystem};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::{Duration, SystemTime};

#[derive(Debug, Clone)]
struct MockFile {
    data: Vec<u8>,
    modified: SystemTime,
}

#[derive(Debug, Default)]
struct MockState {
    files: HashMap<PathBuf, MockFile>,
    writes: Vec<PathBuf>,
    removals: Vec<PathBuf>,
    write_delay: Option<Duration>,
    fail_writes: bool,
}

/// In-memory storage implementation
///
/// # Example
///
/// ```rust
/// use cdr_worker::system::MockSystem;
/// use cdr_core_interface::StorageSystem;
/// use std::path::Path;
///
/// # tokio_test::block_on(async {
/// let system = MockSystem::new();
/// system.add_file("/in/test.docx", b"PK");
/// assert!(system.exists(Path::new("/in/test.docx")).await);
/// # });
/// ```
#[derive(Debug, Clone, Default)]
pub struct MockSystem {
    state: Arc<RwLock<MockState>>,
}

impl MockSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file with the given content
    pub fn add_file(&self, path: impl Into<PathBuf>, data: &[u8]) {
        if let Ok(mut state) = self.state.write() {
            state.files.insert(
                path.into(),
                MockFile {
                    data: data.to_vec(),
                    modified: SystemTime::now(),
                },
            );
        }
    }

    /// Stall every subsequent write by `delay` before it lands
    pub fn set_write_delay(&self, delay: Duration) {
        if let Ok(mut state) = self.state.write() {
            state.write_delay = Some(delay);
        }
    }

    /// Make every subsequent write fail
    pub fn set_fail_writes(&self, fail: bool) {
        if let Ok(mut state) = self.state.write() {
            state.fail_writes = fail;
        }
    }

    /// Stored bytes at `path`, if any
    pub fn get_data(&self, path: &Path) -> Option<Vec<u8>> {
        self.state
            .read()
            .ok()
            .and_then(|s| s.files.get(path).map(|f| f.data.clone()))
    }

    /// Paths written so far, in order
    pub fn writes(&self) -> Vec<PathBuf> {
        self.state
            .read()
            .map(|s| s.writes.clone())
            .unwrap_or_default()
    }

    /// Paths removed so far, in order
    pub fn removals(&self) -> Vec<PathBuf> {
        self.state
            .read()
            .map(|s| s.removals.clone())
            .unwrap_or_default()
    }

    fn poisoned() -> StorageError {
        StorageError::System("mock storage lock poisoned".to_string())
    }
}

#[async_trait::async_trait]
impl StorageSystem for MockSystem {
    async fn exists(&self, path: &Path) -> bool {
        self.state
            .read()
            .map(|s| s.files.contains_key(path))
            .unwrap_or(false)
    }

    async fn metadata(&self, path: &Path) -> Result<FileMetadata> {
        let state = self.state.read().map_err(|_| Self::poisoned())?;
        let file = state
            .files
            .get(path)
            .ok_or_else(|| StorageError::NotFound(path.to_path_buf()))?;
        Ok(FileMetadata::new(path, file.data.len() as u64, file.modified))
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        let state = self.state.read().map_err(|_| Self::poisoned())?;
        state
            .files
            .get(path)
            .map(|f| f.data.clone())
            .ok_or_else(|| StorageError::NotFound(path.to_path_buf()))
    }

    async fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        let (delay, fail) = {
            let state = self.state.read().map_err(|_| Self::poisoned())?;
            (state.write_delay, state.fail_writes)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if fail {
            return Err(StorageError::PermissionDenied(path.to_path_buf()));
        }

        let mut state = self.state.write().map_err(|_| Self::poisoned())?;
        state.files.insert(
            path.to_path_buf(),
            MockFile {
                data: data.to_vec(),
                modified: SystemTime::now(),
            },
        );
        state.writes.push(path.to_path_buf());
        Ok(())
    }

    async fn remove(&self, path: &Path) -> Result<()> {
        let mut state = self.state.write().map_err(|_| Self::poisoned())?;
        state
            .files
            .remove(path)
            .ok_or_else(|| StorageError::NotFound(path.to_path_buf()))?;
        state.removals.push(path.to_path_buf());
        Ok(())
    }
}
