//! Local filesystem implementation of StorageSystem
//!
//! Wraps `tokio::fs` so the pipeline and the supervisor can share one
//! storage handle across tasks.

use cdr_core_interface::{FileMetadata, Result, StorageError, StorageSystem};
use std::path::Path;
use std::time::SystemTime;
use tokio::fs;

/// Local filesystem implementation of StorageSystem
///
/// # Example
///
/// ```rust,no_run
/// use cdr_worker::system::LocalSystem;
/// use cdr_core_interface::StorageSystem;
/// use std::path::Path;
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let system = LocalSystem;
///     let exists = system.exists(Path::new("/tmp/input.docx")).await;
///     println!("Input exists: {}", exists);
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalSystem;

impl LocalSystem {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl StorageSystem for LocalSystem {
    async fn exists(&self, path: &Path) -> bool {
        fs::try_exists(path).await.unwrap_or_else(|_| path.exists())
    }

    async fn metadata(&self, path: &Path) -> Result<FileMetadata> {
        let meta = fs::metadata(path)
            .await
            .map_err(|e| StorageError::from_io(path, e))?;

        Ok(FileMetadata::new(
            path,
            meta.len(),
            meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
        ))
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        fs::read(path).await.map_err(|e| StorageError::from_io(path, e))
    }

    async fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .await
                    .map_err(|e| StorageError::from_io(parent, e))?;
            }
        }
        fs::write(path, data)
            .await
            .map_err(|e| StorageError::from_io(path, e))
    }

    async fn remove(&self, path: &Path) -> Result<()> {
        fs::remove_file(path)
            .await
            .map_err(|e| StorageError::from_io(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cdr_core_interface::StorageSystemExt;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_local_write_read_remove() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/out/file.pdf");
        let system = LocalSystem::new();

        assert!(!system.exists(&path).await);
        system.write(&path, b"%PDF-1.7").await.unwrap();
        assert!(system.exists(&path).await);
        assert_eq!(system.read(&path).await.unwrap(), b"%PDF-1.7");
        assert_eq!(system.metadata(&path).await.unwrap().len, 8);

        assert!(system.remove_if_exists(&path).await.unwrap());
        assert!(!system.remove_if_exists(&path).await.unwrap());
    }

    #[tokio::test]
    async fn test_local_missing_file_errors() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing.bin");
        let system = LocalSystem::new();

        assert!(matches!(
            system.read(&path).await,
            Err(StorageError::NotFound(_))
        ));
        assert!(matches!(
            system.metadata(&path).await,
            Err(StorageError::NotFound(_))
        ));
    }
}
