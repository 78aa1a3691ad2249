//! Write fence over the output location
//!
//! The pipeline and the supervisor both touch the output location. Every
//! pipeline write goes through the fence; the supervisor seals the fence
//! before its own cleanup. Sealing refuses new writes at once and then waits
//! for an in-flight write to land. The wait is unbounded here; callers on a
//! deadline bound it themselves.

use crate::error::{Result, WorkerError};
use cdr_core_interface::StorageSystem;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct OutputFence {
    sealed: Arc<AtomicBool>,
    in_flight: Arc<Mutex<()>>,
}

impl OutputFence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write `data` to `path` unless the fence is sealed
    ///
    /// The storage write runs in its own task holding the fence, so aborting
    /// the caller mid-write cannot release the fence early.
    pub async fn write(
        &self,
        storage: Arc<dyn StorageSystem>,
        path: &Path,
        data: Vec<u8>,
    ) -> Result<()> {
        if self.sealed.load(Ordering::SeqCst) {
            return Err(Self::refused(path));
        }
        let guard = self.in_flight.clone().lock_owned().await;
        if self.sealed.load(Ordering::SeqCst) {
            return Err(Self::refused(path));
        }

        let target = path.to_path_buf();
        let write = tokio::spawn(async move {
            let _guard = guard;
            storage.write(&target, &data).await
        });

        write
            .await
            .map_err(|e| WorkerError::Other(format!("output write task failed: {}", e)))??;
        Ok(())
    }

    /// Refuse further writes, then wait for any in-flight write
    ///
    /// Writes are refused from the first poll, even if the wait is later
    /// abandoned.
    pub async fn seal(&self) {
        self.sealed.store(true, Ordering::SeqCst);
        let _ = self.in_flight.lock().await;
    }

    fn refused(path: &Path) -> WorkerError {
        debug!(path = %path.display(), "Write refused, output sealed");
        WorkerError::OutputSealed(path.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::MockSystem;
    use std::time::Duration;

    #[tokio::test]
    async fn test_write_then_seal() {
        let mock = MockSystem::new();
        let storage: Arc<dyn StorageSystem> = Arc::new(mock.clone());
        let fence = OutputFence::new();
        let out = Path::new("/out/a");

        fence.write(storage.clone(), out, b"one".to_vec()).await.unwrap();
        assert_eq!(mock.get_data(out), Some(b"one".to_vec()));

        fence.seal().await;

        let refused = fence.write(storage, out, b"two".to_vec()).await;
        assert!(matches!(refused, Err(WorkerError::OutputSealed(_))));
        assert_eq!(mock.get_data(out), Some(b"one".to_vec()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_seal_waits_for_aborted_writer() {
        let mock = MockSystem::new();
        mock.set_write_delay(Duration::from_secs(10));
        let storage: Arc<dyn StorageSystem> = Arc::new(mock.clone());
        let fence = OutputFence::new();
        let out = Path::new("/out/slow");

        let writer = tokio::spawn({
            let fence = fence.clone();
            async move { fence.write(storage, out, b"late".to_vec()).await }
        });

        // Let the writer take the fence, then abandon it mid-write
        tokio::time::sleep(Duration::from_secs(1)).await;
        writer.abort();

        fence.seal().await;
        // The in-flight write landed before seal returned
        assert_eq!(mock.get_data(out), Some(b"late".to_vec()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_seal_still_refuses_writes() {
        let mock = MockSystem::new();
        mock.set_write_delay(Duration::from_secs(3600));
        let storage: Arc<dyn StorageSystem> = Arc::new(mock.clone());
        let fence = OutputFence::new();
        let out = Path::new("/out/stuck");

        tokio::spawn({
            let fence = fence.clone();
            let storage = storage.clone();
            async move { fence.write(storage, out, b"stuck".to_vec()).await }
        });
        tokio::time::sleep(Duration::from_secs(1)).await;

        let waited = tokio::time::timeout(Duration::from_secs(1), fence.seal()).await;
        assert!(waited.is_err(), "seal must not return while a write is stuck");

        mock.set_write_delay(Duration::ZERO);
        let refused = fence.write(storage, out, b"after".to_vec()).await;
        assert!(matches!(refused, Err(WorkerError::OutputSealed(_))));
        assert_eq!(mock.writes().len(), 0);
    }
}
