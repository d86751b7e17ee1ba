//! Advisory file locks guarding the on-disk stores.
//!
//! Writers to the embedding cache and index store take an exclusive
//! lock; index readers take a shared one. Locks are released when the
//! guard drops.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use fs2::FileExt;

/// Held advisory lock. Failures come back as `io::Error` naming the lock
/// file; callers map them onto the error kind of the store they guard.
#[derive(Debug)]
pub struct StoreLock {
    file: File,
    path: PathBuf,
}

impl StoreLock {
    pub async fn exclusive(path: &Path) -> io::Result<Self> {
        Self::acquire(path, true).await
    }

    pub async fn shared(path: &Path) -> io::Result<Self> {
        Self::acquire(path, false).await
    }

    async fn acquire(path: &Path, exclusive: bool) -> io::Result<Self> {
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || {
            let annotate =
                |err: io::Error| io::Error::new(err.kind(), format!("{}: {}", path.display(), err));
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).map_err(annotate)?;
            }
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(&path)
                .map_err(annotate)?;
            let locked = if exclusive {
                file.lock_exclusive()
            } else {
                file.lock_shared()
            };
            locked.map_err(annotate)?;
            Ok(StoreLock { file, path })
        })
        .await
        .map_err(io::Error::other)?
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        if let Err(err) = self.file.unlock() {
            tracing::warn!("Failed to release lock {}: {}", self.path.display(), err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn shared_locks_coexist() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.lock");

        let first = StoreLock::shared(&path).await.unwrap();
        let second = StoreLock::shared(&path).await.unwrap();
        assert_eq!(first.path(), second.path());
    }

    #[tokio::test]
    async fn exclusive_lock_waits_for_release() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("store.lock");

        let held = StoreLock::exclusive(&path).await.unwrap();
        let waiter = {
            let path = path.clone();
            tokio::spawn(async move { StoreLock::exclusive(&path).await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        drop(held);
        let acquired = tokio::time::timeout(Duration::from_secs(5), waiter)
            .await
            .expect("lock should be released")
            .unwrap();
        assert!(acquired.is_ok());
    }

    #[tokio::test]
    async fn failure_names_the_lock_file() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"file").unwrap();

        let err = StoreLock::exclusive(&blocker.join("store.lock")).await.unwrap_err();
        assert!(err.to_string().contains("not-a-dir"));
    }
}
