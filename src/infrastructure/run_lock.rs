//! Exclusive run lock
//!
//! A `sync.lock` file created with `create_new` in the reports directory.
//! It is removed when the guard drops. A lock left behind by a crashed
//! process has to be deleted by hand; the error names its path.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::application::SyncError;

pub const LOCK_FILE_NAME: &str = "sync.lock";

#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
}

impl RunLock {
    pub fn acquire(dir: &Path) -> Result<Self, SyncError> {
        std::fs::create_dir_all(dir).map_err(|e| {
            SyncError::configuration(format!("cannot create state directory {}: {e}", dir.display()))
        })?;

        let path = dir.join(LOCK_FILE_NAME);
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                warn!("🔒 Sync lock already held: {:?}", path);
                return Err(SyncError::RunLocked { path });
            }
            Err(e) => {
                return Err(SyncError::configuration(format!(
                    "cannot create lock file {}: {e}",
                    path.display()
                )));
            }
        };

        // Owner info only helps whoever finds a stale lock
        let _ = writeln!(file, "pid={} started={}", std::process::id(), chrono::Utc::now().to_rfc3339());
        debug!("Acquired sync lock {:?}", path);
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!("Failed to release sync lock {:?}: {}", self.path, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_second_acquire_fails_until_release() {
        let dir = TempDir::new().unwrap();
        let lock = RunLock::acquire(dir.path()).unwrap();
        assert!(lock.path().exists());

        assert!(matches!(
            RunLock::acquire(dir.path()),
            Err(SyncError::RunLocked { .. })
        ));

        drop(lock);
        assert!(!dir.path().join(LOCK_FILE_NAME).exists());
        assert!(RunLock::acquire(dir.path()).is_ok());
    }

    #[test]
    fn test_missing_directory_is_created() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("a").join("b");
        let _lock = RunLock::acquire(&nested).unwrap();
        assert!(nested.join(LOCK_FILE_NAME).exists());
    }
}
