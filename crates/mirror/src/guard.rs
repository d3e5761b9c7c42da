//! Single-instance guard
//!
//! At most one mirror process may run against a given local database;
//! concurrent mirrors would race watermark resolution and double-copy data.
//! The guard is an advisory lock file in the working directory: acquired
//! atomically with `create_new`, held for the process lifetime, removed on
//! clean shutdown. After an abnormal termination the stale file is cleared
//! with the `forceOn` argument. Single-host only, not a distributed lock.

use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Lock filename, relative to the working directory
pub const LOCK_FILE: &str = "mirror.lock";

/// Advisory lock-file guard
pub struct InstanceGuard {
    path: PathBuf,
}

impl InstanceGuard {
    /// Guard at the default location (`mirror.lock` in the working directory)
    pub fn default_location() -> Self {
        Self {
            path: PathBuf::from(LOCK_FILE),
        }
    }

    /// Guard at a specific path
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Try to acquire the lock
    ///
    /// `false` means another instance holds it (or a stale lock was left by
    /// an abnormal termination). The create is atomic, so two concurrent
    /// startups cannot both succeed.
    pub fn try_acquire(&self) -> Result<bool> {
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)
        {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(e).with_context(|| {
                format!("Failed to create lock file {}", self.path.display())
            }),
        }
    }

    /// Release a held lock
    pub fn release(&self) -> Result<()> {
        std::fs::remove_file(&self.path)
            .with_context(|| format!("Failed to remove lock file {}", self.path.display()))
    }

    /// Clear a stale lock regardless of who holds it
    pub fn force_reset(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| {
                format!("Failed to remove lock file {}", self.path.display())
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_acquire_release_cycle() {
        let dir = TempDir::new().unwrap();
        let guard = InstanceGuard::at(dir.path().join(LOCK_FILE));

        assert!(guard.try_acquire().unwrap());
        assert!(guard.path().exists());
        guard.release().unwrap();
        assert!(!guard.path().exists());
        assert!(guard.try_acquire().unwrap());
    }

    #[test]
    fn test_second_acquire_fails_while_held() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(LOCK_FILE);
        let first = InstanceGuard::at(&path);
        let second = InstanceGuard::at(&path);

        assert!(first.try_acquire().unwrap());
        assert!(!second.try_acquire().unwrap());
    }

    #[test]
    fn test_force_reset_clears_stale_lock() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(LOCK_FILE);
        std::fs::write(&path, b"").unwrap();

        let guard = InstanceGuard::at(&path);
        assert!(!guard.try_acquire().unwrap());
        guard.force_reset().unwrap();
        assert!(guard.try_acquire().unwrap());
    }

    #[test]
    fn test_force_reset_without_lock_is_a_noop() {
        let dir = TempDir::new().unwrap();
        let guard = InstanceGuard::at(dir.path().join(LOCK_FILE));
        guard.force_reset().unwrap();
        assert!(!guard.path().exists());
    }

    #[test]
    fn test_release_without_lock_is_an_error() {
        let dir = TempDir::new().unwrap();
        let guard = InstanceGuard::at(dir.path().join(LOCK_FILE));
        assert!(guard.release().is_err());
    }
}
