// src/lock.rs

//! Advisory filesystem lock over the package database
//!
//! Every mutating operation (install, delete, upgrade) must hold this lock
//! for its duration. Two concurrent mutating processes on the same database
//! are not supported; concurrent read-only processes are. The lock is held
//! via `flock(LOCK_EX)` and released on drop, which covers every exit path
//! including unwinding.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::debug;

use crate::error::{Error, Result};

/// Exclusive advisory lock guard
pub struct InstanceLock {
    /// The lock file handle (kept open to maintain lock)
    #[allow(dead_code)]
    file: File,
    path: PathBuf,
}

impl InstanceLock {
    /// Acquire the lock without blocking.
    ///
    /// Fails with a fatal error if another mutating process holds it; the
    /// operator retries rather than queueing behind an unknown operation.
    pub fn acquire<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = File::create(&path)?;

        match file.try_lock_exclusive() {
            Ok(()) => {
                debug!("Acquired instance lock at {}", path.display());
                Ok(Self { file, path })
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Err(Error::Fatal(format!(
                "Another mport process holds the lock at {}",
                path.display()
            ))),
            Err(e) => Err(Error::Fatal(format!(
                "Failed to acquire instance lock: {e}"
            ))),
        }
    }

    /// Check whether any process currently holds the lock.
    pub fn is_held<P: AsRef<Path>>(path: P) -> bool {
        let path = path.as_ref();
        if !path.exists() {
            return false;
        }

        let file = match File::open(path) {
            Ok(f) => f,
            Err(_) => return false,
        };

        match file.try_lock_exclusive() {
            Ok(()) => {
                let _ = fs2::FileExt::unlock(&file);
                false
            }
            Err(_) => true,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        debug!("Released instance lock at {}", self.path.display());
    }
}
