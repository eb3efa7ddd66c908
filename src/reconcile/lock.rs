//! Run lock preventing overlapping reconciliation passes

use crate::error::LockError;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Exclusive `flock` on the lock file, released on drop.
///
/// The file itself is left in place; unlinking it would let a second run lock
/// a fresh inode while the first still holds the old one.
#[derive(Debug)]
pub struct RunLock {
    file: File,
    path: PathBuf,
}

impl RunLock {
    /// Take the lock without blocking. `Ok(None)` means another run holds it.
    pub fn try_acquire(path: &Path) -> Result<Option<Self>, LockError> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| LockError::Open {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;

        let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
        if rc != 0 {
            let err = std::io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EWOULDBLOCK)
                || err.raw_os_error() == Some(libc::EAGAIN)
            {
                return Ok(None);
            }
            return Err(LockError::Acquire(err.to_string()));
        }

        let mut lock = Self {
            file,
            path: path.to_path_buf(),
        };
        lock.record_owner();
        debug!(path = %lock.path.display(), "run lock acquired");

        Ok(Some(lock))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    // Holder pid, for whoever inspects a stuck lock
    fn record_owner(&mut self) {
        let _ = self.file.set_len(0);
        let _ = writeln!(self.file, "{}", std::process::id());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("uplink-nat.lock");

        let first = RunLock::try_acquire(&path).unwrap();
        assert!(first.is_some());

        let second = RunLock::try_acquire(&path).unwrap();
        assert!(second.is_none());

        drop(first);
        let third = RunLock::try_acquire(&path).unwrap();
        assert!(third.is_some());
    }

    #[test]
    fn test_lock_records_pid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("uplink-nat.lock");

        let lock = RunLock::try_acquire(&path).unwrap().unwrap();
        let content = std::fs::read_to_string(lock.path()).unwrap();
        assert_eq!(content.trim(), std::process::id().to_string());
    }

    #[test]
    fn test_unopenable_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("uplink-nat.lock");

        let result = RunLock::try_acquire(&path);
        assert!(matches!(result, Err(LockError::Open { .. })));
    }
}
