//! Non-blocking "at most one" primitives: the per-tick admission gate and the
//! per-cache-directory instance lock.

use crate::error::Result;
use std::fs::{File, OpenOptions, TryLockError};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

const LOG_TARGET: &str = "lyricline::gate";

/// One-slot gate guarding a value. Entering never waits.
pub struct AdmissionGate<T> {
    slot: Arc<Mutex<T>>,
}

/// Result of trying to enter an [`AdmissionGate`]
pub enum Admission<T> {
    /// The slot is held until the guard is dropped
    Acquired(OwnedMutexGuard<T>),
    /// Another holder is still running
    AlreadyRunning,
}

impl<T> AdmissionGate<T> {
    pub fn new(value: T) -> Self {
        Self {
            slot: Arc::new(Mutex::new(value)),
        }
    }

    /// Take the slot if it is free.
    #[must_use]
    pub fn try_enter(&self) -> Admission<T> {
        match self.slot.clone().try_lock_owned() {
            Ok(guard) => Admission::Acquired(guard),
            Err(_) => Admission::AlreadyRunning,
        }
    }
}

impl<T> Clone for AdmissionGate<T> {
    fn clone(&self) -> Self {
        Self {
            slot: self.slot.clone(),
        }
    }
}

/// Exclusive advisory lock on a file, held for the life of the value.
#[derive(Debug)]
pub struct InstanceLock {
    path: PathBuf,
    // Dropping the handle releases the lock
    _file: File,
}

/// Result of trying to take an [`InstanceLock`]
#[derive(Debug)]
pub enum LockOutcome {
    Acquired(InstanceLock),
    AlreadyRunning,
}

impl InstanceLock {
    /// Try to lock `path` without blocking, recording this process id in it.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or locking fails for a reason
    /// other than another holder.
    pub fn try_acquire(path: &Path) -> Result<LockOutcome> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(path)?;

        match file.try_lock() {
            Ok(()) => {}
            Err(TryLockError::WouldBlock) => return Ok(LockOutcome::AlreadyRunning),
            Err(TryLockError::Error(e)) => return Err(e.into()),
        }

        file.set_len(0)?;
        writeln!(file, "{}", std::process::id())?;
        debug!(target: LOG_TARGET, "Acquired instance lock {}", path.display());

        Ok(LockOutcome::Acquired(Self {
            path: path.to_path_buf(),
            _file: file,
        }))
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_gate_admits_one_holder() {
        let gate = AdmissionGate::new(0_u32);

        let Admission::Acquired(mut guard) = gate.try_enter() else {
            panic!("free gate should admit");
        };
        *guard += 1;
        assert!(matches!(gate.clone().try_enter(), Admission::AlreadyRunning));

        drop(guard);
        let Admission::Acquired(guard) = gate.try_enter() else {
            panic!("released gate should admit");
        };
        assert_eq!(*guard, 1);
    }

    #[test]
    fn test_instance_lock_is_exclusive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lyricline.lock");

        let LockOutcome::Acquired(lock) = InstanceLock::try_acquire(&path).unwrap() else {
            panic!("first lock should succeed");
        };
        assert_eq!(lock.path(), path);
        assert_eq!(
            std::fs::read_to_string(&path).unwrap().trim(),
            std::process::id().to_string()
        );

        assert!(matches!(
            InstanceLock::try_acquire(&path).unwrap(),
            LockOutcome::AlreadyRunning
        ));

        drop(lock);
        assert!(matches!(
            InstanceLock::try_acquire(&path).unwrap(),
            LockOutcome::Acquired(_)
        ));
    }
}
