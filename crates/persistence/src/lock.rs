//! Multi-process advisory locking on a sidecar lockfile.
//!
//! `exclusive` serializes writers across processes; `shared` lets several
//! read-only openers coexist; `none` takes nothing and assumes a single
//! process. Lock acquisition polls until `timeout_ms` elapses, so the
//! default of 0 means a single immediate attempt.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::error::{PersistenceError, Result};

const RETRY_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LockMode {
    #[default]
    None,
    Shared,
    Exclusive,
}

#[derive(Debug)]
pub struct FileLock {
    file: File,
    path: PathBuf,
    mode: LockMode,
}

impl FileLock {
    /// Acquire the lock at `path` (created if missing). Returns `None` for
    /// `LockMode::None`.
    pub fn acquire(path: &Path, mode: LockMode, timeout_ms: u64) -> Result<Option<FileLock>> {
        if mode == LockMode::None {
            return Ok(None);
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(path)?;

        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        loop {
            let attempt = match mode {
                LockMode::Exclusive => fs2::FileExt::try_lock_exclusive(&file),
                LockMode::Shared => fs2::FileExt::try_lock_shared(&file),
                LockMode::None => unreachable!("handled above"),
            };
            match attempt {
                Ok(()) => {
                    return Ok(Some(FileLock {
                        file,
                        path: path.to_path_buf(),
                        mode,
                    }))
                }
                Err(e) if is_contended(&e) => {
                    if Instant::now() >= deadline {
                        return Err(PersistenceError::LockTimeout { timeout_ms });
                    }
                    std::thread::sleep(RETRY_INTERVAL);
                }
                Err(e) => return Err(PersistenceError::Io(e)),
            }
        }
    }

    pub fn mode(&self) -> LockMode {
        self.mode
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

fn is_contended(e: &std::io::Error) -> bool {
    e.kind() == std::io::ErrorKind::WouldBlock
        || e.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}
