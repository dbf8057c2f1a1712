//! Cross-process advisory lock on the working directory.
//!
//! The lock file sits next to the working directory (`<parent>/.<name>.lock`)
//! because recovery may delete and re-clone the directory itself. Every
//! process that writes or syncs an artifact holds [`WorkdirLock`] for the
//! whole write → ensure → sync sequence.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use fs2::FileExt;

use crate::error::LockError;

/// How long a run waits for another process before giving up.
pub const LOCK_TIMEOUT: Duration = Duration::from_secs(120);

const RETRY_INTERVAL: Duration = Duration::from_millis(20);

/// Lock file guarding `working_dir`.
pub fn lock_path(working_dir: &Path) -> PathBuf {
    let name = working_dir
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "quill".to_string());
    working_dir
        .parent()
        .unwrap_or(working_dir)
        .join(format!(".{name}.lock"))
}

/// Exclusive lock held until drop.
#[derive(Debug)]
pub struct WorkdirLock {
    file: File,
    path: PathBuf,
}

impl WorkdirLock {
    /// Lock `working_dir`, polling until `timeout` elapses.
    pub fn acquire(working_dir: &Path, timeout: Duration) -> Result<Self, LockError> {
        let path = lock_path(working_dir);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| lock_io_err(&path, e))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| lock_io_err(&path, e))?;

        let start = Instant::now();
        let mut waited_before = false;
        loop {
            match FileExt::try_lock_exclusive(&file) {
                Ok(()) => return Ok(Self { file, path }),
                Err(err) if err.raw_os_error() == fs2::lock_contended_error().raw_os_error() => {
                    if !waited_before {
                        tracing::info!("waiting for {} held by another run", path.display());
                        waited_before = true;
                    }
                }
                Err(err) => return Err(lock_io_err(&path, err)),
            }

            if start.elapsed() >= timeout {
                return Err(LockError::Timeout {
                    path,
                    waited: start.elapsed(),
                });
            }
            thread::sleep(RETRY_INTERVAL);
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn lock_io_err(path: &Path, source: std::io::Error) -> LockError {
    LockError::Io {
        path: path.to_path_buf(),
        source,
    }
}

impl Drop for WorkdirLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn lock_file_lives_beside_working_dir() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("inbox");
        assert_eq!(lock_path(&dir), tmp.path().join(".inbox.lock"));
    }

    #[test]
    fn second_holder_times_out_until_first_drops() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("inbox");

        let held = WorkdirLock::acquire(&dir, Duration::ZERO).unwrap();
        let err = WorkdirLock::acquire(&dir, Duration::from_millis(60)).unwrap_err();
        assert!(matches!(err, LockError::Timeout { .. }), "got {err:?}");
        assert!(!dir.exists(), "locking must not create the working dir");

        drop(held);
        let again = WorkdirLock::acquire(&dir, Duration::ZERO).unwrap();
        assert_eq!(again.path(), tmp.path().join(".inbox.lock"));
    }

    #[test]
    fn waiter_proceeds_once_holder_releases() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("inbox");
        let held = WorkdirLock::acquire(&dir, Duration::ZERO).unwrap();

        let waiter_dir = dir.clone();
        let waiter = thread::spawn(move || WorkdirLock::acquire(&waiter_dir, LOCK_TIMEOUT).is_ok());
        thread::sleep(Duration::from_millis(100));
        drop(held);
        assert!(waiter.join().unwrap());
    }
}
