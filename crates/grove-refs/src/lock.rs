//! Per-reference mutual exclusion.
//!
//! Both backends poll with a short sleep until the lock is acquired or the
//! timeout expires. The file backend uses a `<ref>.lock` file created with
//! `O_EXCL`; the file doubles as the staging area for the new ref content.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::warn;

use crate::error::{RefError, RefResult};

/// How long an update waits for a busy reference by default.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Call `attempt` until it yields a value or `timeout` elapses.
///
/// `attempt` returns `Ok(None)` when the lock is busy.
pub(crate) fn acquire<T>(
    name: &str,
    timeout: Duration,
    mut attempt: impl FnMut() -> RefResult<Option<T>>,
) -> RefResult<T> {
    let start = Instant::now();
    loop {
        if let Some(held) = attempt()? {
            return Ok(held);
        }
        let waited = start.elapsed();
        if waited >= timeout {
            warn!(ref_name = name, ?waited, "gave up waiting for ref lock");
            return Err(RefError::LockTimeout {
                name: name.to_string(),
                waited,
            });
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}

/// An exclusively created `<ref>.lock` file.
///
/// Dropping the guard without calling [`RefLock::commit`] removes the lock
/// file, leaving the ref untouched.
pub(crate) struct RefLock {
    file: File,
    lock_path: PathBuf,
    target: PathBuf,
    committed: bool,
}

impl RefLock {
    /// Lock the ref stored at `target`.
    pub(crate) fn acquire(name: &str, target: &Path, timeout: Duration) -> RefResult<Self> {
        let mut lock_path = target.as_os_str().to_owned();
        lock_path.push(".lock");
        let lock_path = PathBuf::from(lock_path);

        let open = || {
            OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&lock_path)
        };
        acquire(name, timeout, || {
            let opened = match open() {
                // A delete of a sibling ref may have pruned the directory.
                Err(e) if e.kind() == io::ErrorKind::NotFound => match target.parent() {
                    Some(parent) => match fs::create_dir_all(parent) {
                        Err(e) if e.kind() != io::ErrorKind::NotFound => return Err(e.into()),
                        _ => open(),
                    },
                    None => Err(e),
                },
                other => other,
            };
            match opened {
                Ok(file) => Ok(Some(RefLock {
                    file,
                    lock_path: lock_path.clone(),
                    target: target.to_path_buf(),
                    committed: false,
                })),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(None),
                // Pruned again between create_dir_all and open.
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
    }

    /// Write `content` to the lock file, fsync it, and rename it over the
    /// target.
    pub(crate) fn commit(mut self, content: &[u8]) -> RefResult<()> {
        self.file.write_all(content)?;
        self.file.sync_all()?;
        fs::rename(&self.lock_path, &self.target)?;
        self.committed = true;
        sync_parent(&self.target)
    }
}

impl Drop for RefLock {
    fn drop(&mut self) {
        if !self.committed {
            if let Err(e) = fs::remove_file(&self.lock_path) {
                warn!(path = %self.lock_path.display(), error = %e, "failed to remove ref lock");
            }
        }
    }
}

/// fsync the directory holding `path` so a rename or unlink is durable.
pub(crate) fn sync_parent(path: &Path) -> RefResult<()> {
    if let Some(parent) = path.parent() {
        File::open(parent)?.sync_all()?;
    }
    Ok(())
}
