use std::collections::HashSet;
use std::io;
use std::path::Path;
use std::sync::{Arc, Mutex};

use fs4::tokio::AsyncFileExt;
use tokio::fs::{File, OpenOptions};
use tracing::debug;

use crate::error::{ContentError, ContentResult};

/// Set of ingest refs that currently have an open writer.
///
/// Exclusion is by ref, not by digest: the ref is chosen before the digest of
/// the incoming bytes is known.
#[derive(Clone, Debug, Default)]
pub(crate) struct RefLocks {
    held: Arc<Mutex<HashSet<String>>>,
}

impl RefLocks {
    /// Take the lock for `reference`, failing immediately if it is held.
    pub(crate) fn acquire(&self, reference: &str) -> ContentResult<RefGuard> {
        let mut held = self.held.lock().expect("lock poisoned");
        if !held.insert(reference.to_string()) {
            return Err(ContentError::Locked(reference.to_string()));
        }
        debug!(reference, "ingest ref locked");
        Ok(RefGuard {
            locks: self.clone(),
            reference: reference.to_string(),
        })
    }

    pub(crate) fn is_locked(&self, reference: &str) -> bool {
        self.held.lock().expect("lock poisoned").contains(reference)
    }
}

/// Releases its ref when dropped.
#[derive(Debug)]
pub(crate) struct RefGuard {
    locks: RefLocks,
    reference: String,
}

impl Drop for RefGuard {
    fn drop(&mut self) {
        if let Ok(mut held) = self.locks.held.lock() {
            held.remove(&self.reference);
        }
        debug!(reference = %self.reference, "ingest ref released");
    }
}

/// Exclusive `flock` on a ref's lock file, shared by every handle and
/// process on the same store root. Released when dropped.
///
/// Lock files are never unlinked, so all openers of a ref lock the same inode.
#[derive(Debug)]
pub(crate) struct FileRefLock {
    _file: File,
    reference: String,
}

impl FileRefLock {
    /// Take the lock at `path`, failing with [`ContentError::Locked`] if any
    /// other holder has it.
    pub(crate) async fn try_acquire(path: &Path, reference: &str) -> ContentResult<Self> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(path)
            .await?;
        file.try_lock_exclusive().map_err(|e| {
            if is_contended(&e) {
                ContentError::Locked(reference.to_string())
            } else {
                ContentError::Io(e)
            }
        })?;
        debug!(reference, path = %path.display(), "ingest ref file lock taken");
        Ok(Self {
            _file: file,
            reference: reference.to_string(),
        })
    }
}

impl Drop for FileRefLock {
    fn drop(&mut self) {
        debug!(reference = %self.reference, "ingest ref file lock released");
    }
}

fn is_contended(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::WouldBlock
        || err.raw_os_error() == fs4::lock_contended_error().raw_os_error()
}
