//! Filesystem-backed content store.
//!
//! On-disk layout under the store root:
//!
//! ```text
//! blobs/<algorithm>/<hex>              committed, immutable blobs
//! ingest/<sha256(ref)>/data            bytes ingested so far
//! ingest/<sha256(ref)>/status.json     ref name, hints, start time
//! locks/<sha256(ref)>.lock             flock held by the ref's open writer
//! ```
//!
//! A commit renames the ingest's `data` file into `blobs/`, so a blob appears
//! under its digest all at once or not at all. Ingest directories survive a
//! restart and are resumed by the next writer opened on the same ref.
//!
//! The ref lock is a file lock, so it holds across every [`LocalStore`]
//! handle and process sharing a root.

use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info, warn};

use cask_types::{Algorithm, Digest, Digester};

use crate::error::{ContentError, ContentResult};
use crate::locks::FileRefLock;
use crate::traits::{BlobReader, ContentStore, ContentWriter, Provider};
use crate::types::{Info, WriteStatus};

const DATA_FILE: &str = "data";
const STATUS_FILE: &str = "status.json";

/// Persisted part of a write status; offset and update time come from the
/// data file itself.
#[derive(Debug, Serialize, Deserialize)]
struct IngestRecord {
    #[serde(rename = "ref")]
    reference: String,
    expected_total: Option<u64>,
    expected: Option<Digest>,
    started_at: DateTime<Utc>,
}

/// Content store rooted at a directory on the local filesystem.
#[derive(Clone, Debug)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    /// Open (or create) a store rooted at `root`.
    pub async fn open(root: impl AsRef<Path>) -> ContentResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(root.join("blobs")).await?;
        fs::create_dir_all(root.join("ingest")).await?;
        fs::create_dir_all(root.join("locks")).await?;
        info!(root = %root.display(), "opened local content store");
        Ok(Self { root })
    }

    /// Root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn blob_path(&self, digest: &Digest) -> PathBuf {
        self.root
            .join("blobs")
            .join(digest.algorithm().as_str())
            .join(digest.encoded())
    }

    fn ingest_dir(&self, reference: &str) -> PathBuf {
        // Refs are arbitrary strings; hash them into a safe directory name.
        self.root
            .join("ingest")
            .join(Digest::from_bytes(reference.as_bytes()).encoded())
    }

    fn lock_path(&self, reference: &str) -> PathBuf {
        self.root.join("locks").join(format!(
            "{}.lock",
            Digest::from_bytes(reference.as_bytes()).encoded()
        ))
    }

    async fn lock(&self, reference: &str) -> ContentResult<FileRefLock> {
        FileRefLock::try_acquire(&self.lock_path(reference), reference).await
    }

    async fn read_status(&self, dir: &Path) -> ContentResult<WriteStatus> {
        let raw = fs::read(dir.join(STATUS_FILE)).await?;
        let record: IngestRecord =
            serde_json::from_slice(&raw).map_err(|e| ContentError::Serialization(e.to_string()))?;
        let meta = fs::metadata(dir.join(DATA_FILE)).await?;
        Ok(WriteStatus {
            reference: record.reference,
            offset: meta.len(),
            expected_total: record.expected_total,
            expected: record.expected,
            started_at: record.started_at,
            updated_at: meta.modified().map(DateTime::<Utc>::from)?,
        })
    }

    async fn write_record(dir: &Path, status: &WriteStatus) -> ContentResult<()> {
        let record = IngestRecord {
            reference: status.reference.clone(),
            expected_total: status.expected_total,
            expected: status.expected.clone(),
            started_at: status.started_at,
        };
        let raw =
            serde_json::to_vec(&record).map_err(|e| ContentError::Serialization(e.to_string()))?;
        fs::write(dir.join(STATUS_FILE), raw).await?;
        Ok(())
    }
}

fn not_found_or(err: io::Error, not_found: impl FnOnce() -> ContentError) -> ContentError {
    if err.kind() == ErrorKind::NotFound {
        not_found()
    } else {
        ContentError::Io(err)
    }
}

#[async_trait]
impl Provider for LocalStore {
    async fn reader(&self, digest: &Digest) -> ContentResult<Box<dyn BlobReader>> {
        let file = File::open(self.blob_path(digest))
            .await
            .map_err(|e| not_found_or(e, || ContentError::NotFound(digest.clone())))?;
        Ok(Box::new(file))
    }

    async fn info(&self, digest: &Digest) -> ContentResult<Info> {
        let meta = fs::metadata(self.blob_path(digest))
            .await
            .map_err(|e| not_found_or(e, || ContentError::NotFound(digest.clone())))?;
        Ok(Info {
            digest: digest.clone(),
            size: meta.len(),
            committed_at: meta.modified().map(DateTime::<Utc>::from)?,
        })
    }
}

#[async_trait]
impl ContentStore for LocalStore {
    async fn writer(
        &self,
        reference: &str,
        expected_size: Option<u64>,
        expected: Option<&Digest>,
    ) -> ContentResult<Box<dyn ContentWriter>> {
        let guard = self.lock(reference).await?;

        if let Some(digest) = expected {
            match self.info(digest).await {
                Ok(info) if expected_size.map_or(true, |s| s == info.size) => {
                    return Err(ContentError::AlreadyExists(digest.clone()));
                }
                Ok(_) | Err(ContentError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }

        let dir = self.ingest_dir(reference);
        let algorithm = expected.map_or(Algorithm::CANONICAL, |d| d.algorithm());
        let mut digester = algorithm.digester();

        let status = match self.read_status(&dir).await {
            Ok(mut status) => {
                // Re-hash the prefix so the running digest covers resumed bytes.
                let mut existing = File::open(dir.join(DATA_FILE)).await?;
                let mut buf = vec![0u8; 64 * 1024];
                loop {
                    let n = existing.read(&mut buf).await?;
                    if n == 0 {
                        break;
                    }
                    digester.update(&buf[..n]);
                }
                status.merge_hints(expected_size, expected);
                debug!(reference, offset = status.offset, "resuming ingest");
                status
            }
            Err(ContentError::Io(e)) if e.kind() == ErrorKind::NotFound => {
                fs::create_dir_all(&dir).await?;
                let status = WriteStatus::new(reference, expected_size, expected.cloned());
                File::create(dir.join(DATA_FILE)).await?;
                status
            }
            Err(e) => return Err(e),
        };
        Self::write_record(&dir, &status).await?;

        let file = OpenOptions::new()
            .append(true)
            .open(dir.join(DATA_FILE))
            .await?;

        Ok(Box::new(LocalWriter {
            file: Some(file),
            dir,
            blobs_root: self.root.join("blobs"),
            status,
            digester,
            guard: Some(guard),
        }))
    }

    async fn status(&self, reference: &str) -> ContentResult<WriteStatus> {
        self.read_status(&self.ingest_dir(reference))
            .await
            .map_err(|e| match e {
                ContentError::Io(io) => {
                    not_found_or(io, || ContentError::IngestNotFound(reference.to_string()))
                }
                other => other,
            })
    }

    async fn list_statuses(&self) -> ContentResult<Vec<WriteStatus>> {
        let mut statuses = Vec::new();
        let mut entries = fs::read_dir(self.root.join("ingest")).await?;
        while let Some(entry) = entries.next_entry().await? {
            match self.read_status(&entry.path()).await {
                Ok(status) => statuses.push(status),
                Err(e) => warn!(path = %entry.path().display(), error = %e, "skipping unreadable ingest"),
            }
        }
        statuses.sort_by(|a, b| a.reference.cmp(&b.reference));
        Ok(statuses)
    }

    async fn abort(&self, reference: &str) -> ContentResult<()> {
        let _guard = self.lock(reference).await?;
        fs::remove_dir_all(self.ingest_dir(reference))
            .await
            .map_err(|e| not_found_or(e, || ContentError::IngestNotFound(reference.to_string())))?;
        debug!(reference, "aborted ingest");
        Ok(())
    }

    async fn list(&self) -> ContentResult<Vec<Info>> {
        let mut infos = Vec::new();
        let mut algorithms = fs::read_dir(self.root.join("blobs")).await?;
        while let Some(alg_dir) = algorithms.next_entry().await? {
            let Some(algorithm) = alg_dir
                .file_name()
                .to_str()
                .and_then(|s| s.parse::<Algorithm>().ok())
            else {
                warn!(path = %alg_dir.path().display(), "skipping unknown algorithm directory");
                continue;
            };
            let mut blobs = fs::read_dir(alg_dir.path()).await?;
            while let Some(blob) = blobs.next_entry().await? {
                let parsed = blob
                    .file_name()
                    .to_str()
                    .map(|hex| Digest::new(algorithm, hex));
                match parsed {
                    Some(Ok(digest)) => {
                        let meta = blob.metadata().await?;
                        infos.push(Info {
                            digest,
                            size: meta.len(),
                            committed_at: meta.modified().map(DateTime::<Utc>::from)?,
                        });
                    }
                    _ => warn!(path = %blob.path().display(), "skipping stray file in blob directory"),
                }
            }
        }
        infos.sort_by(|a, b| a.digest.cmp(&b.digest));
        Ok(infos)
    }

    async fn delete(&self, digest: &Digest) -> ContentResult<()> {
        fs::remove_file(self.blob_path(digest))
            .await
            .map_err(|e| not_found_or(e, || ContentError::NotFound(digest.clone())))?;
        debug!(digest = %digest, "deleted blob");
        Ok(())
    }
}

/// Writer over a [`LocalStore`] ingest directory.
struct LocalWriter {
    file: Option<File>,
    dir: PathBuf,
    blobs_root: PathBuf,
    status: WriteStatus,
    digester: Digester,
    guard: Option<FileRefLock>,
}

impl LocalWriter {
    fn file(&mut self) -> ContentResult<&mut File> {
        match (&self.guard, self.file.as_mut()) {
            (Some(_), Some(file)) => Ok(file),
            _ => Err(ContentError::WriterClosed(self.status.reference.clone())),
        }
    }

    async fn discard(&mut self) -> ContentResult<()> {
        self.file = None;
        self.guard = None;
        match fs::remove_dir_all(&self.dir).await {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl ContentWriter for LocalWriter {
    async fn write(&mut self, buf: &[u8]) -> ContentResult<usize> {
        self.file()?.write_all(buf).await?;
        self.digester.update(buf);
        self.status.offset += buf.len() as u64;
        self.status.updated_at = Utc::now();
        Ok(buf.len())
    }

    fn digest(&self) -> Digest {
        self.digester.digest()
    }

    fn status(&self) -> WriteStatus {
        self.status.clone()
    }

    async fn commit(&mut self, size: Option<u64>, expected: Option<&Digest>) -> ContentResult<()> {
        let file = self.file()?;
        file.flush().await?;
        file.sync_all().await?;

        let actual_size = self.status.offset;
        let on_disk = fs::metadata(self.dir.join(DATA_FILE)).await?.len();
        if on_disk != actual_size {
            warn!(
                reference = %self.status.reference,
                written = actual_size,
                on_disk,
                "ingest data changed outside this writer"
            );
            self.discard().await?;
            return Err(ContentError::SizeMismatch {
                expected: actual_size,
                actual: on_disk,
            });
        }
        if let Some(size) = size {
            if size != actual_size {
                self.discard().await?;
                return Err(ContentError::SizeMismatch {
                    expected: size,
                    actual: actual_size,
                });
            }
        }
        let actual = self.digester.digest();
        if let Some(expected) = expected {
            if *expected != actual {
                self.discard().await?;
                return Err(ContentError::DigestMismatch {
                    expected: expected.clone(),
                    actual,
                });
            }
        }

        self.file = None;
        let target_dir = self.blobs_root.join(actual.algorithm().as_str());
        fs::create_dir_all(&target_dir).await?;
        let target = target_dir.join(actual.encoded());
        if fs::try_exists(&target).await? {
            debug!(digest = %actual, "blob already present; dropping duplicate ingest");
        } else {
            fs::rename(self.dir.join(DATA_FILE), &target).await?;
        }
        fs::remove_dir_all(&self.dir).await?;
        debug!(reference = %self.status.reference, digest = %actual, size = actual_size, "committed blob");
        self.guard = None;
        Ok(())
    }

    async fn close(&mut self) -> ContentResult<()> {
        if let Some(mut file) = self.file.take() {
            file.flush().await?;
        }
        self.guard = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::helpers::write_blob;

    async fn store() -> (tempfile::TempDir, LocalStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path()).await.unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn commit_publishes_under_digest_path() {
        let (dir, store) = store().await;
        let data = b"layer bytes";
        let digest = Digest::from_bytes(data);
        let mut w = store.writer("layer", Some(11), Some(&digest)).await.unwrap();
        w.write(data).await.unwrap();
        w.commit(Some(11), Some(&digest)).await.unwrap();

        let path = dir.path().join("blobs/sha256").join(digest.encoded());
        assert_eq!(std::fs::read(path).unwrap(), data);
        assert_eq!(store.read_blob(&digest).await.unwrap(), data);
        assert!(store.list_statuses().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn mismatched_digest_publishes_nothing() {
        let (_dir, store) = store().await;
        let declared = Digest::from_bytes(b"declared");
        let mut w = store.writer("bad", None, None).await.unwrap();
        w.write(b"served").await.unwrap();
        assert!(w.commit(Some(6), Some(&declared)).await.unwrap_err().is_integrity());

        assert!(store.list().await.unwrap().is_empty());
        assert!(store.status("bad").await.unwrap_err().is_not_found());
        assert!(store.reader(&declared).await.err().unwrap().is_not_found());
    }

    #[tokio::test]
    async fn ingest_survives_reopen_and_resumes() {
        let (dir, store) = store().await;
        let mut w = store.writer("resumable", Some(6), None).await.unwrap();
        w.write(b"abc").await.unwrap();
        w.close().await.unwrap();
        drop(store);

        let store = LocalStore::open(dir.path()).await.unwrap();
        let status = store.status("resumable").await.unwrap();
        assert_eq!(status.reference, "resumable");
        assert_eq!(status.offset, 3);
        assert_eq!(status.expected_total, Some(6));

        let mut w = store.writer("resumable", None, None).await.unwrap();
        w.write(b"def").await.unwrap();
        let digest = Digest::from_bytes(b"abcdef");
        assert_eq!(w.digest(), digest);
        w.commit(Some(6), Some(&digest)).await.unwrap();
        assert_eq!(store.read_blob(&digest).await.unwrap(), b"abcdef");
    }

    #[tokio::test]
    async fn concurrent_ref_is_locked() {
        let (_dir, store) = store().await;
        let _w = store.writer("busy", None, None).await.unwrap();
        assert!(store.writer("busy", None, None).await.err().unwrap().is_locked());
        assert!(store.abort("busy").await.unwrap_err().is_locked());
    }

    #[tokio::test]
    async fn ref_lock_holds_across_store_handles() {
        let (dir, a) = store().await;
        let b = LocalStore::open(dir.path()).await.unwrap();

        let mut wa = a.writer("job", None, None).await.unwrap();
        assert!(b.writer("job", None, None).await.err().unwrap().is_locked());
        assert!(b.abort("job").await.unwrap_err().is_locked());

        wa.write(b"AAAA").await.unwrap();
        let digest = Digest::from_bytes(b"AAAA");
        wa.commit(Some(4), Some(&digest)).await.unwrap();
        assert_eq!(b.read_blob(&digest).await.unwrap(), b"AAAA");

        // released by the commit
        let mut wb = b.writer("job", None, None).await.unwrap();
        wb.close().await.unwrap();
    }

    #[tokio::test]
    async fn commit_rejects_data_file_changed_underneath() {
        let (dir, store) = store().await;
        let mut w = store.writer("job", None, None).await.unwrap();
        w.write(b"AAAA").await.unwrap();

        let data = dir
            .path()
            .join("ingest")
            .join(Digest::from_bytes(b"job").encoded())
            .join("data");
        {
            use std::io::Write;
            let mut f = std::fs::OpenOptions::new().append(true).open(&data).unwrap();
            f.write_all(b"BBBB").unwrap();
        }

        let digest = Digest::from_bytes(b"AAAA");
        let err = w.commit(Some(4), Some(&digest)).await.unwrap_err();
        assert!(err.is_integrity());
        assert!(store.reader(&digest).await.err().unwrap().is_not_found());
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn duplicate_commit_keeps_single_blob() {
        let (_dir, store) = store().await;
        let digest = Digest::from_bytes(b"dup");
        for reference in ["one", "two"] {
            let mut w = store.writer(reference, None, None).await.unwrap();
            w.write(b"dup").await.unwrap();
            w.commit(Some(3), Some(&digest)).await.unwrap();
        }
        let infos = store.list().await.unwrap();
        assert_eq!(infos.len(), 1);
        assert_eq!(infos[0].digest, digest);
        assert!(store
            .writer("three", Some(3), Some(&digest))
            .await
            .err()
            .unwrap()
            .is_already_exists());
    }

    #[tokio::test]
    async fn delete_and_abort() {
        let (_dir, store) = store().await;
        let digest = Digest::from_bytes(b"to delete");
        write_blob(&store, "del", &b"to delete"[..], 9, &digest).await.unwrap();
        store.delete(&digest).await.unwrap();
        assert!(store.delete(&digest).await.unwrap_err().is_not_found());

        let mut w = store.writer("partial", None, None).await.unwrap();
        w.write(b"xx").await.unwrap();
        w.close().await.unwrap();
        store.abort("partial").await.unwrap();
        assert!(store.abort("partial").await.unwrap_err().is_not_found());
    }
}
