use std::collections::HashMap;
use std::io::Cursor;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tracing::debug;

use cask_types::{Algorithm, Digest, Digester};

use crate::error::{ContentError, ContentResult};
use crate::locks::{RefGuard, RefLocks};
use crate::traits::{BlobReader, ContentStore, ContentWriter, Provider};
use crate::types::{Info, WriteStatus};

#[derive(Clone, Debug)]
struct StoredBlob {
    data: Bytes,
    committed_at: DateTime<Utc>,
}

#[derive(Debug)]
struct Ingest {
    data: Vec<u8>,
    status: WriteStatus,
}

type Blobs = Arc<RwLock<HashMap<Digest, StoredBlob>>>;
type Ingests = Arc<RwLock<HashMap<String, Ingest>>>;

/// In-memory content store.
///
/// Intended for tests and embedding. Committed blobs and in-flight ingests
/// live in maps behind `RwLock`s; blob bytes are shared, not copied, on read.
#[derive(Clone, Default)]
pub struct MemoryStore {
    blobs: Blobs,
    ingests: Ingests,
    locks: RefLocks,
}

impl MemoryStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of committed blobs.
    pub fn len(&self) -> usize {
        self.blobs.read().expect("lock poisoned").len()
    }

    /// Returns `true` if no blob is committed.
    pub fn is_empty(&self) -> bool {
        self.blobs.read().expect("lock poisoned").is_empty()
    }

    /// Total bytes across all committed blobs.
    pub fn total_bytes(&self) -> u64 {
        self.blobs
            .read()
            .expect("lock poisoned")
            .values()
            .map(|b| b.data.len() as u64)
            .sum()
    }

    fn get(&self, digest: &Digest) -> ContentResult<StoredBlob> {
        self.blobs
            .read()
            .expect("lock poisoned")
            .get(digest)
            .cloned()
            .ok_or_else(|| ContentError::NotFound(digest.clone()))
    }
}

#[async_trait]
impl Provider for MemoryStore {
    async fn reader(&self, digest: &Digest) -> ContentResult<Box<dyn BlobReader>> {
        let blob = self.get(digest)?;
        Ok(Box::new(Cursor::new(blob.data)))
    }

    async fn info(&self, digest: &Digest) -> ContentResult<Info> {
        let blob = self.get(digest)?;
        Ok(Info {
            digest: digest.clone(),
            size: blob.data.len() as u64,
            committed_at: blob.committed_at,
        })
    }
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn writer(
        &self,
        reference: &str,
        expected_size: Option<u64>,
        expected: Option<&Digest>,
    ) -> ContentResult<Box<dyn ContentWriter>> {
        let guard = self.locks.acquire(reference)?;

        if let Some(digest) = expected {
            if let Ok(blob) = self.get(digest) {
                if expected_size.map_or(true, |s| s == blob.data.len() as u64) {
                    return Err(ContentError::AlreadyExists(digest.clone()));
                }
            }
        }

        let algorithm = expected.map_or(Algorithm::CANONICAL, |d| d.algorithm());
        let mut digester = algorithm.digester();
        let mut ingests = self.ingests.write().expect("lock poisoned");
        let ingest = ingests
            .entry(reference.to_string())
            .or_insert_with(|| Ingest {
                data: Vec::new(),
                status: WriteStatus::new(reference, expected_size, expected.cloned()),
            });
        ingest.status.merge_hints(expected_size, expected);
        if !ingest.data.is_empty() {
            debug!(reference, offset = ingest.data.len(), "resuming in-memory ingest");
            digester.update(&ingest.data);
        }

        Ok(Box::new(MemoryWriter {
            blobs: Arc::clone(&self.blobs),
            ingests: Arc::clone(&self.ingests),
            status: ingest.status.clone(),
            digester,
            guard: Some(guard),
        }))
    }

    async fn status(&self, reference: &str) -> ContentResult<WriteStatus> {
        self.ingests
            .read()
            .expect("lock poisoned")
            .get(reference)
            .map(|i| i.status.clone())
            .ok_or_else(|| ContentError::IngestNotFound(reference.to_string()))
    }

    async fn list_statuses(&self) -> ContentResult<Vec<WriteStatus>> {
        let ingests = self.ingests.read().expect("lock poisoned");
        let mut statuses: Vec<WriteStatus> = ingests.values().map(|i| i.status.clone()).collect();
        statuses.sort_by(|a, b| a.reference.cmp(&b.reference));
        Ok(statuses)
    }

    async fn abort(&self, reference: &str) -> ContentResult<()> {
        if self.locks.is_locked(reference) {
            return Err(ContentError::Locked(reference.to_string()));
        }
        self.ingests
            .write()
            .expect("lock poisoned")
            .remove(reference)
            .map(|_| ())
            .ok_or_else(|| ContentError::IngestNotFound(reference.to_string()))
    }

    async fn list(&self) -> ContentResult<Vec<Info>> {
        let blobs = self.blobs.read().expect("lock poisoned");
        let mut infos: Vec<Info> = blobs
            .iter()
            .map(|(digest, blob)| Info {
                digest: digest.clone(),
                size: blob.data.len() as u64,
                committed_at: blob.committed_at,
            })
            .collect();
        infos.sort_by(|a, b| a.digest.cmp(&b.digest));
        Ok(infos)
    }

    async fn delete(&self, digest: &Digest) -> ContentResult<()> {
        self.blobs
            .write()
            .expect("lock poisoned")
            .remove(digest)
            .map(|_| ())
            .ok_or_else(|| ContentError::NotFound(digest.clone()))
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("blob_count", &self.len())
            .finish()
    }
}

/// Writer over a [`MemoryStore`] ingest.
struct MemoryWriter {
    blobs: Blobs,
    ingests: Ingests,
    status: WriteStatus,
    digester: Digester,
    /// `None` once committed or closed.
    guard: Option<RefGuard>,
}

impl MemoryWriter {
    fn ensure_open(&self) -> ContentResult<()> {
        if self.guard.is_none() {
            return Err(ContentError::WriterClosed(self.status.reference.clone()));
        }
        Ok(())
    }

    fn discard(&mut self) {
        self.ingests
            .write()
            .expect("lock poisoned")
            .remove(&self.status.reference);
        self.guard = None;
    }
}

#[async_trait]
impl ContentWriter for MemoryWriter {
    async fn write(&mut self, buf: &[u8]) -> ContentResult<usize> {
        self.ensure_open()?;
        let mut ingests = self.ingests.write().expect("lock poisoned");
        let ingest = ingests
            .get_mut(&self.status.reference)
            .ok_or_else(|| ContentError::IngestNotFound(self.status.reference.clone()))?;
        ingest.data.extend_from_slice(buf);
        ingest.status.offset = ingest.data.len() as u64;
        ingest.status.updated_at = Utc::now();
        self.status = ingest.status.clone();
        self.digester.update(buf);
        Ok(buf.len())
    }

    fn digest(&self) -> Digest {
        self.digester.digest()
    }

    fn status(&self) -> WriteStatus {
        self.status.clone()
    }

    async fn commit(&mut self, size: Option<u64>, expected: Option<&Digest>) -> ContentResult<()> {
        self.ensure_open()?;
        let actual_size = self.status.offset;
        if let Some(size) = size {
            if size != actual_size {
                self.discard();
                return Err(ContentError::SizeMismatch {
                    expected: size,
                    actual: actual_size,
                });
            }
        }
        let actual = self.digester.digest();
        if let Some(expected) = expected {
            if *expected != actual {
                self.discard();
                return Err(ContentError::DigestMismatch {
                    expected: expected.clone(),
                    actual,
                });
            }
        }

        let ingest = self
            .ingests
            .write()
            .expect("lock poisoned")
            .remove(&self.status.reference)
            .ok_or_else(|| ContentError::IngestNotFound(self.status.reference.clone()))?;
        self.blobs
            .write()
            .expect("lock poisoned")
            .entry(actual.clone())
            .or_insert_with(|| StoredBlob {
                data: Bytes::from(ingest.data),
                committed_at: Utc::now(),
            });
        debug!(reference = %self.status.reference, digest = %actual, size = actual_size, "committed blob");
        self.guard = None;
        Ok(())
    }

    async fn close(&mut self) -> ContentResult<()> {
        self.guard = None;
        Ok(())
    }
}
