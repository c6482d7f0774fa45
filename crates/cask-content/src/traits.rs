use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek};

use cask_types::Digest;

use crate::error::{ContentError, ContentResult};
use crate::types::{Info, WriteStatus};

/// Random-access reader over a committed blob.
pub trait BlobReader: AsyncRead + AsyncSeek + Send + Unpin {}

impl<T: AsyncRead + AsyncSeek + Send + Unpin> BlobReader for T {}

/// Read side of a content store.
///
/// Committed blobs are immutable, so any number of readers may run
/// concurrently with each other and with ingests.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Open a reader over the blob stored under `digest`.
    ///
    /// Returns [`ContentError::NotFound`] if no such blob is committed.
    async fn reader(&self, digest: &Digest) -> ContentResult<Box<dyn BlobReader>>;

    /// Metadata of a committed blob.
    async fn info(&self, digest: &Digest) -> ContentResult<Info>;

    /// Read a whole blob into memory.
    async fn read_blob(&self, digest: &Digest) -> ContentResult<Vec<u8>> {
        let mut reader = self.reader(digest).await?;
        let mut data = Vec::new();
        reader.read_to_end(&mut data).await?;
        Ok(data)
    }

    /// Whether a blob is committed under `digest`.
    async fn exists(&self, digest: &Digest) -> ContentResult<bool> {
        match self.info(digest).await {
            Ok(_) => Ok(true),
            Err(ContentError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// Durable, content-addressed blob storage with resumable ingests.
///
/// All implementations must satisfy these invariants:
/// - A blob is only visible under a digest its bytes hash to.
/// - Publication is atomic: a failed or cancelled ingest never exposes a
///   partial blob.
/// - At most one writer is open per ingest ref; a second open fails with
///   [`ContentError::Locked`] rather than waiting.
#[async_trait]
pub trait ContentStore: Provider {
    /// Open, or resume, the ingest named `reference`.
    ///
    /// `expected_size` and `expected` are hints. When `expected` names a blob
    /// that is already committed (with the same size, if given), this returns
    /// [`ContentError::AlreadyExists`] without opening a writer; callers treat
    /// that as success.
    async fn writer(
        &self,
        reference: &str,
        expected_size: Option<u64>,
        expected: Option<&Digest>,
    ) -> ContentResult<Box<dyn ContentWriter>>;

    /// Status of the ingest named `reference`.
    async fn status(&self, reference: &str) -> ContentResult<WriteStatus>;

    /// All in-flight ingests, sorted by ref.
    async fn list_statuses(&self) -> ContentResult<Vec<WriteStatus>>;

    /// Discard an ingest that has no open writer.
    async fn abort(&self, reference: &str) -> ContentResult<()>;

    /// Metadata for every committed blob, sorted by digest.
    async fn list(&self) -> ContentResult<Vec<Info>>;

    /// Remove a committed blob.
    ///
    /// Images pointing at the blob are not checked; keeping the graph
    /// consistent is the caller's job.
    async fn delete(&self, digest: &Digest) -> ContentResult<()>;
}

/// Handle on an open ingest.
#[async_trait]
pub trait ContentWriter: Send {
    /// Append `buf` at the current offset.
    async fn write(&mut self, buf: &[u8]) -> ContentResult<usize>;

    /// Digest of all bytes ingested so far, including any resumed prefix.
    fn digest(&self) -> Digest;

    /// Current progress of the ingest.
    fn status(&self) -> WriteStatus;

    /// Verify and publish the ingested bytes.
    ///
    /// On a size or digest mismatch the ingest is discarded and nothing is
    /// published. On success the write status is removed. Committing bytes
    /// whose digest is already stored succeeds without a second copy.
    async fn commit(&mut self, size: Option<u64>, expected: Option<&Digest>) -> ContentResult<()>;

    /// Release the ingest ref without committing. Safe to call repeatedly and
    /// after [`commit`](Self::commit).
    async fn close(&mut self) -> ContentResult<()>;
}
