use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::debug;

use cask_types::Digest;

use crate::error::{ContentError, ContentResult};
use crate::traits::{ContentStore, ContentWriter};

/// Upper bound on a single chunk moved by [`copy`].
pub const COPY_CHUNK_SIZE: usize = 1 << 20;

/// Stream `source` into `writer` and commit it as `size` bytes hashing to
/// `expected`.
///
/// If the writer resumes an earlier ingest, the first `offset` bytes of the
/// source are skipped. At most one byte past `size` is read, which is enough
/// for the commit to reject an oversized source. A read error closes the
/// writer, keeping the partial ingest for a later resume; a size or digest
/// mismatch discards it.
pub async fn copy<R>(
    writer: &mut dyn ContentWriter,
    mut source: R,
    size: u64,
    expected: &Digest,
) -> ContentResult<()>
where
    R: AsyncRead + Unpin + Send,
{
    let offset = writer.status().offset;
    if offset > size {
        // The ingest already holds more than the declared size.
        return writer.commit(Some(size), Some(expected)).await;
    }
    if offset > 0 {
        let skipped = match tokio::io::copy(&mut (&mut source).take(offset), &mut tokio::io::sink()).await {
            Ok(n) => n,
            Err(e) => {
                writer.close().await?;
                return Err(e.into());
            }
        };
        if skipped != offset {
            writer.close().await?;
            return Err(ContentError::ShortRead {
                expected: offset,
                actual: skipped,
            });
        }
        debug!(offset, digest = %expected, "skipped already-ingested prefix");
    }

    let remaining = size - offset;
    let mut limited = source.take(remaining + 1);
    let chunk = usize::try_from(remaining + 1).map_or(COPY_CHUNK_SIZE, |r| r.min(COPY_CHUNK_SIZE));
    let mut buf = vec![0u8; chunk.max(1)];
    loop {
        let n = match limited.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                writer.close().await?;
                return Err(e.into());
            }
        };
        writer.write(&buf[..n]).await?;
    }

    writer.commit(Some(size), Some(expected)).await
}

/// Ingest `source` under `reference`, verifying it against `size`/`expected`.
///
/// A blob that is already committed under `expected` is accepted as-is
/// without reading the source.
pub async fn write_blob<S, R>(
    store: &S,
    reference: &str,
    source: R,
    size: u64,
    expected: &Digest,
) -> ContentResult<()>
where
    S: ContentStore + ?Sized,
    R: AsyncRead + Unpin + Send,
{
    let mut writer = match store.writer(reference, Some(size), Some(expected)).await {
        Ok(writer) => writer,
        Err(ContentError::AlreadyExists(_)) => return Ok(()),
        Err(e) => return Err(e),
    };
    let copied = copy(writer.as_mut(), source, size, expected).await;
    let closed = writer.close().await;
    copied.and(closed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::traits::Provider;

    #[tokio::test]
    async fn copy_commits_verified_bytes() {
        let store = MemoryStore::new();
        let data = vec![7u8; 3 * COPY_CHUNK_SIZE + 17];
        let digest = Digest::from_bytes(&data);
        let mut w = store.writer("big", None, None).await.unwrap();
        copy(w.as_mut(), &data[..], data.len() as u64, &digest).await.unwrap();
        assert_eq!(store.read_blob(&digest).await.unwrap(), data);
    }

    #[tokio::test]
    async fn copy_rejects_short_and_long_sources() {
        let store = MemoryStore::new();
        let digest = Digest::from_bytes(b"exact");

        let mut w = store.writer("short", None, None).await.unwrap();
        let err = copy(w.as_mut(), &b"exa"[..], 5, &digest).await.unwrap_err();
        assert!(matches!(err, ContentError::SizeMismatch { expected: 5, actual: 3 }));

        let mut w = store.writer("long", None, None).await.unwrap();
        let err = copy(w.as_mut(), &b"exact and more"[..], 5, &digest).await.unwrap_err();
        assert!(matches!(err, ContentError::SizeMismatch { expected: 5, actual: 6 }));

        assert!(store.is_empty());
        assert!(store.list_statuses().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn copy_rejects_tampered_source() {
        let store = MemoryStore::new();
        let digest = Digest::from_bytes(b"genuine");
        let mut w = store.writer("tampered", None, None).await.unwrap();
        let err = copy(w.as_mut(), &b"forged!"[..], 7, &digest).await.unwrap_err();
        assert!(err.is_integrity());
        assert!(!store.exists(&digest).await.unwrap());
    }

    #[tokio::test]
    async fn copy_resumes_after_partial_ingest() {
        let store = MemoryStore::new();
        let data = b"resumable payload";
        let digest = Digest::from_bytes(data);

        let mut w = store.writer("partial", None, None).await.unwrap();
        w.write(&data[..8]).await.unwrap();
        w.close().await.unwrap();

        // The full source is replayed; the first 8 bytes are skipped.
        let mut w = store.writer("partial", None, None).await.unwrap();
        copy(w.as_mut(), &data[..], data.len() as u64, &digest).await.unwrap();
        assert_eq!(store.read_blob(&digest).await.unwrap(), data);
    }

    #[tokio::test]
    async fn write_blob_skips_existing_content() {
        let store = MemoryStore::new();
        let digest = Digest::from_bytes(b"cached");
        write_blob(&store, "first", &b"cached"[..], 6, &digest).await.unwrap();
        // The source is never read on the fast path, so garbage is fine here.
        write_blob(&store, "second", &b"garbage"[..], 6, &digest).await.unwrap();
        assert_eq!(store.len(), 1);
        assert!(store.list_statuses().await.unwrap().is_empty());
    }
}
