use cask_types::Digest;

/// Errors from content store operations.
#[derive(Debug, thiserror::Error)]
pub enum ContentError {
    /// No committed blob under this digest.
    #[error("content {0} not found")]
    NotFound(Digest),

    /// No in-flight ingest under this ref.
    #[error("ingest ref {0:?} not found")]
    IngestNotFound(String),

    /// The blob is already committed; the ingest was short-circuited.
    #[error("content {0} already exists")]
    AlreadyExists(Digest),

    /// Another writer holds this ingest ref.
    #[error("ingest ref {0:?} is locked by an in-progress write")]
    Locked(String),

    /// Computed digest differs from the declared one.
    #[error("unexpected commit digest {actual}, expected {expected}")]
    DigestMismatch { expected: Digest, actual: Digest },

    /// Ingested byte count differs from the declared size.
    #[error("unexpected commit size {actual}, expected {expected}")]
    SizeMismatch { expected: u64, actual: u64 },

    /// The source ended before the resume offset could be skipped.
    #[error("short read while resuming: expected to skip {expected} bytes, got {actual}")]
    ShortRead { expected: u64, actual: u64 },

    /// Write or commit on a writer that was already committed or closed.
    #[error("writer for ref {0:?} is closed")]
    WriterClosed(String),

    /// Status or metadata could not be encoded/decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ContentError {
    /// Missing blob or missing ingest.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::IngestNotFound(_))
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists(_))
    }

    pub fn is_locked(&self) -> bool {
        matches!(self, Self::Locked(_))
    }

    /// Digest or size verification failed; never retried or auto-corrected.
    pub fn is_integrity(&self) -> bool {
        matches!(self, Self::DigestMismatch { .. } | Self::SizeMismatch { .. })
    }
}

/// Result alias for content operations.
pub type ContentResult<T> = Result<T, ContentError>;
