//! Error types for image graph operations.

use cask_content::ContentError;
use cask_types::Digest;

/// Boxed error raised by a remote collaborator or a caller-supplied handler.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur while walking or interpreting an image graph.
#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    /// Content store failure (missing blob, integrity error, lock, I/O).
    #[error(transparent)]
    Content(#[from] ContentError),

    /// The descriptor's media type cannot be used for this operation.
    #[error("unsupported media type {media_type:?} for {operation}")]
    Unsupported {
        media_type: String,
        operation: &'static str,
    },

    /// Image config and manifest disagree on the number of layers.
    #[error("mismatched image rootfs and manifest layers: {diff_ids} diff ids, {layers} layers")]
    LayerCountMismatch { diff_ids: usize, layers: usize },

    /// A manifest, index, or config blob is not valid JSON for its type.
    #[error("failed to parse {digest}: {reason}")]
    Parse { digest: Digest, reason: String },

    /// No image is bound to this name.
    #[error("image {0:?} not found")]
    ImageNotFound(String),

    /// Image names must be non-empty.
    #[error("invalid image name {0:?}")]
    InvalidName(String),

    /// Error from a fetcher, pusher, or caller-supplied handler, unchanged.
    #[error("remote: {0}")]
    Remote(#[source] BoxError),

    /// A dispatch or blocking index task panicked or was cancelled.
    #[error("dispatch task failed: {0}")]
    Task(String),

    /// Image index could not be encoded/decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error from the file-backed image index.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ImageError {
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::ImageNotFound(_) => true,
            Self::Content(e) => e.is_not_found(),
            _ => false,
        }
    }

    /// Digest/size mismatch or config/manifest disagreement.
    pub fn is_integrity(&self) -> bool {
        match self {
            Self::LayerCountMismatch { .. } => true,
            Self::Content(e) => e.is_integrity(),
            _ => false,
        }
    }
}

/// Convenience alias for image results.
pub type ImageResult<T> = Result<T, ImageError>;
