use thiserror::Error;

use cask_content::ContentError;
use cask_images::ImageError;

/// Errors raised by resolvers, fetchers, and pushers.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// The reference does not name anything on the remote.
    #[error("reference {0:?} not found")]
    NotFound(String),

    /// The remote could not be reached or answered with a failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// The reference cannot be pushed to or fetched from this remote.
    #[error("unsupported reference {0:?}")]
    Unsupported(String),

    /// Content error on either side of the transfer.
    ///
    /// [`ContentError::AlreadyExists`] from a pusher means the remote already
    /// has the blob.
    #[error(transparent)]
    Content(#[from] ContentError),
}

impl RemoteError {
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound(_) => true,
            Self::Content(e) => e.is_not_found(),
            _ => false,
        }
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::Content(e) if e.is_already_exists())
    }
}

impl From<RemoteError> for ImageError {
    fn from(e: RemoteError) -> Self {
        match e {
            RemoteError::Content(inner) => ImageError::Content(inner),
            other => ImageError::Remote(Box::new(other)),
        }
    }
}

pub type RemoteResult<T> = Result<T, RemoteError>;
