use thiserror::Error;

use cask_content::ContentError;
use cask_images::{BoxError, ImageError};
use cask_remotes::RemoteError;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("no resolver configured for remote operations")]
    NoResolver,

    #[error("unpack requested but no unpacker is configured")]
    NoUnpacker,

    #[error("unpack failed for {name}: {source}")]
    Unpack {
        name: String,
        #[source]
        source: BoxError,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Content(#[from] ContentError),

    #[error(transparent)]
    Image(#[from] ImageError),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Content(e) => e.is_not_found(),
            Self::Image(e) => e.is_not_found(),
            Self::Remote(e) => e.is_not_found(),
            _ => false,
        }
    }

    /// Digest, size, or layer-count verification failed somewhere below.
    pub fn is_integrity(&self) -> bool {
        match self {
            Self::Content(e) => e.is_integrity(),
            Self::Image(e) => e.is_integrity(),
            Self::Remote(RemoteError::Content(e)) => e.is_integrity(),
            _ => false,
        }
    }
}

pub type ClientResult<T> = Result<T, ClientError>;
