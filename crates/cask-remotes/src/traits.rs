use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::AsyncRead;

use cask_content::ContentWriter;
use cask_types::Descriptor;

use crate::error::RemoteResult;

/// Byte stream of one remote blob.
pub type BlobStream = Box<dyn AsyncRead + Send + Unpin>;

/// Turns references into root descriptors and transfer endpoints.
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Resolve `reference` to a canonical name and the root descriptor.
    async fn resolve(&self, reference: &str) -> RemoteResult<(String, Descriptor)>;

    /// Fetcher for blobs under the resolved `name`.
    async fn fetcher(&self, name: &str) -> RemoteResult<Arc<dyn Fetcher>>;

    /// Pusher that uploads blobs for `reference`.
    async fn pusher(&self, reference: &str) -> RemoteResult<Arc<dyn Pusher>>;
}

/// Download side of a remote.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Stream the bytes of `desc` from the remote.
    async fn fetch(&self, desc: &Descriptor) -> RemoteResult<BlobStream>;
}

/// Upload side of a remote.
#[async_trait]
pub trait Pusher: Send + Sync {
    /// Open a writer that uploads `desc`.
    ///
    /// Returns [`ContentError::AlreadyExists`](cask_content::ContentError::AlreadyExists)
    /// (wrapped in [`RemoteError::Content`](crate::RemoteError::Content))
    /// when the remote already has the blob. The writer's commit is where the
    /// remote verifies size and digest.
    async fn push(&self, desc: &Descriptor) -> RemoteResult<Box<dyn ContentWriter>>;
}
