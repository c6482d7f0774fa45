//! A remote backed by a content store and an image index.
//!
//! [`StoreRegistry`] lets two local stores act as client and registry for each
//! other. Blobs pushed into it are verified by the content store's commit, and
//! every manifest or index it accepts for a reference re-tags that
//! reference. A push uploads its root manifest last, so the tag ends up on
//! the root.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use cask_content::{ContentError, ContentResult, ContentStore, ContentWriter, Provider, WriteStatus};
use cask_images::{run_blocking, ImageStore};
use cask_types::{media_types, Descriptor, Digest, Image};

use crate::error::{RemoteError, RemoteResult};
use crate::traits::{BlobStream, Fetcher, Pusher, Resolver};

/// Resolver, fetcher, and pusher over a local content store and image index.
#[derive(Clone)]
pub struct StoreRegistry {
    content: Arc<dyn ContentStore>,
    images: Arc<dyn ImageStore>,
}

impl StoreRegistry {
    pub fn new(content: Arc<dyn ContentStore>, images: Arc<dyn ImageStore>) -> Self {
        Self { content, images }
    }

    pub fn content(&self) -> &Arc<dyn ContentStore> {
        &self.content
    }

    pub fn images(&self) -> &Arc<dyn ImageStore> {
        &self.images
    }

    async fn tag(&self, reference: &str, desc: &Descriptor) -> RemoteResult<()> {
        let image = Image::new(reference, desc.clone());
        run_blocking(&self.images, move |images| images.put(&image))
            .await
            .map_err(|e| RemoteError::Transport(format!("tagging {reference}: {e}")))?;
        debug!(reference, digest = %desc.digest, "tagged");
        Ok(())
    }
}

#[async_trait]
impl Resolver for StoreRegistry {
    async fn resolve(&self, reference: &str) -> RemoteResult<(String, Descriptor)> {
        let name = reference.to_string();
        match run_blocking(&self.images, move |images| images.get(&name)).await {
            Ok(image) => Ok((image.name, image.target)),
            Err(e) if e.is_not_found() => Err(RemoteError::NotFound(reference.to_string())),
            Err(e) => Err(RemoteError::Transport(e.to_string())),
        }
    }

    async fn fetcher(&self, _name: &str) -> RemoteResult<Arc<dyn Fetcher>> {
        Ok(Arc::new(self.clone()))
    }

    async fn pusher(&self, reference: &str) -> RemoteResult<Arc<dyn Pusher>> {
        if reference.trim().is_empty() {
            return Err(RemoteError::Unsupported(reference.to_string()));
        }
        Ok(Arc::new(RegistryPusher {
            registry: self.clone(),
            reference: reference.to_string(),
        }))
    }
}

#[async_trait]
impl Fetcher for StoreRegistry {
    async fn fetch(&self, desc: &Descriptor) -> RemoteResult<BlobStream> {
        let reader = self.content.reader(&desc.digest).await?;
        Ok(Box::new(reader))
    }
}

struct RegistryPusher {
    registry: StoreRegistry,
    reference: String,
}

#[async_trait]
impl Pusher for RegistryPusher {
    async fn push(&self, desc: &Descriptor) -> RemoteResult<Box<dyn ContentWriter>> {
        let ingest = format!("{}@{}", self.reference, desc.digest);
        let manifest_like = media_types::is_manifest_like(&desc.media_type);
        match self
            .registry
            .content
            .writer(&ingest, Some(desc.size), Some(&desc.digest))
            .await
        {
            Ok(inner) if manifest_like => Ok(Box::new(TaggingWriter {
                inner,
                registry: self.registry.clone(),
                reference: self.reference.clone(),
                desc: desc.clone(),
            })),
            Ok(inner) => Ok(inner),
            Err(ContentError::AlreadyExists(digest)) => {
                if manifest_like {
                    self.registry.tag(&self.reference, desc).await?;
                }
                Err(ContentError::AlreadyExists(digest).into())
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Tags the pushed reference once the wrapped manifest write commits.
struct TaggingWriter {
    inner: Box<dyn ContentWriter>,
    registry: StoreRegistry,
    reference: String,
    desc: Descriptor,
}

#[async_trait]
impl ContentWriter for TaggingWriter {
    async fn write(&mut self, buf: &[u8]) -> ContentResult<usize> {
        self.inner.write(buf).await
    }

    fn digest(&self) -> Digest {
        self.inner.digest()
    }

    fn status(&self) -> WriteStatus {
        self.inner.status()
    }

    async fn commit(&mut self, size: Option<u64>, expected: Option<&Digest>) -> ContentResult<()> {
        self.inner.commit(size, expected).await?;
        self.registry
            .tag(&self.reference, &self.desc)
            .await
            .map_err(|e| ContentError::Serialization(e.to_string()))?;
        info!(reference = %self.reference, digest = %self.desc.digest, "manifest accepted");
        Ok(())
    }

    async fn close(&mut self) -> ContentResult<()> {
        self.inner.close().await
    }
}
