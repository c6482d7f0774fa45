use tracing::info;

use cask_images::{Completeness, Layer};
use cask_types::{Descriptor, Digest, Image};

use crate::client::Client;
use crate::error::{ClientError, ClientResult};

/// An image bound in the client's image index.
///
/// All queries read from the client's content store; nothing is fetched.
#[derive(Clone)]
pub struct ImageHandle {
    client: Client,
    image: Image,
}

impl ImageHandle {
    pub(crate) fn new(client: Client, image: Image) -> Self {
        Self { client, image }
    }

    pub fn name(&self) -> &str {
        &self.image.name
    }

    pub fn target(&self) -> &Descriptor {
        &self.image.target
    }

    pub fn image(&self) -> &Image {
        &self.image
    }

    /// Descriptor of the image config.
    pub async fn config(&self) -> ClientResult<Descriptor> {
        Ok(cask_images::config(self.client.content().as_ref(), self.target()).await?)
    }

    /// Ordered diff-IDs of the image.
    pub async fn rootfs(&self) -> ClientResult<Vec<Digest>> {
        let config = self.config().await?;
        Ok(cask_images::rootfs(self.client.content().as_ref(), &config).await?)
    }

    /// Stored size of manifest, config, and layers.
    pub async fn size(&self) -> ClientResult<u64> {
        Ok(cask_images::size(self.client.content().as_ref(), self.target()).await?)
    }

    pub async fn layers(&self) -> ClientResult<Vec<Layer>> {
        Ok(cask_images::get_layers(self.client.content().as_ref(), self.target()).await?)
    }

    /// Which blobs of the image are missing from the content store.
    pub async fn check(&self) -> ClientResult<Completeness> {
        Ok(cask_images::check(self.client.content().as_ref(), self.target()).await?)
    }

    /// Hand the image's layers to the client's unpacker.
    pub async fn unpack(&self) -> ClientResult<()> {
        let unpacker = self.client.unpacker().ok_or(ClientError::NoUnpacker)?;
        let layers = self.layers().await?;
        unpacker
            .unpack(&self.image, &layers)
            .await
            .map_err(|source| ClientError::Unpack {
                name: self.image.name.clone(),
                source,
            })?;
        info!(name = %self.image.name, layers = layers.len(), "unpacked");
        Ok(())
    }
}

impl std::fmt::Debug for ImageHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageHandle")
            .field("name", &self.image.name)
            .field("target", &self.image.target.digest)
            .finish()
    }
}
