use async_trait::async_trait;

use cask_images::{BoxError, Layer};
use cask_types::Image;

/// Materializes an image's layers, e.g. into a snapshotter.
///
/// Layers arrive in application order, base layer first.
#[async_trait]
pub trait Unpacker: Send + Sync {
    async fn unpack(&self, image: &Image, layers: &[Layer]) -> Result<(), BoxError>;
}
