//! The [`ImageStore`] trait: the name → root-descriptor index.
//!
//! Any backend (in-memory, single JSON file) implements this trait. Bindings
//! only point into the content store; deleting an image never removes blobs.

use std::sync::Arc;

use cask_types::Image;

use crate::error::{ImageError, ImageResult};

/// Storage backend for image name bindings.
///
/// Implementations must be thread-safe and make each operation atomic with
/// respect to the others. Methods are synchronous and may block on file I/O
/// and file locks; async callers go through [`run_blocking`].
pub trait ImageStore: Send + Sync {
    /// Create or replace the binding for `image.name`.
    fn put(&self, image: &Image) -> ImageResult<()>;

    /// Look up an image by name.
    ///
    /// Returns [`ImageError::ImageNotFound`] if no such binding exists.
    fn get(&self, name: &str) -> ImageResult<Image>;

    /// All images, sorted by name.
    fn list(&self) -> ImageResult<Vec<Image>>;

    /// Remove a binding. Fails with [`ImageError::ImageNotFound`] if absent.
    fn delete(&self, name: &str) -> ImageResult<()>;
}

pub(crate) fn validate_name(name: &str) -> ImageResult<()> {
    if name.trim().is_empty() {
        return Err(ImageError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Run an index operation on tokio's blocking pool.
pub async fn run_blocking<T, F>(store: &Arc<dyn ImageStore>, op: F) -> ImageResult<T>
where
    T: Send + 'static,
    F: FnOnce(&dyn ImageStore) -> ImageResult<T> + Send + 'static,
{
    let store = Arc::clone(store);
    tokio::task::spawn_blocking(move || op(store.as_ref()))
        .await
        .map_err(|e| ImageError::Task(e.to_string()))?
}
