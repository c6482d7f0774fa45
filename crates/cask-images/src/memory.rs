//! In-memory image index for tests and ephemeral use.

use std::collections::BTreeMap;
use std::sync::RwLock;

use cask_types::{Descriptor, Image};

use crate::error::{ImageError, ImageResult};
use crate::store::{validate_name, ImageStore};

/// An in-memory implementation of [`ImageStore`].
///
/// Bindings live in a `BTreeMap` behind a `RwLock`, so listing is already in
/// name order. Data is lost when the store is dropped.
#[derive(Debug, Default)]
pub struct MemoryImageStore {
    images: RwLock<BTreeMap<String, Descriptor>>,
}

impl MemoryImageStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ImageStore for MemoryImageStore {
    fn put(&self, image: &Image) -> ImageResult<()> {
        validate_name(&image.name)?;
        self.images
            .write()
            .expect("lock poisoned")
            .insert(image.name.clone(), image.target.clone());
        Ok(())
    }

    fn get(&self, name: &str) -> ImageResult<Image> {
        let images = self.images.read().expect("lock poisoned");
        images
            .get(name)
            .map(|target| Image::new(name, target.clone()))
            .ok_or_else(|| ImageError::ImageNotFound(name.to_string()))
    }

    fn list(&self) -> ImageResult<Vec<Image>> {
        let images = self.images.read().expect("lock poisoned");
        Ok(images
            .iter()
            .map(|(name, target)| Image::new(name.clone(), target.clone()))
            .collect())
    }

    fn delete(&self, name: &str) -> ImageResult<()> {
        let mut images = self.images.write().expect("lock poisoned");
        images
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| ImageError::ImageNotFound(name.to_string()))
    }
}
