//! Image index persisted as a single JSON document.
//!
//! Every mutation rewrites the whole document to a temporary file in the same
//! directory and renames it over the old one, so a crash leaves either the
//! previous or the new index on disk, never a torn one.
//!
//! The document is the only state. Each operation re-reads it under a lock on
//! the sibling `<file>.lock`: shared for reads, exclusive for a
//! read-modify-write. Handles and processes sharing one index therefore never
//! overwrite each other's bindings.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use fs4::fs_std::FileExt;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::debug;

use cask_types::{Descriptor, Image};

use crate::error::{ImageError, ImageResult};
use crate::store::{validate_name, ImageStore};

const INDEX_VERSION: u32 = 1;

type Bindings = BTreeMap<String, Descriptor>;

#[derive(Debug, Default, Serialize, Deserialize)]
struct IndexDocument {
    version: u32,
    #[serde(default)]
    images: Bindings,
}

/// File-backed [`ImageStore`].
#[derive(Debug)]
pub struct FileImageStore {
    path: PathBuf,
    lock_path: PathBuf,
}

impl FileImageStore {
    /// Open the index at `path`, starting empty if the file does not exist.
    ///
    /// The parent directory is created if needed. An existing document is
    /// validated up front.
    pub fn open(path: impl Into<PathBuf>) -> ImageResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let store = Self {
            lock_path: lock_path_for(&path),
            path,
        };
        let images = store.snapshot()?;
        debug!(path = %store.path.display(), images = images.len(), "opened image index");
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_file(&self) -> ImageResult<File> {
        Ok(OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&self.lock_path)?)
    }

    fn load(&self) -> ImageResult<Bindings> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Bindings::new()),
            Err(e) => return Err(e.into()),
        };
        let doc: IndexDocument = serde_json::from_slice(&bytes)
            .map_err(|e| ImageError::Serialization(format!("{}: {e}", self.path.display())))?;
        if doc.version != INDEX_VERSION {
            return Err(ImageError::Serialization(format!(
                "{}: unsupported index version {}",
                self.path.display(),
                doc.version
            )));
        }
        Ok(doc.images)
    }

    /// Current bindings, read under a shared lock.
    fn snapshot(&self) -> ImageResult<Bindings> {
        let lock = self.lock_file()?;
        FileExt::lock_shared(&lock)?;
        self.load()
    }

    /// Read, change, and write back the bindings under an exclusive lock.
    /// Nothing is written if `change` fails.
    fn update<T>(&self, change: impl FnOnce(&mut Bindings) -> ImageResult<T>) -> ImageResult<T> {
        let lock = self.lock_file()?;
        FileExt::lock_exclusive(&lock)?;
        let mut images = self.load()?;
        let out = change(&mut images)?;
        self.persist(&images)?;
        Ok(out)
    }

    fn persist(&self, images: &Bindings) -> ImageResult<()> {
        let doc = IndexDocument {
            version: INDEX_VERSION,
            images: images.clone(),
        };
        let bytes = serde_json::to_vec_pretty(&doc)
            .map_err(|e| ImageError::Serialization(e.to_string()))?;

        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(&bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }
}

fn lock_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("images"));
    name.push(".lock");
    path.with_file_name(name)
}

impl ImageStore for FileImageStore {
    fn put(&self, image: &Image) -> ImageResult<()> {
        validate_name(&image.name)?;
        self.update(|images| {
            images.insert(image.name.clone(), image.target.clone());
            Ok(())
        })?;
        debug!(name = %image.name, digest = %image.target.digest, "image bound");
        Ok(())
    }

    fn get(&self, name: &str) -> ImageResult<Image> {
        self.snapshot()?
            .remove(name)
            .map(|target| Image::new(name, target))
            .ok_or_else(|| ImageError::ImageNotFound(name.to_string()))
    }

    fn list(&self) -> ImageResult<Vec<Image>> {
        Ok(self
            .snapshot()?
            .into_iter()
            .map(|(name, target)| Image::new(name, target))
            .collect())
    }

    fn delete(&self, name: &str) -> ImageResult<()> {
        self.update(|images| {
            images
                .remove(name)
                .map(|_| ())
                .ok_or_else(|| ImageError::ImageNotFound(name.to_string()))
        })?;
        debug!(name, "image removed");
        Ok(())
    }
}
