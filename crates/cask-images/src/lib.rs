//! Image graph handling for Cask.
//!
//! An image is a DAG of content-addressed blobs: an optional index points at
//! per-platform manifests, and each manifest points at one config and an
//! ordered list of layers. This crate walks that graph and interprets it.
//!
//! # Handlers
//!
//! Behaviour during a walk is expressed as a [`Handler`] that maps a
//! descriptor to the children to visit next. Handlers compose into a
//! [`Handlers`] chain; [`dispatch`] drives a handler concurrently and
//! [`walk`] drives it sequentially. Pull, push, and completeness checks are
//! all handler chains.
//!
//! # Resolution
//!
//! [`config`], [`rootfs`], [`size`], and [`get_layers`] read a stored
//! manifest and its config to answer questions about one image.
//!
//! # Image Index
//!
//! The [`ImageStore`] trait binds names to root descriptors:
//!
//! - [`MemoryImageStore`] -- map-based, for tests and embedding
//! - [`FileImageStore`] -- one JSON document, replaced atomically on write

pub mod children;
pub mod dispatch;
pub mod error;
pub mod file;
pub mod handler;
pub mod image;
pub mod manifest;
pub mod memory;
pub mod store;

pub use children::{children, ChildrenHandler};
pub use dispatch::{dispatch, walk};
pub use error::{BoxError, ImageError, ImageResult};
pub use file::FileImageStore;
pub use handler::{handler_fn, Flow, Handler, HandlerFn, Handlers};
pub use image::{check, config, get_layers, rootfs, size, Completeness, Layer};
pub use manifest::{image_config, index, manifest, History, ImageConfig, Index, Manifest, RootFs};
pub use memory::MemoryImageStore;
pub use store::{run_blocking, ImageStore};
