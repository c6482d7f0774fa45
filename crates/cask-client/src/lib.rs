//! High-level client for Cask.
//!
//! [`Client`] ties a content store, an image index, and an optional
//! [`Resolver`](cask_remotes::Resolver) together and orchestrates the two
//! remote operations:
//!
//! - **pull**: resolve, fetch every missing blob of the graph, bind the name,
//!   optionally unpack
//! - **push**: upload every blob of the graph, leaves during the walk and
//!   manifests afterwards, parents after children
//!
//! Per-call behaviour is adjusted with a [`RemoteContext`].

pub mod client;
pub mod config;
pub mod context;
pub mod error;
pub mod image;
pub mod unpack;

pub use client::{open_registry, Client};
pub use config::{ClientConfig, LogConfig, RemoteConfig};
pub use context::{PushWrapper, RemoteContext};
pub use error::{ClientError, ClientResult};
pub use image::ImageHandle;
pub use unpack::Unpacker;

// Re-export the types callers need to drive the client.
pub use cask_content::{ContentStore, LocalStore, MemoryStore};
pub use cask_images::{FileImageStore, Handler, ImageStore, Layer, MemoryImageStore};
pub use cask_remotes::{Fetcher, Pusher, Resolver, StoreRegistry};
pub use cask_types::{Descriptor, Digest, Image};
