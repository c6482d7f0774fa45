//! Content-addressed blob storage for Cask.
//!
//! Blobs are immutable byte sequences stored under their [`Digest`]. New
//! content arrives through an *ingest*: a named, resumable write session that
//! only becomes a blob once its bytes have been verified against the declared
//! size and digest.
//!
//! # Storage Backends
//!
//! All backends implement the [`ContentStore`] trait:
//!
//! - [`MemoryStore`] -- map-based store for tests and embedding
//! - [`LocalStore`] -- directory-based store with crash-resumable ingests
//!
//! # Design Rules
//!
//! 1. Blobs are immutable once committed.
//! 2. Verify-then-publish: a blob appears under its digest atomically, or not at all.
//! 3. One writer per ingest ref; a second open fails instead of waiting.
//! 4. Concurrent reads are always safe.
//! 5. The store never interprets blob contents.
//!
//! [`Digest`]: cask_types::Digest

pub mod error;
pub mod helpers;
pub mod local;
mod locks;
pub mod memory;
pub mod traits;
pub mod types;

pub use error::{ContentError, ContentResult};
pub use helpers::{copy, write_blob, COPY_CHUNK_SIZE};
pub use local::LocalStore;
pub use memory::MemoryStore;
pub use traits::{BlobReader, ContentStore, ContentWriter, Provider};
pub use types::{Info, WriteStatus};
