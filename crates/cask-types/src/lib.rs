//! Foundation types for Cask.
//!
//! Every other Cask crate depends on `cask-types`. The types here mirror the
//! OCI image-spec wire shapes so they can be parsed from, and serialized to,
//! the exact JSON a registry serves.
//!
//! # Key Types
//!
//! - [`Digest`] -- `algorithm:hex` content hash, the sole identity of a blob
//! - [`Digester`] -- streaming hasher producing a [`Digest`]
//! - [`Descriptor`] -- media type + digest + size pointer to a blob
//! - [`Image`] -- a named pointer to a root descriptor
//! - [`media_types`] -- OCI and Docker schema2 media type constants

pub mod descriptor;
pub mod digest;
pub mod error;
pub mod image;
pub mod media_types;

pub use descriptor::{Descriptor, Platform};
pub use digest::{Algorithm, Digest, Digester};
pub use error::TypeError;
pub use image::Image;
