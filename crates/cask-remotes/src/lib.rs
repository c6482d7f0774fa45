//! Remote registry plumbing for Cask.
//!
//! The engine talks to registries only through three traits: a [`Resolver`]
//! turns a reference into a root descriptor, a [`Fetcher`] streams blobs down,
//! and a [`Pusher`] opens verified writers up. Transport, authentication, and
//! reference grammar live behind those traits.
//!
//! [`FetchHandler`] and [`PushHandler`] plug a fetcher or pusher into an
//! image handler chain. [`StoreRegistry`] implements all three traits over a
//! local content store and image index.

pub mod error;
pub mod handlers;
pub mod registry;
pub mod traits;

pub use error::{RemoteError, RemoteResult};
pub use handlers::{fetch_blob, fetch_ref, push_blob, FetchHandler, PushHandler};
pub use registry::StoreRegistry;
pub use traits::{BlobStream, Fetcher, Pusher, Resolver};
