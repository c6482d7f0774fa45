//! Parsed views of the OCI documents that make up an image graph.
//!
//! These are transient: they are read from the content store, inspected, and
//! dropped. The stored bytes are never re-serialized, so digests always refer
//! to exactly what the registry served.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use cask_content::Provider;
use cask_types::{media_types, Descriptor, Digest};

use crate::error::{ImageError, ImageResult};

/// Single-platform image manifest: one config plus ordered layers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub schema_version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    pub config: Descriptor,
    #[serde(default)]
    pub layers: Vec<Descriptor>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

impl Manifest {
    /// An OCI manifest over `config` and `layers`.
    pub fn new(config: Descriptor, layers: Vec<Descriptor>) -> Self {
        Self {
            schema_version: 2,
            media_type: Some(media_types::OCI_MANIFEST.to_string()),
            config,
            layers,
            annotations: BTreeMap::new(),
        }
    }
}

/// Multi-platform index (manifest list).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Index {
    pub schema_version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    #[serde(default)]
    pub manifests: Vec<Descriptor>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

impl Index {
    pub fn new(manifests: Vec<Descriptor>) -> Self {
        Self {
            schema_version: 2,
            media_type: Some(media_types::OCI_INDEX.to_string()),
            manifests,
            annotations: BTreeMap::new(),
        }
    }
}

/// The image configuration document.
///
/// Only the fields the engine inspects are typed; the runtime `config`
/// section is kept as raw JSON and any other field is ignored.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub architecture: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<serde_json::Value>,
    pub rootfs: RootFs,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<History>,
}

/// The uncompressed layer chain of an image.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootFs {
    #[serde(rename = "type")]
    pub fs_type: String,
    #[serde(default)]
    pub diff_ids: Vec<Digest>,
}

impl RootFs {
    /// A `layers` rootfs over the given diff ids.
    pub fn layers(diff_ids: Vec<Digest>) -> Self {
        Self {
            fs_type: "layers".to_string(),
            diff_ids,
        }
    }
}

impl Default for RootFs {
    fn default() -> Self {
        Self::layers(Vec::new())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct History {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub empty_layer: bool,
}

/// Read and parse the manifest at `desc`.
///
/// Fails with [`ImageError::Unsupported`] unless `desc` has a manifest media
/// type.
pub async fn manifest<P>(provider: &P, desc: &Descriptor) -> ImageResult<Manifest>
where
    P: Provider + ?Sized,
{
    if !media_types::is_manifest(&desc.media_type) {
        return Err(unsupported(desc, "manifest"));
    }
    read_json(provider, &desc.digest).await
}

/// Read and parse the index at `desc`.
pub async fn index<P>(provider: &P, desc: &Descriptor) -> ImageResult<Index>
where
    P: Provider + ?Sized,
{
    if !media_types::is_index(&desc.media_type) {
        return Err(unsupported(desc, "index"));
    }
    read_json(provider, &desc.digest).await
}

/// Read and parse the image config at `desc`.
///
/// The media type is not checked: registries label configs inconsistently.
pub async fn image_config<P>(provider: &P, desc: &Descriptor) -> ImageResult<ImageConfig>
where
    P: Provider + ?Sized,
{
    read_json(provider, &desc.digest).await
}

async fn read_json<P, T>(provider: &P, digest: &Digest) -> ImageResult<T>
where
    P: Provider + ?Sized,
    T: DeserializeOwned,
{
    let data = provider.read_blob(digest).await?;
    serde_json::from_slice(&data).map_err(|e| ImageError::Parse {
        digest: digest.clone(),
        reason: e.to_string(),
    })
}

pub(crate) fn unsupported(desc: &Descriptor, operation: &'static str) -> ImageError {
    ImageError::Unsupported {
        media_type: desc.media_type.clone(),
        operation,
    }
}
