//! Read-only resolution helpers over a stored image graph.

use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use cask_content::Provider;
use cask_types::{media_types, Descriptor, Digest};

use crate::children::children;
use crate::dispatch::walk;
use crate::error::{ImageError, ImageResult};
use crate::handler::{Flow, Handler};
use crate::manifest::{image_config, manifest, unsupported};

/// A manifest layer paired with the uncompressed diff it produces.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Layer {
    /// Diff-ID as a descriptor. Its size is unknown and reported as zero.
    pub diff: Descriptor,
    /// The (usually compressed) blob listed in the manifest.
    pub blob: Descriptor,
}

/// Config descriptor of the manifest at `target`.
pub async fn config<P>(provider: &P, target: &Descriptor) -> ImageResult<Descriptor>
where
    P: Provider + ?Sized,
{
    if !media_types::is_manifest(&target.media_type) {
        return Err(unsupported(target, "config"));
    }
    Ok(manifest(provider, target).await?.config)
}

/// Ordered diff-IDs from the image config at `config_desc`.
pub async fn rootfs<P>(provider: &P, config_desc: &Descriptor) -> ImageResult<Vec<Digest>>
where
    P: Provider + ?Sized,
{
    Ok(image_config(provider, config_desc).await?.rootfs.diff_ids)
}

/// Total bytes of a single-platform image: the manifest itself, its config
/// and every layer it lists.
pub async fn size<P>(provider: &P, target: &Descriptor) -> ImageResult<u64>
where
    P: Provider + ?Sized,
{
    if !media_types::is_manifest(&target.media_type) {
        return Err(unsupported(target, "size"));
    }
    let m = manifest(provider, target).await?;
    Ok(target.size + m.config.size + m.layers.iter().map(|l| l.size).sum::<u64>())
}

/// Pair each diff-ID of the image config with the manifest layer at the same
/// position.
///
/// Fails with [`ImageError::LayerCountMismatch`] when the config and the
/// manifest disagree on the number of layers.
pub async fn get_layers<P>(provider: &P, target: &Descriptor) -> ImageResult<Vec<Layer>>
where
    P: Provider + ?Sized,
{
    if !media_types::is_manifest(&target.media_type) {
        return Err(unsupported(target, "layers"));
    }
    let m = manifest(provider, target).await?;
    let diff_ids = rootfs(provider, &m.config).await?;
    if diff_ids.len() != m.layers.len() {
        return Err(ImageError::LayerCountMismatch {
            diff_ids: diff_ids.len(),
            layers: m.layers.len(),
        });
    }
    Ok(diff_ids
        .into_iter()
        .zip(m.layers)
        .map(|(diff_id, blob)| Layer {
            diff: Descriptor::new(media_types::OCI_LAYER, diff_id, 0),
            blob,
        })
        .collect())
}

/// Result of [`check`]: which blobs an image needs and which are absent.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completeness {
    /// Every reachable descriptor, in walk order.
    pub required: Vec<Descriptor>,
    /// Required descriptors with no committed blob.
    pub missing: Vec<Descriptor>,
}

impl Completeness {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

struct CheckHandler<'a, P: ?Sized> {
    provider: &'a P,
    report: Mutex<Completeness>,
}

#[async_trait]
impl<'a, P> Handler for CheckHandler<'a, P>
where
    P: Provider + ?Sized,
{
    async fn handle(&self, desc: &Descriptor, _children: Vec<Descriptor>) -> ImageResult<Flow> {
        let present = self.provider.exists(&desc.digest).await?;
        {
            let mut report = self.report.lock().expect("lock poisoned");
            report.required.push(desc.clone());
            if !present {
                report.missing.push(desc.clone());
            }
        }
        if !present {
            // Children of an absent manifest cannot be known.
            return Ok(Flow::Stop);
        }
        Ok(Flow::Continue(children(self.provider, desc).await?))
    }
}

/// Walk the graph under `target` and report which blobs are not stored.
pub async fn check<P>(provider: &P, target: &Descriptor) -> ImageResult<Completeness>
where
    P: Provider + ?Sized,
{
    let handler = CheckHandler {
        provider,
        report: Mutex::new(Completeness::default()),
    };
    walk(&handler, vec![target.clone()]).await?;
    Ok(handler.report.into_inner().expect("lock poisoned"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{ImageConfig, Index, Manifest, RootFs};
    use cask_content::{write_blob, ContentStore, MemoryStore};

    async fn put(store: &MemoryStore, media_type: &str, data: &[u8]) -> Descriptor {
        let desc = Descriptor::for_bytes(media_type, data);
        write_blob(store, &format!("put-{}", desc.digest), data, desc.size, &desc.digest)
            .await
            .unwrap();
        desc
    }

    struct Fixture {
        store: MemoryStore,
        manifest: Descriptor,
        config: Descriptor,
        layers: Vec<Descriptor>,
        diff_ids: Vec<Digest>,
    }

    async fn fixture(layer_count: usize, diff_count: usize) -> Fixture {
        let store = MemoryStore::new();
        let mut layers = Vec::new();
        for i in 0..layer_count {
            let data = format!("compressed layer {i}");
            layers.push(put(&store, media_types::OCI_LAYER_GZIP, data.as_bytes()).await);
        }
        let diff_ids: Vec<Digest> = (0..diff_count)
            .map(|i| Digest::from_bytes(format!("uncompressed layer {i}").as_bytes()))
            .collect();
        let cfg = ImageConfig {
            architecture: Some("amd64".into()),
            os: Some("linux".into()),
            rootfs: RootFs::layers(diff_ids.clone()),
            ..Default::default()
        };
        let config = put(&store, media_types::OCI_CONFIG, &serde_json::to_vec(&cfg).unwrap()).await;
        let bytes = serde_json::to_vec(&Manifest::new(config.clone(), layers.clone())).unwrap();
        let manifest = put(&store, media_types::OCI_MANIFEST, &bytes).await;
        Fixture {
            store,
            manifest,
            config,
            layers,
            diff_ids,
        }
    }

    #[tokio::test]
    async fn config_and_rootfs_resolve() {
        let f = fixture(2, 2).await;
        let config_desc = config(&f.store, &f.manifest).await.unwrap();
        assert_eq!(config_desc, f.config);
        assert_eq!(rootfs(&f.store, &config_desc).await.unwrap(), f.diff_ids);
    }

    #[tokio::test]
    async fn size_counts_manifest_config_and_layers() {
        let f = fixture(3, 3).await;
        let expected = f.manifest.size + f.config.size + f.layers.iter().map(|l| l.size).sum::<u64>();
        assert_eq!(size(&f.store, &f.manifest).await.unwrap(), expected);
    }

    #[tokio::test]
    async fn get_layers_pairs_in_order() {
        let f = fixture(3, 3).await;
        let layers = get_layers(&f.store, &f.manifest).await.unwrap();
        assert_eq!(layers.len(), 3);
        for (i, layer) in layers.iter().enumerate() {
            assert_eq!(layer.diff.digest, f.diff_ids[i]);
            assert_eq!(layer.diff.media_type, media_types::OCI_LAYER);
            assert_eq!(layer.blob, f.layers[i]);
        }
    }

    #[tokio::test]
    async fn get_layers_rejects_count_mismatch() {
        let f = fixture(2, 3).await;
        let err = get_layers(&f.store, &f.manifest).await.unwrap_err();
        assert!(matches!(err, ImageError::LayerCountMismatch { diff_ids: 3, layers: 2 }));
        assert!(err.is_integrity());
    }

    #[tokio::test]
    async fn helpers_reject_non_manifest_targets() {
        let f = fixture(1, 1).await;
        let idx = serde_json::to_vec(&Index::new(vec![f.manifest.clone()])).unwrap();
        let idx = put(&f.store, media_types::OCI_INDEX, &idx).await;

        for err in [
            config(&f.store, &idx).await.unwrap_err(),
            size(&f.store, &idx).await.unwrap_err(),
            get_layers(&f.store, &idx).await.unwrap_err(),
        ] {
            assert!(matches!(err, ImageError::Unsupported { .. }));
        }
    }

    #[tokio::test]
    async fn check_reports_missing_layers() {
        let f = fixture(2, 2).await;
        assert!(check(&f.store, &f.manifest).await.unwrap().is_complete());

        f.store.delete(&f.layers[1].digest).await.unwrap();
        let report = check(&f.store, &f.manifest).await.unwrap();
        assert_eq!(report.required.len(), 4);
        assert_eq!(report.missing, vec![f.layers[1].clone()]);
    }
}
