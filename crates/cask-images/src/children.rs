//! Expansion of manifest-like nodes into their children.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use cask_content::Provider;
use cask_types::{media_types, Descriptor};

use crate::error::ImageResult;
use crate::handler::{Flow, Handler};
use crate::manifest::{index, manifest};

/// Direct children of `desc` as recorded in its stored bytes.
///
/// Manifests yield their config followed by their layers, indexes yield
/// their manifests, and everything else is a leaf. Unknown media types are
/// logged and treated as leaves.
pub async fn children<P>(provider: &P, desc: &Descriptor) -> ImageResult<Vec<Descriptor>>
where
    P: Provider + ?Sized,
{
    let mt = desc.media_type.as_str();
    if media_types::is_manifest(mt) {
        let m = manifest(provider, desc).await?;
        let mut out = Vec::with_capacity(m.layers.len() + 1);
        out.push(m.config);
        out.extend(m.layers);
        return Ok(out);
    }
    if media_types::is_index(mt) {
        return Ok(index(provider, desc).await?.manifests);
    }
    if !media_types::is_leaf(mt) {
        warn!(media_type = mt, digest = %desc.digest, "encountered unknown type, treating as leaf");
    }
    Ok(Vec::new())
}

/// Handler that appends the stored children of each node.
///
/// In a pull chain it must come after the fetch handler, since it reads the
/// node's bytes from `provider`.
pub struct ChildrenHandler<P: ?Sized> {
    provider: Arc<P>,
}

impl<P: ?Sized> ChildrenHandler<P> {
    pub fn new(provider: Arc<P>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl<P> Handler for ChildrenHandler<P>
where
    P: Provider + ?Sized + 'static,
{
    async fn handle(&self, desc: &Descriptor, mut acc: Vec<Descriptor>) -> ImageResult<Flow> {
        let found = children(self.provider.as_ref(), desc).await?;
        debug!(digest = %desc.digest, count = found.len(), "expanded children");
        acc.extend(found);
        Ok(Flow::Continue(acc))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::dispatch;
    use crate::manifest::{Index, Manifest};
    use cask_content::{write_blob, ContentStore, MemoryStore};
    use std::sync::Mutex;

    async fn put(store: &MemoryStore, media_type: &str, data: &[u8]) -> Descriptor {
        let desc = Descriptor::for_bytes(media_type, data);
        write_blob(store, &format!("put-{}", desc.digest), data, desc.size, &desc.digest)
            .await
            .unwrap();
        desc
    }

    #[tokio::test]
    async fn manifest_children_are_config_then_layers() {
        let store = MemoryStore::new();
        let config = put(&store, media_types::OCI_CONFIG, b"{}").await;
        let l1 = put(&store, media_types::OCI_LAYER_GZIP, b"layer-1").await;
        let l2 = put(&store, media_types::OCI_LAYER_GZIP, b"layer-2").await;
        let bytes =
            serde_json::to_vec(&Manifest::new(config.clone(), vec![l1.clone(), l2.clone()])).unwrap();
        let m = put(&store, media_types::OCI_MANIFEST, &bytes).await;

        let got = children(&store, &m).await.unwrap();
        assert_eq!(got, vec![config, l1, l2]);
    }

    #[tokio::test]
    async fn leaves_and_unknown_types_have_no_children() {
        let store = MemoryStore::new();
        let layer = put(&store, media_types::DOCKER_LAYER_GZIP, b"tar").await;
        let odd = put(&store, "application/x-unknown", b"??").await;
        assert!(children(&store, &layer).await.unwrap().is_empty());
        assert!(children(&store, &odd).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn handler_appends_to_existing_children() {
        let store = Arc::new(MemoryStore::new());
        let config = put(&store, media_types::OCI_CONFIG, b"{}").await;
        let bytes = serde_json::to_vec(&Manifest::new(config.clone(), vec![])).unwrap();
        let m = put(&store, media_types::OCI_MANIFEST, &bytes).await;
        let earlier = Descriptor::for_bytes(media_types::OCI_LAYER, b"earlier");

        let handler = ChildrenHandler::new(store);
        let flow = handler.handle(&m, vec![earlier.clone()]).await.unwrap();
        assert_eq!(flow, Flow::Continue(vec![earlier, config]));
    }

    struct Seen(Mutex<Vec<Descriptor>>);

    #[async_trait]
    impl Handler for Seen {
        async fn handle(&self, desc: &Descriptor, children: Vec<Descriptor>) -> ImageResult<Flow> {
            self.0.lock().unwrap().push(desc.clone());
            Ok(Flow::Continue(children))
        }
    }

    #[tokio::test]
    async fn dispatch_reaches_every_blob_of_an_index() {
        let store = Arc::new(MemoryStore::new());
        let config = put(&store, media_types::OCI_CONFIG, b"{\"os\":\"linux\"}").await;
        let shared = put(&store, media_types::OCI_LAYER_GZIP, b"base").await;
        let amd = put(&store, media_types::OCI_LAYER_GZIP, b"amd64").await;
        let arm = put(&store, media_types::OCI_LAYER_GZIP, b"arm64").await;
        let m1 = serde_json::to_vec(&Manifest::new(config.clone(), vec![shared.clone(), amd])).unwrap();
        let m2 = serde_json::to_vec(&Manifest::new(config.clone(), vec![shared, arm])).unwrap();
        let m1 = put(&store, media_types::OCI_MANIFEST, &m1).await;
        let m2 = put(&store, media_types::OCI_MANIFEST, &m2).await;
        let idx = serde_json::to_vec(&Index::new(vec![m1, m2])).unwrap();
        let idx = put(&store, media_types::OCI_INDEX, &idx).await;

        let seen = Arc::new(Seen(Mutex::new(Vec::new())));
        let chain = crate::handler::Handlers::default()
            .with(seen.clone())
            .with(Arc::new(ChildrenHandler::new(store.clone())));
        dispatch(Arc::new(chain), vec![idx]).await.unwrap();

        // index + 2 manifests + config + 3 distinct layers
        assert_eq!(seen.0.lock().unwrap().len(), 7);
        assert_eq!(store.list().await.unwrap().len(), 7);
    }
}
