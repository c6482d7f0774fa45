use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::{debug, info};

use cask_content::{ContentStore, LocalStore};
use cask_images::{
    dispatch, run_blocking, ChildrenHandler, FileImageStore, Flow, Handler, Handlers, ImageResult,
    ImageStore,
};
use cask_remotes::{FetchHandler, PushHandler, Resolver, StoreRegistry};
use cask_types::{media_types, Descriptor, Image};

use crate::config::ClientConfig;
use crate::context::RemoteContext;
use crate::error::{ClientError, ClientResult};
use crate::image::ImageHandle;
use crate::unpack::Unpacker;

/// Entry point for pulling, pushing, and inspecting images.
///
/// Cloning is cheap; clones share the same stores.
#[derive(Clone)]
pub struct Client {
    content: Arc<dyn ContentStore>,
    images: Arc<dyn ImageStore>,
    resolver: Option<Arc<dyn Resolver>>,
    unpacker: Option<Arc<dyn Unpacker>>,
}

impl Client {
    pub fn new(content: Arc<dyn ContentStore>, images: Arc<dyn ImageStore>) -> Self {
        Self {
            content,
            images,
            resolver: None,
            unpacker: None,
        }
    }

    /// Open the on-disk stores under `config.root`, and the configured
    /// registry directory as the default resolver.
    pub async fn open(config: &ClientConfig) -> ClientResult<Self> {
        let content = LocalStore::open(config.content_dir()).await?;
        let images = FileImageStore::open(config.images_path())?;
        let mut client = Self::new(Arc::new(content), Arc::new(images));
        if let Some(dir) = &config.remote.registry {
            client = client.with_resolver(Arc::new(open_registry(dir).await?));
        }
        debug!(root = %config.root.display(), "client opened");
        Ok(client)
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn Resolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn with_unpacker(mut self, unpacker: Arc<dyn Unpacker>) -> Self {
        self.unpacker = Some(unpacker);
        self
    }

    pub fn content(&self) -> &Arc<dyn ContentStore> {
        &self.content
    }

    pub fn image_store(&self) -> &Arc<dyn ImageStore> {
        &self.images
    }

    pub(crate) fn unpacker(&self) -> Option<&Arc<dyn Unpacker>> {
        self.unpacker.as_ref()
    }

    fn resolver(&self, ctx: &RemoteContext) -> ClientResult<Arc<dyn Resolver>> {
        ctx.resolver
            .clone()
            .or_else(|| self.resolver.clone())
            .ok_or(ClientError::NoResolver)
    }

    /// Fetch the image named by `reference` and every blob it reaches, then
    /// bind it in the image index.
    ///
    /// Blobs already in the content store are not fetched again. On error,
    /// blobs committed so far stay and the image is not bound. Asking to
    /// unpack without an [`Unpacker`] fails before anything is fetched.
    pub async fn pull(&self, reference: &str, ctx: RemoteContext) -> ClientResult<ImageHandle> {
        if ctx.unpack && self.unpacker.is_none() {
            return Err(ClientError::NoUnpacker);
        }
        let resolver = self.resolver(&ctx)?;
        let (name, desc) = resolver.resolve(reference).await?;
        let fetcher = resolver.fetcher(&name).await?;
        info!(reference, name = %name, digest = %desc.digest, "pulling");

        let mut handlers = Handlers::new(ctx.base_handlers.clone());
        handlers.push(Arc::new(FetchHandler::new(self.content.clone(), fetcher)));
        handlers.push(Arc::new(ChildrenHandler::new(self.content.clone())));
        dispatch(Arc::new(handlers), vec![desc.clone()]).await?;

        let image = Image::new(name.as_str(), desc);
        let bound = run_blocking(&self.images, move |images| {
            images.put(&image)?;
            images.get(&image.name)
        })
        .await?;
        let image = ImageHandle::new(self.clone(), bound);
        if ctx.unpack {
            image.unpack().await?;
        }
        info!(name = %name, "pulled");
        Ok(image)
    }

    /// Upload the graph rooted at `desc` to `reference`.
    ///
    /// Leaf blobs are uploaded during the walk. Manifests and indexes are
    /// held back and uploaded afterwards, most recently seen first, so a
    /// parent always reaches the remote after its children.
    pub async fn push(&self, reference: &str, desc: &Descriptor, ctx: RemoteContext) -> ClientResult<()> {
        let resolver = self.resolver(&ctx)?;
        let mut pusher = resolver.pusher(reference).await?;
        if let Some(wrap) = &ctx.push_wrapper {
            pusher = wrap(pusher);
        }
        info!(reference, digest = %desc.digest, "pushing");

        let deferred = Arc::new(ManifestDeferral::default());
        let push_handler = PushHandler::new(self.content.clone(), pusher);

        let mut handlers = Handlers::new(ctx.base_handlers.clone());
        handlers.push(Arc::new(ChildrenHandler::new(self.content.clone())));
        handlers.push(deferred.clone());
        handlers.push(Arc::new(push_handler.clone()));
        dispatch(Arc::new(handlers), vec![desc.clone()]).await?;

        let manifests = deferred.take();
        debug!(count = manifests.len(), "pushing deferred manifests");
        for manifest in manifests.iter().rev() {
            push_handler.push(manifest).await?;
        }
        info!(reference, "pushed");
        Ok(())
    }

    pub fn get_image(&self, name: &str) -> ClientResult<ImageHandle> {
        Ok(ImageHandle::new(self.clone(), self.images.get(name)?))
    }

    pub fn list_images(&self) -> ClientResult<Vec<ImageHandle>> {
        Ok(self
            .images
            .list()?
            .into_iter()
            .map(|image| ImageHandle::new(self.clone(), image))
            .collect())
    }

    /// Remove the name binding. Blobs stay in the content store.
    pub async fn delete_image(&self, name: &str) -> ClientResult<()> {
        let owned = name.to_string();
        run_blocking(&self.images, move |images| images.delete(&owned)).await?;
        info!(name, "image deleted");
        Ok(())
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("resolver", &self.resolver.is_some())
            .field("unpacker", &self.unpacker.is_some())
            .finish()
    }
}

/// Open the store-backed registry kept in `dir`.
pub async fn open_registry(dir: &Path) -> ClientResult<StoreRegistry> {
    let content = LocalStore::open(dir.join("content")).await?;
    let images = FileImageStore::open(dir.join("images.json"))?;
    Ok(StoreRegistry::new(Arc::new(content), Arc::new(images)))
}

/// Holds back manifest-like nodes during a push.
///
/// Records each manifest or index it sees and stops the chain for it, so
/// the push handler after it only uploads leaves. Children gathered earlier
/// in the chain are still walked.
#[derive(Default)]
struct ManifestDeferral {
    seen: Mutex<Vec<Descriptor>>,
}

impl ManifestDeferral {
    fn take(&self) -> Vec<Descriptor> {
        std::mem::take(&mut *self.seen.lock().expect("lock poisoned"))
    }
}

#[async_trait]
impl Handler for ManifestDeferral {
    async fn handle(&self, desc: &Descriptor, children: Vec<Descriptor>) -> ImageResult<Flow> {
        if media_types::is_manifest_like(&desc.media_type) {
            self.seen.lock().expect("lock poisoned").push(desc.clone());
            return Ok(Flow::Stop);
        }
        Ok(Flow::Continue(children))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cask_content::{write_blob, MemoryStore, Provider};
    use cask_images::{BoxError, ImageConfig, Index, Layer, Manifest, MemoryImageStore, RootFs};
    use cask_remotes::{BlobStream, Fetcher, Pusher, RemoteError, RemoteResult};
    use cask_types::Digest;
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn put(store: &dyn ContentStore, media_type: &str, data: &[u8]) -> Descriptor {
        let desc = Descriptor::for_bytes(media_type, data);
        write_blob(store, &format!("seed-{}", desc.digest), data, desc.size, &desc.digest)
            .await
            .unwrap();
        desc
    }

    /// Store a single-platform image with `layers` layers; returns the manifest.
    async fn seed_image(store: &dyn ContentStore, tag: &str, layers: usize) -> Descriptor {
        let mut blobs = Vec::new();
        let mut diff_ids = Vec::new();
        for i in 0..layers {
            blobs.push(put(store, media_types::OCI_LAYER_GZIP, format!("{tag} layer {i}").as_bytes()).await);
            diff_ids.push(Digest::from_bytes(format!("{tag} diff {i}").as_bytes()));
        }
        let cfg = ImageConfig {
            os: Some("linux".into()),
            architecture: Some(tag.into()),
            rootfs: RootFs::layers(diff_ids),
            ..Default::default()
        };
        let config = put(store, media_types::OCI_CONFIG, &serde_json::to_vec(&cfg).unwrap()).await;
        let manifest = serde_json::to_vec(&Manifest::new(config, blobs)).unwrap();
        put(store, media_types::OCI_MANIFEST, &manifest).await
    }

    struct Remote {
        registry: StoreRegistry,
        content: MemoryStore,
        images: Arc<MemoryImageStore>,
    }

    fn remote() -> Remote {
        let content = MemoryStore::new();
        let images = Arc::new(MemoryImageStore::new());
        Remote {
            registry: StoreRegistry::new(Arc::new(content.clone()), images.clone()),
            content,
            images,
        }
    }

    fn local() -> (Client, MemoryStore) {
        let content = MemoryStore::new();
        let client = Client::new(Arc::new(content.clone()), Arc::new(MemoryImageStore::new()));
        (client, content)
    }

    /// Counts every blob fetched through it.
    struct CountingResolver {
        inner: StoreRegistry,
        fetches: Arc<AtomicUsize>,
    }

    struct CountingFetcher {
        inner: Arc<dyn Fetcher>,
        fetches: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Fetcher for CountingFetcher {
        async fn fetch(&self, desc: &Descriptor) -> RemoteResult<BlobStream> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            self.inner.fetch(desc).await
        }
    }

    #[async_trait]
    impl Resolver for CountingResolver {
        async fn resolve(&self, reference: &str) -> RemoteResult<(String, Descriptor)> {
            self.inner.resolve(reference).await
        }

        async fn fetcher(&self, name: &str) -> RemoteResult<Arc<dyn Fetcher>> {
            Ok(Arc::new(CountingFetcher {
                inner: self.inner.fetcher(name).await?,
                fetches: Arc::clone(&self.fetches),
            }))
        }

        async fn pusher(&self, reference: &str) -> RemoteResult<Arc<dyn Pusher>> {
            self.inner.pusher(reference).await
        }
    }

    /// Records the order in which descriptors are handed to the pusher.
    struct RecordingPusher {
        inner: Arc<dyn Pusher>,
        log: Arc<Mutex<Vec<Descriptor>>>,
    }

    #[async_trait]
    impl Pusher for RecordingPusher {
        async fn push(&self, desc: &Descriptor) -> RemoteResult<Box<dyn cask_content::ContentWriter>> {
            self.log.lock().unwrap().push(desc.clone());
            self.inner.push(desc).await
        }
    }

    fn recording(log: &Arc<Mutex<Vec<Descriptor>>>) -> RemoteContext {
        let log = Arc::clone(log);
        RemoteContext::new().with_push_wrapper(move |inner| {
            Arc::new(RecordingPusher {
                inner,
                log: Arc::clone(&log),
            })
        })
    }

    #[derive(Default)]
    struct RecordingUnpacker {
        calls: Mutex<Vec<(String, Vec<Layer>)>>,
    }

    #[async_trait]
    impl Unpacker for RecordingUnpacker {
        async fn unpack(&self, image: &Image, layers: &[Layer]) -> Result<(), BoxError> {
            self.calls
                .lock()
                .unwrap()
                .push((image.name.clone(), layers.to_vec()));
            Ok(())
        }
    }

    #[tokio::test]
    async fn pull_fetches_every_blob_once() {
        let remote = remote();
        let manifest = seed_image(&remote.content, "amd64", 3).await;
        remote
            .images
            .put(&Image::new("example.com/app:1", manifest.clone()))
            .unwrap();

        let fetches = Arc::new(AtomicUsize::new(0));
        let resolver = Arc::new(CountingResolver {
            inner: remote.registry.clone(),
            fetches: Arc::clone(&fetches),
        });
        let (client, content) = local();
        let client = client.with_resolver(resolver);

        let image = client.pull("example.com/app:1", RemoteContext::new()).await.unwrap();
        assert_eq!(image.name(), "example.com/app:1");
        assert_eq!(image.target(), &manifest);
        // manifest + config + 3 layers
        assert_eq!(content.len(), 5);
        assert_eq!(fetches.load(Ordering::SeqCst), 5);

        client.pull("example.com/app:1", RemoteContext::new()).await.unwrap();
        assert_eq!(fetches.load(Ordering::SeqCst), 5);
        assert!(content.list_statuses().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn pull_runs_base_handlers_on_every_node() {
        struct Count(AtomicUsize);

        #[async_trait]
        impl Handler for Count {
            async fn handle(&self, _desc: &Descriptor, children: Vec<Descriptor>) -> ImageResult<Flow> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Ok(Flow::Continue(children))
            }
        }

        let remote = remote();
        let manifest = seed_image(&remote.content, "arm64", 2).await;
        remote.images.put(&Image::new("app", manifest)).unwrap();
        let (client, _) = local();
        let count = Arc::new(Count(AtomicUsize::new(0)));

        let ctx = RemoteContext::new()
            .with_resolver(Arc::new(remote.registry.clone()))
            .with_handler(count.clone());
        client.pull("app", ctx).await.unwrap();
        assert_eq!(count.0.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn pull_with_unpack_hands_layers_over() {
        let remote = remote();
        let manifest = seed_image(&remote.content, "amd64", 2).await;
        remote.images.put(&Image::new("app", manifest)).unwrap();
        let unpacker = Arc::new(RecordingUnpacker::default());
        let (client, _) = local();
        let client = client
            .with_resolver(Arc::new(remote.registry.clone()))
            .with_unpacker(unpacker.clone());

        client
            .pull("app", RemoteContext::new().with_unpack(true))
            .await
            .unwrap();

        let calls = unpacker.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "app");
        assert_eq!(calls[0].1.len(), 2);
    }

    #[tokio::test]
    async fn unpack_without_unpacker_fails_before_binding() {
        let remote = remote();
        let manifest = seed_image(&remote.content, "amd64", 1).await;
        remote.images.put(&Image::new("app", manifest)).unwrap();
        let (client, content) = local();
        let client = client.with_resolver(Arc::new(remote.registry.clone()));

        let err = client
            .pull("app", RemoteContext::new().with_unpack(true))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::NoUnpacker));
        assert!(client.get_image("app").is_err());
        assert!(client.list_images().unwrap().is_empty());
        assert!(content.is_empty());
    }

    #[tokio::test]
    async fn pull_errors() {
        let (client, _) = local();
        assert!(matches!(
            client.pull("app", RemoteContext::new()).await.unwrap_err(),
            ClientError::NoResolver
        ));

        let remote = remote();
        let client = client.with_resolver(Arc::new(remote.registry.clone()));
        let err = client.pull("missing", RemoteContext::new()).await.unwrap_err();
        assert!(matches!(err, ClientError::Remote(RemoteError::NotFound(_))));
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn pull_stops_on_missing_remote_blob() {
        let remote = remote();
        let manifest = seed_image(&remote.content, "amd64", 2).await;
        remote.images.put(&Image::new("app", manifest.clone())).unwrap();
        let layers = cask_images::get_layers(&remote.content, &manifest).await.unwrap();
        remote.content.delete(&layers[1].blob.digest).await.unwrap();

        let (client, _) = local();
        let client = client.with_resolver(Arc::new(remote.registry.clone()));
        let err = client.pull("app", RemoteContext::new()).await.unwrap_err();
        assert!(err.is_not_found());
        assert!(client.list_images().unwrap().is_empty());
    }

    #[tokio::test]
    async fn push_uploads_manifest_last() {
        let (client, content) = local();
        let manifest = seed_image(&content, "amd64", 3).await;
        let remote = remote();
        let client = client.with_resolver(Arc::new(remote.registry.clone()));
        let log = Arc::new(Mutex::new(Vec::new()));

        client
            .push("example.com/app:1", &manifest, recording(&log))
            .await
            .unwrap();

        let log = log.lock().unwrap();
        assert_eq!(log.len(), 5);
        assert_eq!(log.last(), Some(&manifest));
        assert_eq!(remote.content.len(), 5);
        let (_, resolved) = remote.registry.resolve("example.com/app:1").await.unwrap();
        assert_eq!(resolved, manifest);
    }

    #[tokio::test]
    async fn push_nested_index_uploads_parents_after_children() {
        let (client, content) = local();
        let m1 = seed_image(&content, "amd64", 2).await;
        let m2 = seed_image(&content, "arm64", 2).await;
        let index = serde_json::to_vec(&Index::new(vec![m1.clone(), m2.clone()])).unwrap();
        let index = put(&content, media_types::OCI_INDEX, &index).await;
        let remote = remote();
        let client = client.with_resolver(Arc::new(remote.registry.clone()));
        let log = Arc::new(Mutex::new(Vec::new()));

        client
            .push("example.com/multi:1", &index, recording(&log))
            .await
            .unwrap();

        let log = log.lock().unwrap();
        // index + 2 manifests + 2 configs + 4 layers
        assert_eq!(log.len(), 9);
        assert_eq!(log.last(), Some(&index));
        let first_manifest = log
            .iter()
            .position(|d| media_types::is_manifest_like(&d.media_type))
            .unwrap();
        assert!(log[first_manifest..]
            .iter()
            .all(|d| media_types::is_manifest_like(&d.media_type)));
        assert_eq!(first_manifest, 6);
        assert_eq!(remote.images.get("example.com/multi:1").unwrap().target, index);
    }

    #[tokio::test]
    async fn second_push_skips_existing_blobs() {
        let (client, content) = local();
        let manifest = seed_image(&content, "amd64", 2).await;
        let remote = remote();
        let client = client.with_resolver(Arc::new(remote.registry.clone()));

        client.push("app:1", &manifest, RemoteContext::new()).await.unwrap();
        client.push("app:2", &manifest, RemoteContext::new()).await.unwrap();
        assert_eq!(remote.content.len(), 4);
        assert_eq!(remote.images.list().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn push_then_pull_roundtrips_through_registry() {
        let (pusher, content) = local();
        let manifest = seed_image(&content, "amd64", 2).await;
        let remote = remote();
        let pusher = pusher.with_resolver(Arc::new(remote.registry.clone()));
        pusher.push("shared/app:1", &manifest, RemoteContext::new()).await.unwrap();

        let (puller, pulled) = local();
        let puller = puller.with_resolver(Arc::new(remote.registry.clone()));
        let image = puller.pull("shared/app:1", RemoteContext::new()).await.unwrap();
        assert_eq!(pulled.len(), 4);
        assert_eq!(image.layers().await.unwrap().len(), 2);
        assert_eq!(image.size().await.unwrap(), pulled.total_bytes());
        assert!(image.check().await.unwrap().is_complete());
    }

    #[tokio::test]
    async fn image_index_management() {
        let (client, content) = local();
        let manifest = seed_image(&content, "amd64", 1).await;
        client
            .image_store()
            .put(&Image::new("b", manifest.clone()))
            .unwrap();
        client.image_store().put(&Image::new("a", manifest)).unwrap();

        let names: Vec<String> = client
            .list_images()
            .unwrap()
            .iter()
            .map(|i| i.name().to_string())
            .collect();
        assert_eq!(names, vec!["a", "b"]);

        let image = client.get_image("a").unwrap();
        assert_eq!(image.rootfs().await.unwrap().len(), 1);
        client.delete_image("a").await.unwrap();
        assert!(client.get_image("a").unwrap_err().is_not_found());
        // Blobs are untouched by image deletion.
        assert_eq!(content.len(), 3);
        assert!(content.exists(&image.config().await.unwrap().digest).await.unwrap());
    }

    #[tokio::test]
    async fn open_uses_configured_registry() {
        let dir = tempfile::tempdir().unwrap();
        let registry_dir = dir.path().join("registry");
        {
            let registry = open_registry(&registry_dir).await.unwrap();
            let manifest = seed_image(registry.content().as_ref(), "amd64", 2).await;
            registry
                .images()
                .put(&Image::new("disk/app:1", manifest))
                .unwrap();
        }

        let config = ClientConfig {
            root: dir.path().join("root"),
            remote: crate::config::RemoteConfig {
                registry: Some(registry_dir),
            },
            ..Default::default()
        };
        let client = Client::open(&config).await.unwrap();
        client.pull("disk/app:1", RemoteContext::new()).await.unwrap();

        let reopened = Client::open(&config).await.unwrap();
        let image = reopened.get_image("disk/app:1").unwrap();
        assert_eq!(image.layers().await.unwrap().len(), 2);
        assert_eq!(reopened.content().list().await.unwrap().len(), 4);
    }
}
