//! Handlers that move blobs between a local content store and a remote.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use cask_content::{copy, ContentError, ContentStore, Provider};
use cask_images::{Flow, Handler, ImageResult};
use cask_types::Descriptor;

use crate::traits::{Fetcher, Pusher};

/// Ingest ref used when fetching `desc`.
///
/// Stable per digest so an interrupted fetch is resumed by the next pull.
pub fn fetch_ref(desc: &Descriptor) -> String {
    format!("fetch-{}", desc.digest)
}

/// Download `desc` into `store` unless it is already there.
pub async fn fetch_blob<S>(store: &S, fetcher: &dyn Fetcher, desc: &Descriptor) -> ImageResult<()>
where
    S: ContentStore + ?Sized,
{
    if store.exists(&desc.digest).await? {
        debug!(digest = %desc.digest, "content already present");
        return Ok(());
    }

    let reference = fetch_ref(desc);
    let mut writer = match store
        .writer(&reference, Some(desc.size), Some(&desc.digest))
        .await
    {
        Ok(writer) => writer,
        Err(ContentError::AlreadyExists(_)) => return Ok(()),
        Err(e) => return Err(e.into()),
    };

    let source = match fetcher.fetch(desc).await {
        Ok(source) => source,
        Err(e) => {
            writer.close().await?;
            return Err(e.into());
        }
    };
    let copied = copy(writer.as_mut(), source, desc.size, &desc.digest).await;
    let closed = writer.close().await;
    copied?;
    closed?;

    info!(
        digest = %desc.digest,
        media_type = %desc.media_type,
        size = desc.size,
        "fetched"
    );
    Ok(())
}

/// Upload `desc` from `store` through `pusher`, unless the remote has it.
pub async fn push_blob<S>(store: &S, pusher: &dyn Pusher, desc: &Descriptor) -> ImageResult<()>
where
    S: Provider + ?Sized,
{
    let mut writer = match pusher.push(desc).await {
        Ok(writer) => writer,
        Err(e) if e.is_already_exists() => {
            debug!(digest = %desc.digest, "remote already has content");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    let source = match store.reader(&desc.digest).await {
        Ok(source) => source,
        Err(e) => {
            writer.close().await?;
            return Err(e.into());
        }
    };
    let copied = copy(writer.as_mut(), source, desc.size, &desc.digest).await;
    let closed = writer.close().await;
    copied?;
    closed?;

    info!(
        digest = %desc.digest,
        media_type = %desc.media_type,
        size = desc.size,
        "pushed"
    );
    Ok(())
}

/// Pull-side handler: makes sure each visited blob is in the local store.
///
/// Children are passed through untouched; pair it with a children handler
/// placed after it.
pub struct FetchHandler<S: ?Sized> {
    store: Arc<S>,
    fetcher: Arc<dyn Fetcher>,
}

impl<S: ?Sized> FetchHandler<S> {
    pub fn new(store: Arc<S>, fetcher: Arc<dyn Fetcher>) -> Self {
        Self { store, fetcher }
    }
}

#[async_trait]
impl<S> Handler for FetchHandler<S>
where
    S: ContentStore + ?Sized + 'static,
{
    async fn handle(&self, desc: &Descriptor, children: Vec<Descriptor>) -> ImageResult<Flow> {
        fetch_blob(self.store.as_ref(), self.fetcher.as_ref(), desc).await?;
        Ok(Flow::Continue(children))
    }
}

/// Push-side handler: uploads each visited blob from the local store.
pub struct PushHandler<S: ?Sized> {
    store: Arc<S>,
    pusher: Arc<dyn Pusher>,
}

impl<S: ?Sized> Clone for PushHandler<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            pusher: Arc::clone(&self.pusher),
        }
    }
}

impl<S: ?Sized> PushHandler<S> {
    pub fn new(store: Arc<S>, pusher: Arc<dyn Pusher>) -> Self {
        Self { store, pusher }
    }
}

impl<S> PushHandler<S>
where
    S: Provider + ?Sized,
{
    /// Upload a single descriptor outside of a dispatch.
    pub async fn push(&self, desc: &Descriptor) -> ImageResult<()> {
        push_blob(self.store.as_ref(), self.pusher.as_ref(), desc).await
    }
}

#[async_trait]
impl<S> Handler for PushHandler<S>
where
    S: Provider + ?Sized + 'static,
{
    async fn handle(&self, desc: &Descriptor, children: Vec<Descriptor>) -> ImageResult<Flow> {
        self.push(desc).await?;
        Ok(Flow::Continue(children))
    }
}
