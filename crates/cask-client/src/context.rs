use std::sync::Arc;

use cask_images::Handler;
use cask_remotes::{Pusher, Resolver};

/// Wraps the pusher of a push call, e.g. to observe what is uploaded.
pub type PushWrapper = Arc<dyn Fn(Arc<dyn Pusher>) -> Arc<dyn Pusher> + Send + Sync>;

/// Per-call options for [`Client::pull`](crate::Client::pull) and
/// [`Client::push`](crate::Client::push).
#[derive(Clone, Default)]
pub struct RemoteContext {
    /// Overrides the client's resolver for this call.
    pub resolver: Option<Arc<dyn Resolver>>,
    /// Unpack the image after pulling it.
    pub unpack: bool,
    /// Applied to the pusher before any blob is uploaded.
    pub push_wrapper: Option<PushWrapper>,
    /// Run on every node before the operation's own handlers.
    pub base_handlers: Vec<Arc<dyn Handler>>,
}

impl RemoteContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn Resolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn with_unpack(mut self, unpack: bool) -> Self {
        self.unpack = unpack;
        self
    }

    pub fn with_push_wrapper<F>(mut self, wrapper: F) -> Self
    where
        F: Fn(Arc<dyn Pusher>) -> Arc<dyn Pusher> + Send + Sync + 'static,
    {
        self.push_wrapper = Some(Arc::new(wrapper));
        self
    }

    /// Append a base handler. Base handlers run in the order added.
    pub fn with_handler(mut self, handler: Arc<dyn Handler>) -> Self {
        self.base_handlers.push(handler);
        self
    }
}

impl std::fmt::Debug for RemoteContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteContext")
            .field("resolver", &self.resolver.is_some())
            .field("unpack", &self.unpack)
            .field("push_wrapper", &self.push_wrapper.is_some())
            .field("base_handlers", &self.base_handlers.len())
            .finish()
    }
}
