//! Handlers: the unit of composition for image graph behaviour.
//!
//! A [`Handler`] looks at one [`Descriptor`] and decides which children the
//! walk should descend into. Handlers are composed into a [`Handlers`] chain
//! that runs them in order over the same node.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use cask_types::Descriptor;

use crate::error::ImageResult;

/// Outcome of running a handler on one node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Flow {
    /// Descend into these children.
    Continue(Vec<Descriptor>),
    /// Halt processing of this node here.
    ///
    /// Inside a [`Handlers`] chain, later handlers are skipped and the
    /// children gathered by earlier handlers still stand. Returned by a
    /// handler used on its own, the node has no children to descend into.
    Stop,
}

impl Flow {
    /// A leaf: continue with no children.
    pub fn leaf() -> Self {
        Self::Continue(Vec::new())
    }
}

/// Maps a descriptor to the children the walk should visit.
///
/// `children` holds what earlier handlers in the chain produced for this
/// node; a handler may pass it through, extend it, filter it, or replace it.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, desc: &Descriptor, children: Vec<Descriptor>) -> ImageResult<Flow>;
}

#[async_trait]
impl<H: Handler + ?Sized> Handler for Arc<H> {
    async fn handle(&self, desc: &Descriptor, children: Vec<Descriptor>) -> ImageResult<Flow> {
        (**self).handle(desc, children).await
    }
}

/// An ordered chain of handlers applied to the same node.
///
/// Each handler receives the children list produced so far. The first
/// [`Flow::Stop`] ends the chain for that node and the list gathered before
/// it is returned; the first error fails the node. The chain itself always
/// yields [`Flow::Continue`] on success.
#[derive(Clone, Default)]
pub struct Handlers {
    chain: Vec<Arc<dyn Handler>>,
}

impl Handlers {
    pub fn new(chain: Vec<Arc<dyn Handler>>) -> Self {
        Self { chain }
    }

    /// Append a handler to the end of the chain.
    pub fn push(&mut self, handler: Arc<dyn Handler>) {
        self.chain.push(handler);
    }

    /// Builder-style [`push`](Self::push).
    pub fn with(mut self, handler: Arc<dyn Handler>) -> Self {
        self.push(handler);
        self
    }

    pub fn len(&self) -> usize {
        self.chain.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }
}

impl std::fmt::Debug for Handlers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handlers").field("len", &self.chain.len()).finish()
    }
}

#[async_trait]
impl Handler for Handlers {
    async fn handle(&self, desc: &Descriptor, children: Vec<Descriptor>) -> ImageResult<Flow> {
        let mut children = children;
        for handler in &self.chain {
            match handler.handle(desc, children.clone()).await? {
                Flow::Continue(next) => children = next,
                Flow::Stop => break,
            }
        }
        Ok(Flow::Continue(children))
    }
}

/// Handler built from a closure that returns *additional* children.
///
/// `Flow::Continue(extra)` appends `extra` to the list from earlier
/// handlers; `Flow::Stop` stops the chain.
pub struct HandlerFn<F> {
    f: F,
}

/// Wrap a closure as a [`Handler`].
pub fn handler_fn<F, Fut>(f: F) -> HandlerFn<F>
where
    F: Fn(Descriptor) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ImageResult<Flow>> + Send + 'static,
{
    HandlerFn { f }
}

#[async_trait]
impl<F, Fut> Handler for HandlerFn<F>
where
    F: Fn(Descriptor) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ImageResult<Flow>> + Send + 'static,
{
    async fn handle(&self, desc: &Descriptor, children: Vec<Descriptor>) -> ImageResult<Flow> {
        match (self.f)(desc.clone()).await? {
            Flow::Continue(extra) => {
                let mut children = children;
                children.extend(extra);
                Ok(Flow::Continue(children))
            }
            Flow::Stop => Ok(Flow::Stop),
        }
    }
}
