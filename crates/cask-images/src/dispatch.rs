//! Graph traversal drivers.
//!
//! [`dispatch`] fans a handler out over the image graph with one task per
//! node; [`walk`] is the sequential, depth-first counterpart. Both visit each
//! digest at most once per call.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{debug, warn};

use cask_types::{Descriptor, Digest};

use crate::error::{ImageError, ImageResult};
use crate::handler::{Flow, Handler};

/// Run `handler` over the graph rooted at `roots`, concurrently.
///
/// Every node runs in its own task inside a single [`JoinSet`]. Children
/// returned by a node are spawned as they come in, unless their digest was
/// already visited during this call. The first error aborts all outstanding
/// tasks and is returned; committed side effects of finished nodes stay.
pub async fn dispatch(handler: Arc<dyn Handler>, roots: Vec<Descriptor>) -> ImageResult<()> {
    let mut visited: HashSet<Digest> = HashSet::new();
    let mut tasks: JoinSet<ImageResult<Vec<Descriptor>>> = JoinSet::new();

    for root in roots {
        spawn_node(&mut tasks, &mut visited, &handler, root);
    }

    let mut nodes = 0usize;
    while let Some(joined) = tasks.join_next().await {
        let outcome = match joined {
            Ok(outcome) => outcome,
            Err(e) => {
                tasks.abort_all();
                return Err(ImageError::Task(e.to_string()));
            }
        };
        match outcome {
            Ok(children) => {
                nodes += 1;
                for child in children {
                    spawn_node(&mut tasks, &mut visited, &handler, child);
                }
            }
            Err(e) => {
                warn!(error = %e, outstanding = tasks.len(), "dispatch failed, cancelling");
                tasks.abort_all();
                return Err(e);
            }
        }
    }

    debug!(nodes, "dispatch complete");
    Ok(())
}

fn spawn_node(
    tasks: &mut JoinSet<ImageResult<Vec<Descriptor>>>,
    visited: &mut HashSet<Digest>,
    handler: &Arc<dyn Handler>,
    desc: Descriptor,
) {
    if !visited.insert(desc.digest.clone()) {
        return;
    }
    let handler = Arc::clone(handler);
    tasks.spawn(async move { run_node(handler.as_ref(), &desc).await });
}

async fn run_node<H: Handler + ?Sized>(handler: &H, desc: &Descriptor) -> ImageResult<Vec<Descriptor>> {
    match handler.handle(desc, Vec::new()).await? {
        Flow::Continue(children) => Ok(children),
        Flow::Stop => Ok(Vec::new()),
    }
}

/// Run `handler` over the graph rooted at `roots`, one node at a time.
///
/// Nodes are visited depth-first in the order handlers return them.
pub async fn walk<H: Handler + ?Sized>(handler: &H, roots: Vec<Descriptor>) -> ImageResult<()> {
    let mut visited: HashSet<Digest> = HashSet::new();
    let mut stack: Vec<Descriptor> = roots.into_iter().rev().collect();

    while let Some(desc) = stack.pop() {
        if !visited.insert(desc.digest.clone()) {
            continue;
        }
        let children = run_node(handler, &desc).await?;
        stack.extend(children.into_iter().rev());
    }
    Ok(())
}
