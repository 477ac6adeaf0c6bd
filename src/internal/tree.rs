use crate::api::{FetchError, NodeFetcher};
use crate::internal::models::{Node, Tree};
use dashmap::DashMap;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::{Id as TaskId, JoinSet};
use tokio_util::sync::CancellationToken;

/// Ceilings and pool settings for one tree build.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildLimits {
    /// Deepest nesting level fetched; direct replies to the root are level 1.
    pub max_depth: usize,
    /// Safety ceiling on fetched nodes, root included.
    pub max_nodes: usize,
    /// Fetches allowed in flight at once.
    pub concurrency: usize,
    /// Extra attempts for transient failures.
    pub retries: u32,
    /// Backoff before retry `n` is `retry_backoff * n`.
    pub retry_backoff: Duration,
}

pub fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

impl Default for BuildLimits {
    fn default() -> Self {
        Self {
            max_depth: 32,
            max_nodes: 2000,
            concurrency: default_concurrency(),
            retries: 2,
            retry_backoff: Duration::from_millis(200),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    /// Only the root aborts a build; every other failure becomes a stub node.
    #[error("root item unavailable: {0}")]
    RootUnavailable(#[source] FetchError),
    #[error("build cancelled")]
    Cancelled,
}

/// Fetches a root item and its descendants with a bounded pool of fetch tasks.
///
/// The build walks one depth level at a time. The coordinator owns the
/// claimed-id set, so an id that shows up under several parents is fetched
/// once. Children are claimed in parent order, then sibling order, once their
/// whole level has settled; the node and depth ceilings therefore cut the same
/// nodes whatever order fetches complete in. Workers only write the map entry
/// for the id they fetched.
pub struct TreeBuilder<F> {
    fetcher: Arc<F>,
    limits: BuildLimits,
    cancel: CancellationToken,
}

struct Settled {
    id: u32,
    child_ids: Vec<u32>,
}

impl<F: NodeFetcher> TreeBuilder<F> {
    pub fn new(fetcher: Arc<F>, limits: BuildLimits) -> Self {
        Self {
            fetcher,
            limits,
            cancel: CancellationToken::new(),
        }
    }

    /// Stop dispatching fetches once `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub async fn build(&self, root_id: u32) -> Result<Tree, BuildError> {
        self.build_with_progress(root_id, |_| {}).await
    }

    /// Build the tree, reporting the running count of settled nodes.
    pub async fn build_with_progress(
        &self,
        root_id: u32,
        mut on_progress: impl FnMut(usize) + Send,
    ) -> Result<Tree, BuildError> {
        if self.cancel.is_cancelled() {
            return Err(BuildError::Cancelled);
        }

        let fetched = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(BuildError::Cancelled),
            fetched = fetch_with_retry(&*self.fetcher, root_id, &self.limits, &self.cancel) => fetched,
        };
        let root = fetched.map_err(BuildError::RootUnavailable)?;

        let nodes: Arc<DashMap<u32, Arc<Node>>> = Arc::new(DashMap::new());
        let mut claimed: HashSet<u32> = HashSet::from([root_id]);
        let (mut level, mut truncated) =
            self.claim_level([root.child_ids.as_slice()], 1, &mut claimed);

        let root = Arc::new(root);
        let mut settled = 1;
        on_progress(settled);

        let mut depth = 1;
        while !level.is_empty() {
            let fetched = self
                .fetch_level(&level, &nodes, &mut settled, &mut on_progress)
                .await;
            let children = match fetched {
                Ok(children) => children,
                Err(err) => {
                    tracing::info!(root_id, settled, "tree build cancelled");
                    return Err(err);
                }
            };
            tracing::trace!(depth, nodes = level.len(), "level settled");

            depth += 1;
            let parents = level
                .iter()
                .filter_map(|id| children.get(id).map(Vec::as_slice));
            let (next, cut) = self.claim_level(parents, depth, &mut claimed);
            truncated |= cut;
            level = next;
        }

        let nodes: HashMap<u32, Arc<Node>> = match Arc::try_unwrap(nodes) {
            Ok(nodes) => nodes.into_iter().collect(),
            Err(shared) => shared
                .iter()
                .map(|entry| (*entry.key(), Arc::clone(entry.value())))
                .collect(),
        };
        let tree = Tree::from_parts(root, nodes, truncated);

        tracing::info!(
            root_id,
            nodes = tree.node_count(),
            failed = tree.failed_count(),
            truncated = tree.truncated(),
            "tree build finished"
        );
        Ok(tree)
    }

    /// Fetch every id of one level with at most `concurrency` fetches in
    /// flight. Returns each settled id's child list.
    async fn fetch_level(
        &self,
        level: &[u32],
        nodes: &Arc<DashMap<u32, Arc<Node>>>,
        settled: &mut usize,
        on_progress: &mut (impl FnMut(usize) + Send),
    ) -> Result<HashMap<u32, Vec<u32>>, BuildError> {
        let concurrency = self.limits.concurrency.max(1);
        let mut pending = level.iter().copied();
        let mut workers: JoinSet<Settled> = JoinSet::new();
        let mut in_flight: HashMap<TaskId, u32> = HashMap::new();
        let mut children: HashMap<u32, Vec<u32>> = HashMap::with_capacity(level.len());

        loop {
            while workers.len() < concurrency && !self.cancel.is_cancelled() {
                let Some(id) = pending.next() else {
                    break;
                };
                let handle = workers.spawn(fetch_worker(
                    Arc::clone(&self.fetcher),
                    Arc::clone(nodes),
                    self.limits.clone(),
                    self.cancel.clone(),
                    id,
                ));
                in_flight.insert(handle.id(), id);
            }

            let joined = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    // Outstanding fetches finish in the background and are discarded.
                    workers.detach_all();
                    return Err(BuildError::Cancelled);
                }
                joined = workers.join_next_with_id() => joined,
            };

            let Some(joined) = joined else {
                break;
            };

            match joined {
                Ok((task_id, done)) => {
                    in_flight.remove(&task_id);
                    tracing::trace!(id = done.id, "node settled");
                    children.insert(done.id, done.child_ids);
                }
                Err(err) => {
                    // A worker that panicked still owes the tree an entry.
                    if let Some(id) = in_flight.remove(&err.id()) {
                        tracing::warn!(id, "fetch task failed: {}", err);
                        nodes.insert(id, Arc::new(Node::failed(id)));
                    }
                }
            }

            *settled += 1;
            on_progress(*settled);
        }
        Ok(children)
    }

    /// Claim the children of `parents`, in order, as the level at `depth`.
    /// The flag is true when a ceiling forced some of them to be skipped.
    fn claim_level<'a>(
        &self,
        parents: impl IntoIterator<Item = &'a [u32]>,
        depth: usize,
        claimed: &mut HashSet<u32>,
    ) -> (Vec<u32>, bool) {
        let mut level = Vec::new();
        for child_ids in parents {
            if child_ids.is_empty() {
                continue;
            }
            if depth > self.limits.max_depth {
                return (level, true);
            }
            for &child in child_ids {
                if claimed.contains(&child) {
                    continue;
                }
                if claimed.len() >= self.limits.max_nodes {
                    return (level, true);
                }
                claimed.insert(child);
                level.push(child);
            }
        }
        (level, false)
    }
}

async fn fetch_worker<F: NodeFetcher>(
    fetcher: Arc<F>,
    nodes: Arc<DashMap<u32, Arc<Node>>>,
    limits: BuildLimits,
    cancel: CancellationToken,
    id: u32,
) -> Settled {
    let node = match fetch_with_retry(&*fetcher, id, &limits, &cancel).await {
        Ok(node) => node,
        Err(err) => {
            tracing::warn!(id, kind = %err.kind, "recording failed node: {}", err.message);
            Node::failed(id)
        }
    };
    let child_ids = node.child_ids.clone();
    nodes.insert(id, Arc::new(node));
    Settled { id, child_ids }
}

async fn fetch_with_retry<F: NodeFetcher>(
    fetcher: &F,
    id: u32,
    limits: &BuildLimits,
    cancel: &CancellationToken,
) -> Result<Node, FetchError> {
    let mut attempt = 0;
    loop {
        match fetcher.fetch(id).await {
            Ok(node) => return Ok(node),
            Err(err) if err.is_transient() && attempt < limits.retries && !cancel.is_cancelled() => {
                attempt += 1;
                tracing::debug!(id, attempt, "retrying after transient failure: {}", err.message);
                tokio::time::sleep(limits.retry_backoff * attempt).await;
            }
            Err(err) => return Err(err),
        }
    }
}
