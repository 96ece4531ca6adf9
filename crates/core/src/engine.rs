use crate::config::LoaderConfig;
use crate::controller::{Command, TreeController};
use crate::error::{FetchFailure, Result, TreeError};
use crate::expansion::ExpansionResolver;
use crate::loader::{BatchId, ChildrenLoader};
use crate::reconcile::Reconciler;
use crate::request_cache::{FetchKey, FetchResult, RequestCache, SharedFetch};
use crate::source::TreeSource;
use crate::trail::TrailResolver;
use crate::types::{NodeId, SourceNode, Tree, TreeState};
use futures::future::join_all;
use log::{debug, trace, warn};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::time::{self, Instant};

type Nodes<T> = Vec<Arc<SourceNode<T>>>;

enum Completion<T> {
    Root(FetchResult<Nodes<T>>),
    Trail {
        id: NodeId,
        result: FetchResult<Nodes<T>>,
    },
    Children {
        batch: BatchId,
        results: Vec<(NodeId, FetchResult<Nodes<T>>)>,
    },
}

/// Handle to a running tree engine.
///
/// The engine owns every cache and runs on its own task; this handle reads the
/// published snapshots and hands out controllers. Dropping the last clone of
/// the handle stops the engine.
pub struct TreeEngine<T> {
    inner: Arc<TreeEngineInner<T>>,
}

struct TreeEngineInner<T> {
    controller: TreeController<T>,
    tree_rx: watch::Receiver<Arc<Tree<T>>>,
    state_rx: watch::Receiver<TreeState>,
}

impl<T> Clone for TreeEngine<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> TreeEngine<T>
where
    T: Send + Sync + 'static,
{
    /// Bind a new engine to `source` and start loading the root set.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        source: Arc<dyn TreeSource<T>>,
        state: TreeState,
        config: LoaderConfig,
    ) -> Result<Self> {
        config.validate()?;
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| TreeError::NoRuntime)?;

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (completion_tx, completion_rx) = mpsc::unbounded_channel();
        let (tree_tx, tree_rx) = watch::channel(Arc::new(Tree::initial()));
        let (state_tx, state_rx) = watch::channel(state.clone());

        let engine = EngineLoop {
            source,
            state,
            cache: RequestCache::new(),
            trails: TrailResolver::new(),
            loader: ChildrenLoader::new(config.loading_transition()),
            reconciler: Reconciler::new(),
            roots: Vec::new(),
            root_loading: true,
            root_failure: None,
            trail_in_flight: HashSet::new(),
            trail_failures: HashMap::new(),
            tree: tree_rx.borrow().clone(),
            completion_tx,
            tree_tx,
            state_tx,
        };
        runtime.spawn(engine.run(command_rx, completion_rx));

        Ok(Self {
            inner: Arc::new(TreeEngineInner {
                controller: TreeController::new(command_tx),
                tree_rx,
                state_rx,
            }),
        })
    }

    pub fn controller(&self) -> TreeController<T> {
        self.inner.controller.clone()
    }

    /// The latest published tree.
    pub fn snapshot(&self) -> Arc<Tree<T>> {
        self.inner.tree_rx.borrow().clone()
    }

    pub fn state(&self) -> TreeState {
        self.inner.state_rx.borrow().clone()
    }

    /// Receiver notified whenever a tree that differs from the previous one is published.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Arc<Tree<T>>> {
        self.inner.tree_rx.clone()
    }

    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<TreeState> {
        self.inner.state_rx.clone()
    }

    /// Wait for the first published tree satisfying `pred`, starting with the current one.
    pub async fn wait_for<F>(&self, mut pred: F) -> Result<Arc<Tree<T>>>
    where
        F: FnMut(&Tree<T>) -> bool,
    {
        let mut rx = self.subscribe();
        let tree = rx
            .wait_for(|tree| pred(tree.as_ref()))
            .await
            .map_err(|_| TreeError::EngineClosed)?;
        Ok(tree.clone())
    }

    /// Wait until nothing is loading and no fetch is outstanding.
    pub async fn settled(&self) -> Result<Arc<Tree<T>>> {
        self.wait_for(Tree::is_settled).await
    }
}

// Runs once, when the last handle clone lets go of the shared state.
impl<T> Drop for TreeEngineInner<T> {
    fn drop(&mut self) {
        self.controller.shutdown();
    }
}

struct EngineLoop<T> {
    source: Arc<dyn TreeSource<T>>,
    state: TreeState,
    cache: RequestCache<Nodes<T>>,
    trails: TrailResolver<T>,
    loader: ChildrenLoader<T>,
    reconciler: Reconciler<T>,
    roots: Nodes<T>,
    root_loading: bool,
    root_failure: Option<FetchFailure>,
    trail_in_flight: HashSet<NodeId>,
    trail_failures: HashMap<NodeId, FetchFailure>,
    tree: Arc<Tree<T>>,
    completion_tx: mpsc::UnboundedSender<Completion<T>>,
    tree_tx: watch::Sender<Arc<Tree<T>>>,
    state_tx: watch::Sender<TreeState>,
}

impl<T> EngineLoop<T>
where
    T: Send + Sync + 'static,
{
    async fn run(
        mut self,
        mut command_rx: mpsc::UnboundedReceiver<Command<T>>,
        mut completion_rx: mpsc::UnboundedReceiver<Completion<T>>,
    ) {
        self.request_root();
        self.react();

        loop {
            let next_reveal = self.loader.next_reveal();

            tokio::select! {
                cmd = command_rx.recv() => {
                    match cmd {
                        Some(Command::Update(update)) => {
                            let next = update(&self.state, self.tree.as_ref());
                            self.set_state(next);
                        }
                        Some(Command::Retry(key)) => self.retry(key),
                        Some(Command::Flush(reply)) => {
                            let _ = reply.send(());
                            continue;
                        }
                        Some(Command::Shutdown) | None => break,
                    }
                }
                Some(done) = completion_rx.recv() => self.complete(done),
                () = async {
                    if let Some(deadline) = next_reveal {
                        time::sleep_until(deadline).await;
                    }
                }, if next_reveal.is_some() => {
                    self.loader.reveal_due(Instant::now());
                }
            }

            self.react();
        }
        debug!("tree engine stopped");
    }

    /// One reactive pass: resolve the active trail, request missing children,
    /// then reconcile and publish.
    fn react(&mut self) {
        self.request_active_trail();
        let active_trail_ids = self.trails.active_trail_ids(self.state.active_id.as_deref());
        let ids = self.loader.plan(&self.state, &active_trail_ids);
        if !ids.is_empty() {
            self.request_children(ids);
        }
        self.publish(active_trail_ids);
    }

    fn set_state(&mut self, next: TreeState) {
        if next != self.state {
            self.state = next;
            self.state_tx.send_replace(self.state.clone());
        }
    }

    fn load_once(&mut self, key: FetchKey) -> SharedFetch<Nodes<T>> {
        let source = self.source.clone();
        self.cache.load_once(key.clone(), move || {
            debug!("fetching {key}");
            fetch_nodes(source, key)
        })
    }

    fn request_root(&mut self) {
        self.root_loading = true;
        let fetch = self.load_once(FetchKey::Root);
        let tx = self.completion_tx.clone();
        tokio::spawn(async move {
            let _ = tx.send(Completion::Root(fetch.await));
        });
    }

    fn request_active_trail(&mut self) {
        let Some(id) = self.state.active_id.clone() else {
            return;
        };
        if self.trails.is_resolved(&id)
            || self.trail_in_flight.contains(&id)
            || self.trail_failures.contains_key(&id)
        {
            return;
        }
        self.trail_in_flight.insert(id.clone());
        let fetch = self.load_once(FetchKey::Trail(id.clone()));
        let tx = self.completion_tx.clone();
        tokio::spawn(async move {
            let result = fetch.await;
            let _ = tx.send(Completion::Trail { id, result });
        });
    }

    fn request_children(&mut self, ids: Vec<NodeId>) {
        let batch = self.loader.begin_batch(ids.clone(), Instant::now());
        let fetches: Vec<_> = ids
            .into_iter()
            .map(|id| {
                let fetch = self.load_once(FetchKey::Children(id.clone()));
                async move { (id, fetch.await) }
            })
            .collect();
        let tx = self.completion_tx.clone();
        tokio::spawn(async move {
            let results = join_all(fetches).await;
            let _ = tx.send(Completion::Children { batch, results });
        });
    }

    fn complete(&mut self, done: Completion<T>) {
        match done {
            Completion::Root(result) => {
                self.root_loading = false;
                match result {
                    Ok(nodes) => {
                        debug!("loaded {} root nodes", nodes.len());
                        self.trails.register_children(None, &nodes);
                        self.loader.remember_nodes(&nodes);
                        self.roots = nodes;
                    }
                    Err(failure) => {
                        warn!("{failure}");
                        self.root_failure = Some(failure);
                    }
                }
            }
            Completion::Trail { id, result } => {
                self.trail_in_flight.remove(&id);
                match result {
                    Ok(chain) => {
                        let added = self.trails.register_lookup(&id, &chain);
                        self.loader.remember_nodes(&chain);
                        debug!("trail for {id} resolved, {added} new trails");
                    }
                    Err(failure) => {
                        warn!("{failure}");
                        self.trail_failures.insert(id, failure);
                    }
                }
            }
            Completion::Children { batch, results } => {
                for (parent, children) in self.loader.settle_batch(batch, results) {
                    self.trails.register_children(Some(&parent), &children);
                }
            }
        }
    }

    fn retry(&mut self, key: FetchKey) {
        let failed = match &key {
            FetchKey::Root => self.root_failure.take().is_some(),
            FetchKey::Children(id) => self.loader.clear_failure(id),
            FetchKey::Trail(id) => self.trail_failures.remove(id).is_some(),
        };
        if !failed {
            debug!("retry of {key} ignored: no recorded failure");
            return;
        }
        self.cache.invalidate(&key);
        if key == FetchKey::Root {
            self.request_root();
        }
    }

    fn in_flight(&self) -> usize {
        usize::from(self.root_loading) + self.trail_in_flight.len() + self.loader.in_flight_count()
    }

    fn publish(&mut self, active_trail_ids: Vec<NodeId>) {
        let flags = ExpansionResolver::new(&self.state, &active_trail_ids);
        let items = self.reconciler.reconcile(&self.roots, &self.loader, &flags);
        let trail_failure = self
            .state
            .active_id
            .as_ref()
            .and_then(|id| self.trail_failures.get(id))
            .cloned();
        let next = Tree {
            items,
            is_loading: self.root_loading,
            failure: self.root_failure.clone(),
            active_trail_ids,
            trail_failure,
            in_flight: self.in_flight(),
            nodes: Arc::default(),
        };
        if next.same_as(&self.tree) {
            trace!("reconciled tree unchanged");
            return;
        }
        let next = Tree {
            nodes: self.reconciler.index(),
            ..next
        };
        self.tree = Arc::new(next);
        self.tree_tx.send_replace(self.tree.clone());
    }
}

fn fetch_nodes<T>(
    source: Arc<dyn TreeSource<T>>,
    key: FetchKey,
) -> impl Future<Output = FetchResult<Nodes<T>>> + Send + 'static
where
    T: Send + Sync + 'static,
{
    async move {
        let result = match &key {
            FetchKey::Root => source.children(None).await,
            FetchKey::Children(id) => source.children(Some(id)).await,
            FetchKey::Trail(id) => source.trail(id).await,
        };
        result
            .map(|nodes| nodes.into_iter().map(Arc::new).collect())
            .map_err(|err| FetchFailure::new(key, &err))
    }
}
