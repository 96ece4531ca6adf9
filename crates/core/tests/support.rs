#![allow(dead_code)]

use async_trait::async_trait;
use lazytree_core::{
    FetchKey, LoaderConfig, NodeId, OutputNode, SourceNode, StaticNode, StaticTreeSource, Tree,
    TreeEngine, TreeSource, TreeState,
};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;

/// Static source that counts calls per key, can hold every call open and can
/// reject chosen keys.
pub struct CountingSource {
    inner: StaticTreeSource<()>,
    calls: Mutex<HashMap<FetchKey, usize>>,
    failing: Mutex<HashSet<FetchKey>>,
    gate: watch::Sender<bool>,
}

impl CountingSource {
    pub fn new(nodes: Vec<StaticNode<()>>) -> Self {
        let (gate, _) = watch::channel(true);
        Self {
            inner: StaticTreeSource::new(nodes).expect("valid static tree"),
            calls: Mutex::new(HashMap::new()),
            failing: Mutex::new(HashSet::new()),
            gate,
        }
    }

    /// ```text
    /// a
    /// ├─ aa
    /// └─ ab
    ///    ├─ aba
    ///    └─ abb
    /// b
    /// c
    /// └─ ca
    /// ```
    pub fn sample() -> Self {
        Self::new(vec![
            StaticNode::new(
                "a",
                (),
                vec![
                    StaticNode::leaf("aa", ()),
                    StaticNode::new(
                        "ab",
                        (),
                        vec![StaticNode::leaf("aba", ()), StaticNode::leaf("abb", ())],
                    ),
                ],
            ),
            StaticNode::leaf("b", ()),
            StaticNode::new("c", (), vec![StaticNode::leaf("ca", ())]),
        ])
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.inner = self.inner.with_latency(latency);
        self
    }

    /// Keep every call pending until [`Self::release`].
    pub fn hold(&self) {
        self.gate.send_replace(false);
    }

    pub fn release(&self) {
        self.gate.send_replace(true);
    }

    pub fn fail(&self, key: FetchKey) {
        self.failing.lock().unwrap().insert(key);
    }

    pub fn heal(&self, key: &FetchKey) {
        self.failing.lock().unwrap().remove(key);
    }

    pub fn calls(&self, key: &FetchKey) -> usize {
        self.calls.lock().unwrap().get(key).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }

    async fn enter(&self, key: FetchKey) -> anyhow::Result<()> {
        *self.calls.lock().unwrap().entry(key.clone()).or_default() += 1;
        let mut gate = self.gate.subscribe();
        gate.wait_for(|open| *open).await?;
        if self.failing.lock().unwrap().contains(&key) {
            anyhow::bail!("simulated outage for {key}");
        }
        Ok(())
    }
}

#[async_trait]
impl TreeSource<()> for CountingSource {
    async fn children(&self, id: Option<&NodeId>) -> anyhow::Result<Vec<SourceNode<()>>> {
        let key = match id {
            None => FetchKey::Root,
            Some(id) => FetchKey::Children(id.clone()),
        };
        self.enter(key).await?;
        self.inner.children(id).await
    }

    async fn trail(&self, id: &NodeId) -> anyhow::Result<Vec<SourceNode<()>>> {
        self.enter(FetchKey::Trail(id.clone())).await?;
        self.inner.trail(id).await
    }
}

pub fn children(id: &str) -> FetchKey {
    FetchKey::Children(id.to_string())
}

pub fn trail(id: &str) -> FetchKey {
    FetchKey::Trail(id.to_string())
}

pub fn start(source: &Arc<CountingSource>, state: TreeState) -> TreeEngine<()> {
    start_with(source, state, LoaderConfig::default())
}

pub fn start_with(
    source: &Arc<CountingSource>,
    state: TreeState,
    config: LoaderConfig,
) -> TreeEngine<()> {
    let source: Arc<dyn TreeSource<()>> = source.clone();
    TreeEngine::start(source, state, config).expect("engine starts")
}

/// Wait for a settled tree that also satisfies `pred`.
pub async fn settle_on<F>(engine: &TreeEngine<()>, mut pred: F) -> Arc<Tree<()>>
where
    F: FnMut(&Tree<()>) -> bool,
{
    tokio::time::timeout(
        Duration::from_secs(5),
        engine.wait_for(|tree| tree.is_settled() && pred(tree)),
    )
    .await
    .expect("tree settles in time")
    .expect("engine still running")
}

pub async fn settled(engine: &TreeEngine<()>) -> Arc<Tree<()>> {
    settle_on(engine, |_| true).await
}

pub fn ids(items: &[Arc<OutputNode<()>>]) -> Vec<&str> {
    items.iter().map(|node| node.id()).collect()
}

pub fn expanded(tree: &Tree<()>, id: &str) -> bool {
    tree.node(id).is_some_and(|node| node.is_expanded)
}
