use crate::error::{Result, TreeError};
use crate::source::TreeSource;
use crate::types::{NodeId, SourceNode};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

/// Nested node definition for [`StaticTreeSource`].
///
/// Deserializes from objects such as `{"id": "a", "label": "A", "children": [...]}`,
/// with every field other than `id` and `children` going into the payload.
#[derive(Debug, Clone, Deserialize)]
pub struct StaticNode<T> {
    pub id: NodeId,
    #[serde(default = "Vec::new")]
    pub children: Vec<StaticNode<T>>,
    #[serde(flatten)]
    pub payload: T,
}

impl<T> StaticNode<T> {
    pub fn new(id: impl Into<NodeId>, payload: T, children: Vec<StaticNode<T>>) -> Self {
        Self {
            id: id.into(),
            children,
            payload,
        }
    }

    pub fn leaf(id: impl Into<NodeId>, payload: T) -> Self {
        Self::new(id, payload, Vec::new())
    }
}

/// In-memory source over a fixed tree, indexed once at construction.
#[derive(Debug, Clone)]
pub struct StaticTreeSource<T> {
    roots: Vec<SourceNode<T>>,
    children: HashMap<NodeId, Vec<SourceNode<T>>>,
    trails: HashMap<NodeId, Vec<SourceNode<T>>>,
    latency: Duration,
}

impl<T: Clone> StaticTreeSource<T> {
    pub fn new(nodes: Vec<StaticNode<T>>) -> Result<Self> {
        let mut source = Self {
            roots: Vec::new(),
            children: HashMap::new(),
            trails: HashMap::new(),
            latency: Duration::ZERO,
        };
        source.roots = source.index(&nodes, &[])?;
        Ok(source)
    }

    /// Answer every request only after `latency` has elapsed.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn len(&self) -> usize {
        self.trails.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trails.is_empty()
    }

    fn index(
        &mut self,
        nodes: &[StaticNode<T>],
        parent_trail: &[SourceNode<T>],
    ) -> Result<Vec<SourceNode<T>>> {
        let mut level = Vec::with_capacity(nodes.len());
        for node in nodes {
            if self.trails.contains_key(&node.id) {
                return Err(TreeError::StaticTree(format!("duplicate node id {}", node.id)));
            }
            let source_node = SourceNode::new(
                node.id.clone(),
                !node.children.is_empty(),
                node.payload.clone(),
            );
            let mut trail = Vec::with_capacity(parent_trail.len() + 1);
            trail.push(source_node.clone());
            trail.extend_from_slice(parent_trail);
            self.trails.insert(node.id.clone(), trail.clone());

            let children = self.index(&node.children, &trail)?;
            if !children.is_empty() {
                self.children.insert(node.id.clone(), children);
            }
            level.push(source_node);
        }
        Ok(level)
    }
}

impl<T: Clone + DeserializeOwned> StaticTreeSource<T> {
    /// Build from a JSON array of [`StaticNode`] objects.
    pub fn from_json(json: &str) -> Result<Self> {
        let nodes: Vec<StaticNode<T>> = serde_json::from_str(json)
            .map_err(|e| TreeError::StaticTree(format!("invalid tree JSON: {e}")))?;
        Self::new(nodes)
    }
}

#[async_trait]
impl<T> TreeSource<T> for StaticTreeSource<T>
where
    T: Clone + Send + Sync + 'static,
{
    async fn children(&self, id: Option<&NodeId>) -> anyhow::Result<Vec<SourceNode<T>>> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        Ok(match id {
            None => self.roots.clone(),
            Some(id) => self.children.get(id).cloned().unwrap_or_default(),
        })
    }

    async fn trail(&self, id: &NodeId) -> anyhow::Result<Vec<SourceNode<T>>> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        Ok(self.trails.get(id).cloned().unwrap_or_default())
    }
}
