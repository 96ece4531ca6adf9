use crate::error::FetchFailure;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Opaque node identifier, stable for the lifetime of an engine.
pub type NodeId = String;

/// A node as delivered by a [`TreeSource`](crate::TreeSource). Immutable once returned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceNode<T> {
    pub id: NodeId,
    pub has_children: bool,
    pub payload: T,
}

impl<T> SourceNode<T> {
    pub fn new(id: impl Into<NodeId>, has_children: bool, payload: T) -> Self {
        Self {
            id: id.into(),
            has_children,
            payload,
        }
    }

    pub fn leaf(id: impl Into<NodeId>, payload: T) -> Self {
        Self::new(id, false, payload)
    }

    pub fn branch(id: impl Into<NodeId>, payload: T) -> Self {
        Self::new(id, true, payload)
    }
}

/// A list of items paired with its loading flag.
///
/// `failure` is set instead of `is_loading` when the fetch behind the list
/// rejected; the list then stays empty until the key is retried.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadableCollection<X> {
    pub is_loading: bool,
    pub items: Vec<X>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FetchFailure>,
}

impl<X> LoadableCollection<X> {
    pub fn loading() -> Self {
        Self {
            is_loading: true,
            items: Vec::new(),
            failure: None,
        }
    }

    pub fn loaded(items: Vec<X>) -> Self {
        Self {
            is_loading: false,
            items,
            failure: None,
        }
    }

    pub fn failed(failure: FetchFailure) -> Self {
        Self {
            is_loading: false,
            items: Vec::new(),
            failure: Some(failure),
        }
    }
}

impl<X> Default for LoadableCollection<X> {
    fn default() -> Self {
        Self::loaded(Vec::new())
    }
}

/// Declarative, caller-owned tree state.
///
/// A missing key in `expanded_ids` means "no explicit preference": the node
/// then follows its active-trail membership.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeState {
    pub active_id: Option<NodeId>,
    pub expanded_ids: BTreeMap<NodeId, bool>,
}

impl TreeState {
    pub fn with_active(id: impl Into<NodeId>) -> Self {
        Self {
            active_id: Some(id.into()),
            ..Default::default()
        }
    }

    /// The explicit override for `id`, if any.
    pub fn explicit_expansion(&self, id: &str) -> Option<bool> {
        self.expanded_ids.get(id).copied()
    }

    /// Ids explicitly set to expanded, in key order.
    pub fn explicitly_expanded(&self) -> impl Iterator<Item = &NodeId> {
        self.expanded_ids
            .iter()
            .filter(|(_, expanded)| **expanded)
            .map(|(id, _)| id)
    }
}

/// A published, render-ready node.
#[derive(Debug, Serialize)]
pub struct OutputNode<T> {
    #[serde(flatten)]
    pub source: Arc<SourceNode<T>>,
    pub is_expanded: bool,
    pub is_active: bool,
    pub is_active_trail: bool,
    pub depth: usize,
    pub children: LoadableCollection<Arc<OutputNode<T>>>,
}

impl<T> OutputNode<T> {
    pub fn id(&self) -> &str {
        &self.source.id
    }

    pub fn has_children(&self) -> bool {
        self.source.has_children
    }

    pub fn payload(&self) -> &T {
        &self.source.payload
    }
}

/// The published read model.
#[derive(Debug, Serialize)]
pub struct Tree<T> {
    pub items: Vec<Arc<OutputNode<T>>>,
    pub is_loading: bool,
    /// Set when the root fetch rejected.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FetchFailure>,
    /// Active node first, root last.
    pub active_trail_ids: Vec<NodeId>,
    /// Set when the trail lookup for the active id rejected.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trail_failure: Option<FetchFailure>,
    /// Outstanding fetches of any kind, including ones whose loading flag is
    /// still held back by the loading transition.
    pub in_flight: usize,
    #[serde(skip)]
    pub(crate) nodes: Arc<HashMap<NodeId, Arc<OutputNode<T>>>>,
}

impl<T> Tree<T> {
    /// The tree before anything has loaded.
    pub fn initial() -> Self {
        Self {
            items: Vec::new(),
            is_loading: true,
            failure: None,
            active_trail_ids: Vec::new(),
            trail_failure: None,
            in_flight: 0,
            nodes: Arc::default(),
        }
    }

    /// Latest output node produced for `id`, whether or not it is still reachable.
    pub fn node(&self, id: &str) -> Option<&Arc<OutputNode<T>>> {
        self.nodes.get(id)
    }

    pub fn nodes(&self) -> &HashMap<NodeId, Arc<OutputNode<T>>> {
        &self.nodes
    }

    pub fn is_on_active_trail(&self, id: &str) -> bool {
        self.active_trail_ids.iter().any(|trail_id| trail_id == id)
    }

    pub fn is_settled(&self) -> bool {
        self.in_flight == 0 && !self.is_loading
    }

    /// Depth-first search over the published items.
    pub fn find(&self, id: &str) -> Option<&Arc<OutputNode<T>>> {
        fn walk<'a, T>(
            items: &'a [Arc<OutputNode<T>>],
            id: &str,
        ) -> Option<&'a Arc<OutputNode<T>>> {
            items.iter().find_map(|node| {
                if node.id() == id {
                    Some(node)
                } else {
                    walk(&node.children.items, id)
                }
            })
        }
        walk(&self.items, id)
    }

    /// True when `other` publishes nothing observably different.
    pub(crate) fn same_as(&self, other: &Self) -> bool {
        self.is_loading == other.is_loading
            && self.in_flight == other.in_flight
            && self.failure == other.failure
            && self.trail_failure == other.trail_failure
            && self.active_trail_ids == other.active_trail_ids
            && same_items(&self.items, &other.items)
    }
}

/// Element-wise identity comparison.
pub(crate) fn same_items<X>(a: &[Arc<X>], b: &[Arc<X>]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| Arc::ptr_eq(x, y))
}
