use crate::expansion::ExpansionResolver;
use crate::loader::ChildrenLoader;
use crate::types::{same_items, LoadableCollection, NodeId, OutputNode, SourceNode};
use log::{trace, warn};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Builds the output tree while reusing unchanged nodes.
///
/// For every id the last published node is remembered. A freshly computed node
/// whose flags, depth, children loading state and children (compared by
/// identity, element-wise) all match the remembered one is replaced by the
/// remembered instance, so `Arc::ptr_eq` on a subtree tells a consumer that
/// nothing inside it changed.
///
/// The memo doubles as the published id index. It is copied on write, so a
/// pass that rebuilds nothing leaves the published index shared.
pub struct Reconciler<T> {
    memo: Arc<HashMap<NodeId, Arc<OutputNode<T>>>>,
}

impl<T> Reconciler<T> {
    pub fn new() -> Self {
        Self {
            memo: Arc::default(),
        }
    }

    pub fn reconcile(
        &mut self,
        roots: &[Arc<SourceNode<T>>],
        children: &ChildrenLoader<T>,
        flags: &ExpansionResolver<'_>,
    ) -> Vec<Arc<OutputNode<T>>> {
        let mut path = HashSet::new();
        roots
            .iter()
            .filter_map(|node| self.build(node, 0, children, flags, &mut path))
            .collect()
    }

    fn build(
        &mut self,
        node: &Arc<SourceNode<T>>,
        depth: usize,
        children: &ChildrenLoader<T>,
        flags: &ExpansionResolver<'_>,
        path: &mut HashSet<NodeId>,
    ) -> Option<Arc<OutputNode<T>>> {
        if !path.insert(node.id.clone()) {
            warn!("node {} is its own ancestor; cutting the cycle", node.id);
            return None;
        }
        let view = children.children_of(&node.id);
        let mapped: Vec<_> = view
            .items
            .iter()
            .filter_map(|child| self.build(child, depth + 1, children, flags, path))
            .collect();
        path.remove(&node.id);

        let node_flags = flags.flags(&node.id);
        if let Some(current) = self.memo.get(&node.id) {
            if Arc::ptr_eq(&current.source, node)
                && current.is_expanded == node_flags.is_expanded
                && current.is_active == node_flags.is_active
                && current.is_active_trail == node_flags.is_active_trail
                && current.depth == depth
                && current.children.is_loading == view.is_loading
                && current.children.failure.as_ref() == view.failure
                && same_items(&current.children.items, &mapped)
            {
                return Some(current.clone());
            }
        }

        trace!("rebuilding node {} at depth {depth}", node.id);
        let output = Arc::new(OutputNode {
            source: node.clone(),
            is_expanded: node_flags.is_expanded,
            is_active: node_flags.is_active,
            is_active_trail: node_flags.is_active_trail,
            depth,
            children: LoadableCollection {
                is_loading: view.is_loading,
                items: mapped,
                failure: view.failure.cloned(),
            },
        });
        Arc::make_mut(&mut self.memo).insert(node.id.clone(), output.clone());
        Some(output)
    }

    pub fn get(&self, id: &str) -> Option<&Arc<OutputNode<T>>> {
        self.memo.get(id)
    }

    /// Every node produced so far, keyed by id.
    pub fn index(&self) -> Arc<HashMap<NodeId, Arc<OutputNode<T>>>> {
        self.memo.clone()
    }
}

impl<T> Default for Reconciler<T> {
    fn default() -> Self {
        Self::new()
    }
}
