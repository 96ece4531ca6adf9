use crate::types::{NodeId, SourceNode};
use log::warn;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Ancestor chain of one node, nearest first: `[node, parent, ..., root]`.
pub type Trail<T> = Vec<Arc<SourceNode<T>>>;

/// Index of known ancestor chains.
///
/// Trails are learned from direct lookups (every suffix of the returned chain
/// is recorded) and from loaded children of a node whose own trail is known.
/// The first trail recorded for an id wins; entries are never overwritten.
pub struct TrailResolver<T> {
    trails: HashMap<NodeId, Trail<T>>,
    // Lookups the source answered without a trail for the queried id.
    unknown: HashSet<NodeId>,
}

impl<T> TrailResolver<T> {
    pub fn new() -> Self {
        Self {
            trails: HashMap::new(),
            unknown: HashSet::new(),
        }
    }

    pub fn get(&self, id: &str) -> Option<&Trail<T>> {
        self.trails.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.trails.contains_key(id)
    }

    /// True once a lookup for `id` is no longer needed.
    pub fn is_resolved(&self, id: &str) -> bool {
        self.trails.contains_key(id) || self.unknown.contains(id)
    }

    pub fn len(&self) -> usize {
        self.trails.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trails.is_empty()
    }

    /// Record the answer to `trail(queried)`. Returns how many trails were new.
    ///
    /// A chain that does not start at `queried` still teaches its own suffixes,
    /// but `queried` is then treated like an empty answer.
    pub fn register_lookup(&mut self, queried: &str, chain: &[Arc<SourceNode<T>>]) -> usize {
        let Some(head) = chain.first() else {
            self.unknown.insert(queried.to_string());
            return 0;
        };
        if head.id != queried {
            warn!("trail lookup for {queried} answered with a chain starting at {}", head.id);
            if !self.trails.contains_key(queried) {
                self.unknown.insert(queried.to_string());
            }
        }
        let mut added = 0;
        for start in 0..chain.len() {
            if self.insert(chain[start..].to_vec()) {
                added += 1;
            }
        }
        added
    }

    /// Derive trails for freshly loaded children. `parent == None` is the root
    /// set, whose members are their own single-element trails. Children of a
    /// parent with no known trail are skipped.
    pub fn register_children(
        &mut self,
        parent: Option<&str>,
        children: &[Arc<SourceNode<T>>],
    ) -> usize {
        let parent_trail = match parent {
            None => Vec::new(),
            Some(id) => match self.trails.get(id) {
                Some(trail) => trail.clone(),
                None => return 0,
            },
        };
        let mut added = 0;
        for child in children {
            if self.trails.contains_key(&child.id) {
                continue;
            }
            let mut trail = Vec::with_capacity(parent_trail.len() + 1);
            trail.push(child.clone());
            trail.extend(parent_trail.iter().cloned());
            if self.insert(trail) {
                added += 1;
            }
        }
        added
    }

    /// Ids on the trail of `active_id`, nearest first. Empty when there is no
    /// active id or its trail is not resolved yet.
    pub fn active_trail_ids(&self, active_id: Option<&str>) -> Vec<NodeId> {
        active_id
            .and_then(|id| self.trails.get(id))
            .map(|trail| trail.iter().map(|node| node.id.clone()).collect())
            .unwrap_or_default()
    }

    /// The source node a trail was recorded for.
    pub fn node(&self, id: &str) -> Option<&Arc<SourceNode<T>>> {
        self.trails.get(id).and_then(|trail| trail.first())
    }

    fn insert(&mut self, trail: Trail<T>) -> bool {
        let Some(head) = trail.first() else {
            return false;
        };
        if self.trails.contains_key(&head.id) {
            return false;
        }
        self.unknown.remove(&head.id);
        self.trails.insert(head.id.clone(), trail);
        true
    }
}

impl<T> Default for TrailResolver<T> {
    fn default() -> Self {
        Self::new()
    }
}
