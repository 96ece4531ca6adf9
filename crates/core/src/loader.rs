use crate::error::FetchFailure;
use crate::request_cache::FetchResult;
use crate::types::{NodeId, SourceNode, TreeState};
use log::{debug, warn};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

pub type BatchId = u64;

/// Children of one node as the reconciler sees them.
#[derive(Debug)]
pub struct ChildrenView<'a, T> {
    pub items: &'a [Arc<SourceNode<T>>],
    pub is_loading: bool,
    pub failure: Option<&'a FetchFailure>,
}

struct PendingBatch {
    ids: Vec<NodeId>,
    // `None` once the loading flag is visible.
    reveal_at: Option<Instant>,
}

/// Decides which nodes need children and tracks the batches fetching them.
///
/// A node needs children when it is explicitly expanded or on the active
/// trail. Each id is fetched at most once; the loaded list is kept for the
/// life of the loader. Nodes known to be leaves are never fetched.
pub struct ChildrenLoader<T> {
    loading_transition: Duration,
    children: HashMap<NodeId, Vec<Arc<SourceNode<T>>>>,
    failures: HashMap<NodeId, FetchFailure>,
    batches: HashMap<BatchId, PendingBatch>,
    in_flight: HashSet<NodeId>,
    loading: HashSet<NodeId>,
    known: HashMap<NodeId, Arc<SourceNode<T>>>,
    next_batch: BatchId,
}

impl<T> ChildrenLoader<T> {
    pub fn new(loading_transition: Duration) -> Self {
        Self {
            loading_transition,
            children: HashMap::new(),
            failures: HashMap::new(),
            batches: HashMap::new(),
            in_flight: HashSet::new(),
            loading: HashSet::new(),
            known: HashMap::new(),
            next_batch: 0,
        }
    }

    /// Make nodes from any source answer known, so leaves can be skipped.
    pub fn remember_nodes(&mut self, nodes: &[Arc<SourceNode<T>>]) {
        for node in nodes {
            self.known
                .entry(node.id.clone())
                .or_insert_with(|| node.clone());
        }
    }

    pub fn is_known_leaf(&self, id: &str) -> bool {
        self.known.get(id).is_some_and(|node| !node.has_children)
    }

    /// Ids whose children must be requested now: explicitly expanded ids in
    /// key order, then the active trail, minus anything loaded, in flight,
    /// failed or known to be a leaf.
    pub fn plan(&self, state: &TreeState, active_trail_ids: &[NodeId]) -> Vec<NodeId> {
        let mut seen = HashSet::new();
        state
            .explicitly_expanded()
            .chain(active_trail_ids.iter())
            .filter(|id| seen.insert(*id))
            .filter(|id| self.needs_fetch(id))
            .cloned()
            .collect()
    }

    fn needs_fetch(&self, id: &str) -> bool {
        !self.children.contains_key(id)
            && !self.in_flight.contains(id)
            && !self.failures.contains_key(id)
            && !self.is_known_leaf(id)
    }

    /// Mark `ids` as in flight. With no loading transition they show as
    /// loading immediately; otherwise only once [`Self::reveal_due`] passes
    /// the batch deadline.
    pub fn begin_batch(&mut self, ids: Vec<NodeId>, now: Instant) -> BatchId {
        let batch = self.next_batch;
        self.next_batch += 1;
        self.in_flight.extend(ids.iter().cloned());
        let reveal_at = if self.loading_transition.is_zero() {
            self.loading.extend(ids.iter().cloned());
            None
        } else {
            Some(now + self.loading_transition)
        };
        debug!("children batch {batch} started for {} ids", ids.len());
        self.batches.insert(batch, PendingBatch { ids, reveal_at });
        batch
    }

    /// Earliest deadline at which a pending batch should surface its loading flag.
    pub fn next_reveal(&self) -> Option<Instant> {
        self.batches.values().filter_map(|b| b.reveal_at).min()
    }

    /// Surface the loading flag of every batch whose deadline has passed.
    pub fn reveal_due(&mut self, now: Instant) -> bool {
        let mut changed = false;
        for (batch, pending) in &mut self.batches {
            if pending.reveal_at.is_some_and(|at| at <= now) {
                pending.reveal_at = None;
                self.loading.extend(pending.ids.iter().cloned());
                debug!("children batch {batch} now shows loading");
                changed = true;
            }
        }
        changed
    }

    /// Merge a settled batch. Returns the successfully loaded lists so their
    /// children can be given trails.
    pub fn settle_batch(
        &mut self,
        batch: BatchId,
        results: Vec<(NodeId, FetchResult<Vec<Arc<SourceNode<T>>>>)>,
    ) -> Vec<(NodeId, Vec<Arc<SourceNode<T>>>)> {
        if self.batches.remove(&batch).is_none() {
            warn!("ignoring unknown children batch {batch}");
            return Vec::new();
        }
        let mut loaded = Vec::new();
        for (id, result) in results {
            self.in_flight.remove(&id);
            self.loading.remove(&id);
            match result {
                Ok(items) => {
                    self.remember_nodes(&items);
                    self.children
                        .entry(id.clone())
                        .or_insert_with(|| items.clone());
                    loaded.push((id, items));
                }
                Err(failure) => {
                    warn!("{failure}");
                    self.failures.insert(id, failure);
                }
            }
        }
        debug!("children batch {batch} settled");
        loaded
    }

    pub fn children_of(&self, id: &str) -> ChildrenView<'_, T> {
        ChildrenView {
            items: self.children.get(id).map(Vec::as_slice).unwrap_or(&[]),
            is_loading: self.loading.contains(id),
            failure: self.failures.get(id),
        }
    }

    pub fn is_loaded(&self, id: &str) -> bool {
        self.children.contains_key(id)
    }

    pub fn failure(&self, id: &str) -> Option<&FetchFailure> {
        self.failures.get(id)
    }

    /// Drop a recorded failure so the next plan can request `id` again.
    pub fn clear_failure(&mut self, id: &str) -> bool {
        self.failures.remove(id).is_some()
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request_cache::FetchKey;
    use pretty_assertions::assert_eq;

    fn branch(id: &str) -> Arc<SourceNode<()>> {
        Arc::new(SourceNode::branch(id, ()))
    }

    fn leaf(id: &str) -> Arc<SourceNode<()>> {
        Arc::new(SourceNode::leaf(id, ()))
    }

    fn expanded(ids: &[&str]) -> TreeState {
        TreeState {
            active_id: None,
            expanded_ids: ids.iter().map(|id| (id.to_string(), true)).collect(),
        }
    }

    #[test]
    fn plan_unions_expanded_and_active_trail() {
        let loader: ChildrenLoader<()> = ChildrenLoader::new(Duration::ZERO);
        let mut state = expanded(&["b", "a"]);
        state.expanded_ids.insert("c".into(), false);
        let trail = vec!["ab".to_string(), "a".to_string()];

        assert_eq!(loader.plan(&state, &trail), vec!["a", "b", "ab"]);
    }

    #[test]
    fn plan_skips_in_flight_loaded_and_leaves() {
        let mut loader = ChildrenLoader::new(Duration::ZERO);
        loader.remember_nodes(&[branch("a"), leaf("b"), branch("c")]);
        let state = expanded(&["a", "b", "c", "d"]);

        let batch = loader.begin_batch(vec!["a".into()], Instant::now());
        assert_eq!(loader.plan(&state, &[]), vec!["c", "d"]);

        loader.settle_batch(batch, vec![("a".into(), Ok(vec![leaf("aa")]))]);
        assert!(loader.is_loaded("a"));
        assert_eq!(loader.plan(&state, &[]), vec!["c", "d"]);
        assert!(loader.is_known_leaf("aa"));
    }

    #[test]
    fn immediate_batches_show_loading_until_settled() {
        let mut loader: ChildrenLoader<()> = ChildrenLoader::new(Duration::ZERO);
        let batch = loader.begin_batch(vec!["a".into()], Instant::now());

        assert!(loader.children_of("a").is_loading);
        assert_eq!(loader.next_reveal(), None);
        assert_eq!(loader.in_flight_count(), 1);

        loader.settle_batch(batch, vec![("a".into(), Ok(vec![]))]);
        let view = loader.children_of("a");
        assert!(!view.is_loading);
        assert!(view.items.is_empty());
        assert_eq!(loader.in_flight_count(), 0);
    }

    #[test]
    fn delayed_batches_reveal_after_transition() {
        let transition = Duration::from_millis(100);
        let mut loader: ChildrenLoader<()> = ChildrenLoader::new(transition);
        let start = Instant::now();
        loader.begin_batch(vec!["a".into()], start);

        assert!(!loader.children_of("a").is_loading);
        assert_eq!(loader.next_reveal(), Some(start + transition));
        assert!(!loader.reveal_due(start + Duration::from_millis(50)));
        assert!(loader.reveal_due(start + transition));
        assert!(loader.children_of("a").is_loading);
        assert_eq!(loader.next_reveal(), None);
    }

    #[test]
    fn delayed_batch_settling_early_never_shows_loading() {
        let mut loader: ChildrenLoader<()> = ChildrenLoader::new(Duration::from_millis(100));
        let start = Instant::now();
        let batch = loader.begin_batch(vec!["a".into()], start);
        loader.settle_batch(batch, vec![("a".into(), Ok(vec![leaf("aa")]))]);

        assert_eq!(loader.next_reveal(), None);
        assert!(!loader.reveal_due(start + Duration::from_secs(1)));
        assert!(!loader.children_of("a").is_loading);
        assert_eq!(loader.children_of("a").items.len(), 1);
    }

    #[test]
    fn failures_are_kept_apart_and_not_replanned() {
        let mut loader: ChildrenLoader<()> = ChildrenLoader::new(Duration::ZERO);
        let state = expanded(&["a"]);
        let batch = loader.begin_batch(vec!["a".into()], Instant::now());
        let failure = FetchFailure {
            key: FetchKey::Children("a".into()),
            cause: "boom".into(),
        };
        let loaded = loader.settle_batch(batch, vec![("a".into(), Err(failure.clone()))]);

        assert!(loaded.is_empty());
        let view = loader.children_of("a");
        assert!(!view.is_loading);
        assert_eq!(view.failure, Some(&failure));
        assert!(loader.plan(&state, &[]).is_empty());

        assert!(loader.clear_failure("a"));
        assert_eq!(loader.plan(&state, &[]), vec!["a"]);
    }
}
