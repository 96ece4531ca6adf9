use crate::types::{NodeId, TreeState};
use std::collections::HashSet;

/// Derived display flags of one node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodeFlags {
    pub is_expanded: bool,
    pub is_active: bool,
    pub is_active_trail: bool,
}

/// An explicit override always wins; otherwise a node is expanded iff it is
/// on the active trail.
pub fn is_expanded(explicit: Option<bool>, is_active_trail: bool) -> bool {
    explicit.unwrap_or(is_active_trail)
}

/// Flags for every node under one `(state, active trail)` pair.
pub struct ExpansionResolver<'a> {
    state: &'a TreeState,
    active_trail: HashSet<&'a str>,
}

impl<'a> ExpansionResolver<'a> {
    pub fn new(state: &'a TreeState, active_trail_ids: &'a [NodeId]) -> Self {
        Self {
            state,
            active_trail: active_trail_ids.iter().map(String::as_str).collect(),
        }
    }

    pub fn flags(&self, id: &str) -> NodeFlags {
        let is_active_trail = self.active_trail.contains(id);
        NodeFlags {
            is_expanded: is_expanded(self.state.explicit_expansion(id), is_active_trail),
            is_active: self.state.active_id.as_deref() == Some(id),
            is_active_trail,
        }
    }
}
