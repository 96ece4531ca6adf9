//! Command surface of the engine.
//!
//! Every command is a pure `(state, snapshot) -> state` transformation sent to
//! the engine loop, which applies it against the state and tree it currently
//! holds. The transformations are exposed as free functions so they can be
//! used without a running engine.

use crate::error::{Result, TreeError};
use crate::expansion::is_expanded;
use crate::request_cache::FetchKey;
use crate::types::{NodeId, Tree, TreeState};
use tokio::sync::{mpsc, oneshot};

pub type StateUpdater<T> = Box<dyn FnOnce(&TreeState, &Tree<T>) -> TreeState + Send>;

pub(crate) enum Command<T> {
    Update(StateUpdater<T>),
    Retry(FetchKey),
    Flush(oneshot::Sender<()>),
    Shutdown,
}

pub fn with_expanded(state: &TreeState, id: &str, expanded: bool) -> TreeState {
    let mut next = state.clone();
    next.expanded_ids.insert(id.to_string(), expanded);
    next
}

/// Flip the *derived* expansion of `id`: a node expanded only because it is on
/// the active trail becomes explicitly collapsed.
pub fn with_toggled<T>(state: &TreeState, tree: &Tree<T>, id: &str) -> TreeState {
    let current = is_expanded(state.explicit_expansion(id), tree.is_on_active_trail(id));
    with_expanded(state, id, !current)
}

/// Set an explicit flag for every id the tree knows; unknown ids are dropped.
pub fn with_multiple_expanded<T, I, S>(
    state: &TreeState,
    tree: &Tree<T>,
    ids: I,
    expanded: bool,
) -> TreeState
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut next = state.clone();
    for id in ids {
        if let Some(node) = tree.node(id.as_ref()) {
            next.expanded_ids.insert(node.id().to_string(), expanded);
        }
    }
    next
}

pub fn with_active_id(state: &TreeState, id: Option<NodeId>) -> TreeState {
    TreeState {
        active_id: id,
        ..state.clone()
    }
}

/// Cloneable handle for sending commands to one engine.
///
/// Every method fails with [`TreeError::EngineClosed`] once the engine loop has
/// stopped.
pub struct TreeController<T> {
    commands: mpsc::UnboundedSender<Command<T>>,
}

impl<T> Clone for TreeController<T> {
    fn clone(&self) -> Self {
        Self {
            commands: self.commands.clone(),
        }
    }
}

impl<T> std::fmt::Debug for TreeController<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TreeController")
            .field("closed", &self.commands.is_closed())
            .finish()
    }
}

impl<T> TreeController<T> {
    pub(crate) fn new(commands: mpsc::UnboundedSender<Command<T>>) -> Self {
        Self { commands }
    }

    fn send(&self, command: Command<T>) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| TreeError::EngineClosed)
    }

    /// Forget a failed fetch so it is requested again if still needed.
    /// Keys that have not failed are left alone.
    pub fn retry(&self, key: FetchKey) -> Result<()> {
        self.send(Command::Retry(key))
    }

    /// Resolves once every command sent before it has been applied and the
    /// resulting tree published.
    pub async fn flush(&self) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(Command::Flush(reply_tx))?;
        reply_rx.await.map_err(|_| TreeError::EngineClosed)
    }

    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }

    pub(crate) fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown);
    }
}

impl<T: 'static> TreeController<T> {
    pub fn update_state<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&TreeState, &Tree<T>) -> TreeState + Send + 'static,
    {
        self.send(Command::Update(Box::new(f)))
    }

    pub fn set_expanded(&self, id: impl Into<NodeId>, expanded: bool) -> Result<()> {
        let id = id.into();
        self.update_state(move |state, _| with_expanded(state, &id, expanded))
    }

    pub fn expand(&self, id: impl Into<NodeId>) -> Result<()> {
        self.set_expanded(id, true)
    }

    pub fn collapse(&self, id: impl Into<NodeId>) -> Result<()> {
        self.set_expanded(id, false)
    }

    pub fn toggle_expanded(&self, id: impl Into<NodeId>) -> Result<()> {
        let id = id.into();
        self.update_state(move |state, tree| with_toggled(state, tree, &id))
    }

    pub fn set_active_id(&self, id: Option<NodeId>) -> Result<()> {
        self.update_state(move |state, _| with_active_id(state, id))
    }

    pub fn set_multiple_expanded<I, S>(&self, ids: I, expanded: bool) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<NodeId>,
    {
        let ids: Vec<NodeId> = ids.into_iter().map(Into::into).collect();
        self.update_state(move |state, tree| with_multiple_expanded(state, tree, ids, expanded))
    }

    pub fn node(&self, id: impl Into<NodeId>) -> TreeNodeController<T> {
        TreeNodeController {
            id: id.into(),
            controller: self.clone(),
        }
    }

    pub fn nodes<I, S>(&self, ids: I) -> TreeNodesController<T>
    where
        I: IntoIterator<Item = S>,
        S: Into<NodeId>,
    {
        TreeNodesController {
            ids: ids.into_iter().map(Into::into).collect(),
            controller: self.clone(),
        }
    }
}

/// Controller bound to a single node.
#[derive(Debug)]
pub struct TreeNodeController<T> {
    id: NodeId,
    controller: TreeController<T>,
}

impl<T: 'static> TreeNodeController<T> {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn set_expanded(&self, expanded: bool) -> Result<()> {
        self.controller.set_expanded(self.id.clone(), expanded)
    }

    pub fn toggle_expanded(&self) -> Result<()> {
        self.controller.toggle_expanded(self.id.clone())
    }

    pub fn set_active(&self) -> Result<()> {
        self.controller.set_active_id(Some(self.id.clone()))
    }
}

/// Controller bound to a group of nodes.
#[derive(Debug)]
pub struct TreeNodesController<T> {
    ids: Vec<NodeId>,
    controller: TreeController<T>,
}

impl<T: 'static> TreeNodesController<T> {
    pub fn set_multiple_expanded(&self, expanded: bool) -> Result<()> {
        self.controller.set_multiple_expanded(self.ids.clone(), expanded)
    }
}
