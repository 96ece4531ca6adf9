//! # Lazytree Core
//!
//! Lazily populated tree engine: children and ancestor trails are fetched on
//! demand from an async source, display flags are derived from a small
//! declarative state, and every published tree shares unchanged subtrees with
//! the previous one.
//!
//! ## Features
//!
//! - **Deduplicated fetches** - each children list, trail and the root set is requested once
//! - **Active trail** - ancestors of the active node are expanded without explicit commands
//! - **Structural sharing** - `Arc::ptr_eq` on a subtree means nothing in it changed
//! - **Surfaced failures** - rejected fetches are reported apart from loading and can be retried
//!
//! ## Architecture
//!
//! ```text
//! TreeController ──(pure state updates)──> Engine loop (one task)
//!                                            │
//!                                            ├──> Trail Resolver
//!                                            │      └─ trail(active) via Request Cache
//!                                            │
//!                                            ├──> Children Loader
//!                                            │      ├─ explicitly expanded ∪ active trail
//!                                            │      └─ children(id) via Request Cache
//!                                            │
//!                                            ├──> Request Cache (Shared futures, per key)
//!                                            │      └─ TreeSource
//!                                            │
//!                                            └──> Reconciler
//!                                                   ├─ Expansion Resolver (flags)
//!                                                   └─ memoized OutputNodes
//!                                                        │
//!                                                        v
//!                                               watch::Receiver<Arc<Tree>>
//! ```

mod config;
mod controller;
mod engine;
mod error;
mod expansion;
mod loader;
mod reconcile;
mod request_cache;
mod source;
mod static_source;
mod trail;
mod types;

pub use config::{LoaderConfig, MAX_LOADING_TRANSITION_MS};
pub use controller::{
    with_active_id, with_expanded, with_multiple_expanded, with_toggled, StateUpdater,
    TreeController, TreeNodeController, TreeNodesController,
};
pub use engine::TreeEngine;
pub use error::{FetchFailure, Result, TreeError};
pub use expansion::{is_expanded, ExpansionResolver, NodeFlags};
pub use loader::{BatchId, ChildrenLoader, ChildrenView};
pub use reconcile::Reconciler;
pub use request_cache::{FetchKey, FetchResult, RequestCache, SharedFetch};
pub use source::TreeSource;
pub use static_source::{StaticNode, StaticTreeSource};
pub use trail::{Trail, TrailResolver};
pub use types::{LoadableCollection, NodeId, OutputNode, SourceNode, Tree, TreeState};
