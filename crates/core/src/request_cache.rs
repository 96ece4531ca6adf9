use crate::error::FetchFailure;
use crate::types::NodeId;
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;

pub type FetchResult<V> = std::result::Result<V, FetchFailure>;

/// A fetch that every caller for the same key awaits together.
pub type SharedFetch<V> = Shared<BoxFuture<'static, FetchResult<V>>>;

/// What a cached fetch asks the source for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum FetchKey {
    Root,
    Children(NodeId),
    Trail(NodeId),
}

impl fmt::Display for FetchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Root => f.write_str("root"),
            Self::Children(id) => write!(f, "children:{id}"),
            Self::Trail(id) => write!(f, "trail:{id}"),
        }
    }
}

/// Deduplicating memo of fetches, keyed by [`FetchKey`].
///
/// The first `load_once` for a key creates the fetch; every later call gets a
/// handle to the same pending or completed result. Entries never expire and a
/// rejected fetch stays rejected until [`RequestCache::invalidate`] is called.
///
/// Owned by a single engine. Sharing one cache between engines bound to
/// different sources would serve one source's answers to the other.
pub struct RequestCache<V> {
    entries: HashMap<FetchKey, SharedFetch<V>>,
}

impl<V> RequestCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    pub fn load_once<F, Fut>(&mut self, key: FetchKey, fetch: F) -> SharedFetch<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = FetchResult<V>> + Send + 'static,
    {
        self.entries
            .entry(key)
            .or_insert_with(|| fetch().boxed().shared())
            .clone()
    }

    pub fn contains(&self, key: &FetchKey) -> bool {
        self.entries.contains_key(key)
    }

    /// The settled result for `key`, or `None` while pending or unknown.
    pub fn peek(&self, key: &FetchKey) -> Option<FetchResult<V>> {
        self.entries.get(key).and_then(|fetch| fetch.peek().cloned())
    }

    /// Forget `key` so the next `load_once` fetches again.
    /// Callers already holding the old handle still see its result.
    pub fn invalidate(&mut self, key: &FetchKey) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<V> Default for RequestCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
