use crate::types::{NodeId, SourceNode};
use async_trait::async_trait;

/// Asynchronous provider of tree data.
///
/// An engine binds to exactly one source for its whole lifetime and caches
/// every answer; the source must not change data it has already returned.
#[async_trait]
pub trait TreeSource<T>: Send + Sync {
    /// Children of `id` in display order. `None` requests the root set.
    async fn children(&self, id: Option<&NodeId>) -> anyhow::Result<Vec<SourceNode<T>>>;

    /// Ancestor chain of `id`, nearest first: `[id, parent, ..., root]`.
    /// An empty chain means the source does not know `id`.
    async fn trail(&self, id: &NodeId) -> anyhow::Result<Vec<SourceNode<T>>>;
}
