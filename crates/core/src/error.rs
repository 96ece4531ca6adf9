use crate::request_cache::FetchKey;
use serde::Serialize;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, TreeError>;

/// A Source call that rejected. Cloneable so one failure can be handed to
/// every waiter on the same cache key and carried in published snapshots.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[error("{key} failed: {cause}")]
pub struct FetchFailure {
    pub key: FetchKey,
    pub cause: String,
}

impl FetchFailure {
    pub fn new(key: FetchKey, err: &anyhow::Error) -> Self {
        Self {
            key,
            cause: format!("{err:#}"),
        }
    }
}

#[derive(Error, Debug, Clone)]
pub enum TreeError {
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchFailure),

    #[error("Tree engine is closed")]
    EngineClosed,

    #[error("Tree engine must be started inside a tokio runtime")]
    NoRuntime,

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Static tree error: {0}")]
    StaticTree(String),
}
