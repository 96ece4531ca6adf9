use crate::error::{Result, TreeError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Upper bound for the loading transition; anything longer hides real loading.
pub const MAX_LOADING_TRANSITION_MS: u64 = 60_000;

const LOADING_TRANSITION_ENV: &str = "LAZYTREE_LOADING_TRANSITION_MS";

/// Configuration for the tree engine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Delay before a children batch surfaces `is_loading = true`.
    /// A batch that settles within the delay never shows a loading state.
    pub loading_transition_ms: u64,
}

impl LoaderConfig {
    pub fn with_loading_transition_ms(loading_transition_ms: u64) -> Self {
        Self {
            loading_transition_ms,
        }
    }

    /// Defaults overridden by `LAZYTREE_LOADING_TRANSITION_MS` when set.
    pub fn from_env() -> Self {
        let raw = std::env::var(LOADING_TRANSITION_ENV).ok();
        Self {
            loading_transition_ms: parse_loading_transition(raw.as_deref(), 0),
        }
    }

    pub fn loading_transition(&self) -> Duration {
        Duration::from_millis(self.loading_transition_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.loading_transition_ms > MAX_LOADING_TRANSITION_MS {
            return Err(TreeError::InvalidConfig(format!(
                "loading_transition_ms ({}) cannot exceed {MAX_LOADING_TRANSITION_MS}",
                self.loading_transition_ms
            )));
        }
        Ok(())
    }
}

fn parse_loading_transition(raw: Option<&str>, default_value: u64) -> u64 {
    raw.map(str::trim)
        .filter(|v| !v.is_empty())
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default_value)
}
