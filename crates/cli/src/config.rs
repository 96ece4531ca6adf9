use anyhow::{Context, Result};
use lazytree_core::LoaderConfig;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_SETTLE_TIMEOUT_MS: u64 = 10_000;

/// Optional TOML file passed with `--config`.
///
/// ```toml
/// settle_timeout_ms = 5000
///
/// [loader]
/// loading_transition_ms = 150
/// ```
#[derive(Clone, Debug, Default, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub loader: Option<LoaderConfig>,
    #[serde(default)]
    pub settle_timeout_ms: Option<u64>,
}

impl FileConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml(&raw).with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }
}

/// Effective settings for one run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Settings {
    pub loader: LoaderConfig,
    pub settle_timeout: Duration,
}

impl Settings {
    /// Command-line flag beats the config file, which beats the environment.
    pub fn resolve(file: Option<FileConfig>, loading_transition_ms: Option<u64>) -> Result<Self> {
        let file = file.unwrap_or_default();
        let loader = match (loading_transition_ms, file.loader) {
            (Some(ms), _) => LoaderConfig::with_loading_transition_ms(ms),
            (None, Some(loader)) => loader,
            (None, None) => LoaderConfig::from_env(),
        };
        loader.validate()?;
        let settle_timeout =
            Duration::from_millis(file.settle_timeout_ms.unwrap_or(DEFAULT_SETTLE_TIMEOUT_MS));
        Ok(Self {
            loader,
            settle_timeout,
        })
    }
}
