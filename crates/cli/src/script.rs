use anyhow::{bail, Result};
use lazytree_core::{FetchKey, NodeId, TreeController};
use std::fmt;
use std::str::FromStr;

/// One scripted command, written `verb` or `verb:argument`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Step {
    Expand(NodeId),
    Collapse(NodeId),
    Toggle(NodeId),
    Activate(NodeId),
    Deactivate,
    ExpandMany(Vec<NodeId>),
    CollapseMany(Vec<NodeId>),
    Retry(FetchKey),
}

impl Step {
    pub fn apply<T: 'static>(&self, controller: &TreeController<T>) -> lazytree_core::Result<()> {
        match self {
            Self::Expand(id) => controller.expand(id.clone()),
            Self::Collapse(id) => controller.collapse(id.clone()),
            Self::Toggle(id) => controller.toggle_expanded(id.clone()),
            Self::Activate(id) => controller.node(id.clone()).set_active(),
            Self::Deactivate => controller.set_active_id(None),
            Self::ExpandMany(ids) => controller.nodes(ids.clone()).set_multiple_expanded(true),
            Self::CollapseMany(ids) => controller.nodes(ids.clone()).set_multiple_expanded(false),
            Self::Retry(key) => controller.retry(key.clone()),
        }
    }
}

impl FromStr for Step {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self> {
        let (verb, arg) = match raw.split_once(':') {
            Some((verb, arg)) => (verb.trim(), Some(arg.trim())),
            None => (raw.trim(), None),
        };
        let id = || -> Result<NodeId> {
            match arg {
                Some(id) if !id.is_empty() => Ok(id.to_string()),
                _ => bail!("step '{verb}' needs a node id, e.g. '{verb}:a'"),
            }
        };
        let ids = || -> Result<Vec<NodeId>> {
            let ids: Vec<NodeId> = arg
                .unwrap_or_default()
                .split(',')
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(str::to_string)
                .collect();
            if ids.is_empty() {
                bail!("step '{verb}' needs a comma separated id list");
            }
            Ok(ids)
        };

        Ok(match verb {
            "expand" => Self::Expand(id()?),
            "collapse" => Self::Collapse(id()?),
            "toggle" => Self::Toggle(id()?),
            "activate" => Self::Activate(id()?),
            "deactivate" => Self::Deactivate,
            "expand-many" => Self::ExpandMany(ids()?),
            "collapse-many" => Self::CollapseMany(ids()?),
            "retry" => Self::Retry(parse_fetch_key(arg.unwrap_or_default())?),
            other => bail!(
                "unknown step '{other}' (expected expand, collapse, toggle, activate, \
                 deactivate, expand-many, collapse-many or retry)"
            ),
        })
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Expand(id) => write!(f, "expand:{id}"),
            Self::Collapse(id) => write!(f, "collapse:{id}"),
            Self::Toggle(id) => write!(f, "toggle:{id}"),
            Self::Activate(id) => write!(f, "activate:{id}"),
            Self::Deactivate => f.write_str("deactivate"),
            Self::ExpandMany(ids) => write!(f, "expand-many:{}", ids.join(",")),
            Self::CollapseMany(ids) => write!(f, "collapse-many:{}", ids.join(",")),
            Self::Retry(key) => write!(f, "retry:{key}"),
        }
    }
}

/// Parses the same spelling `FetchKey` displays: `root`, `children:<id>`, `trail:<id>`.
fn parse_fetch_key(raw: &str) -> Result<FetchKey> {
    match raw.split_once(':') {
        None if raw == "root" => Ok(FetchKey::Root),
        Some(("children", id)) if !id.is_empty() => Ok(FetchKey::Children(id.to_string())),
        Some(("trail", id)) if !id.is_empty() => Ok(FetchKey::Trail(id.to_string())),
        _ => bail!("invalid fetch key '{raw}' (expected root, children:<id> or trail:<id>)"),
    }
}
