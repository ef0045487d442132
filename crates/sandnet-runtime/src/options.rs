//! Per-node configuration handed to [`crate::node::SandboxNode::configure`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use sandnet_core::filesystem::mount::MountPoint;
use sandnet_service::params::ParamMap;
use serde::{Deserialize, Serialize};

use crate::loopback::LoopbackSpec;

/// Whether and where a node gets a private copy of a system directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PrivateDir {
    /// `true` uses `<root>/<node name>`; `false` skips the directory.
    Enabled(bool),
    /// Uses the given directory as the source.
    At(PathBuf),
}

impl Default for PrivateDir {
    fn default() -> Self {
        Self::Enabled(false)
    }
}

impl PrivateDir {
    /// Source directory for `node`, or `None` when disabled.
    #[must_use]
    pub fn source(&self, root: &Path, node: &str) -> Option<PathBuf> {
        match self {
            Self::Enabled(false) => None,
            Self::Enabled(true) => Some(root.join(node)),
            Self::At(path) => Some(path.clone()),
        }
    }
}

impl From<bool> for PrivateDir {
    fn from(enabled: bool) -> Self {
        Self::Enabled(enabled)
    }
}

/// Everything a node is configured with, applied in field order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NodeOptions {
    /// Private `/var/log`.
    pub private_log_dir: PrivateDir,
    /// Private `/run`.
    pub private_run_dir: PrivateDir,
    /// Extra binds, set up before any service.
    pub private_mounts: Vec<MountPoint>,
    /// Service name to the node's parameter overrides for it.
    pub services: BTreeMap<String, ParamMap>,
    /// Hostname inside the node.
    pub hostname: Option<String>,
    /// Loopback aliases, created in order.
    pub loopbacks: Vec<LoopbackSpec>,
}
