//! Namespace composition for sandbox nodes.
//!
//! The helper program creates namespaces on behalf of a node when its shell
//! is launched, and attaches later commands to them. This module only
//! decides which namespaces a node gets and renders the matching helper
//! flags.

use sandnet_common::error::{Result, SandnetError};
use serde::{Deserialize, Serialize};

/// Which namespaces a node lives in.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NamespaceSet {
    /// Network namespace. Owned by the network engine; only read here.
    pub network: bool,
    /// Private mount namespace.
    pub mount: bool,
    /// Private PID namespace (with its own `/proc`).
    pub pid: bool,
    /// Private UTS (hostname) namespace.
    pub uts: bool,
}

impl NamespaceSet {
    /// All four namespaces.
    #[must_use]
    pub const fn all() -> Self {
        Self {
            network: true,
            mount: true,
            pid: true,
            uts: true,
        }
    }

    /// Checks the dependencies between namespace kinds.
    ///
    /// A PID namespace needs a private mount namespace to re-mount `/proc`.
    ///
    /// # Errors
    ///
    /// Returns [`SandnetError::InvalidConfig`] naming `node` if the set is
    /// impossible.
    pub fn validate(&self, node: &str) -> Result<()> {
        if self.pid && !self.mount {
            return Err(SandnetError::InvalidConfig {
                node: node.to_owned(),
                message: "PID namespaces require a mount namespace for /proc".into(),
            });
        }
        Ok(())
    }

    /// Setting a hostname needs both a mount and a UTS namespace.
    #[must_use]
    pub const fn supports_hostname(&self) -> bool {
        self.mount && self.uts
    }

    /// Flag string for launching a new sandbox.
    ///
    /// Always closes descriptors (`c`), detaches from the terminal (`d`)
    /// and prints the sandboxed PID (`p`), then adds network (`n`),
    /// mount (`m`), PID plus procfs (`if`) and UTS (`u`) as configured.
    #[must_use]
    pub fn launch_flags(&self) -> String {
        let mut opts = String::from("-cdp");
        if self.network {
            opts.push('n');
        }
        if self.mount {
            opts.push('m');
        }
        if self.pid {
            opts.push_str("if");
        }
        if self.uts {
            opts.push('u');
        }
        opts
    }

    /// Arguments attaching a command to the namespaces of `pid`.
    #[must_use]
    pub fn attach_args(&self, pid: u32) -> Vec<String> {
        let pid = pid.to_string();
        let mut args = vec!["-d".to_owned()];
        for (enabled, flag) in [
            (self.network, "-a"),
            (self.mount, "-b"),
            (self.pid, "-k"),
            (self.uts, "-j"),
        ] {
            if enabled {
                args.push(flag.to_owned());
                args.push(pid.clone());
            }
        }
        args
    }

    /// Names of the active namespace kinds, for display.
    #[must_use]
    pub fn kinds(&self) -> Vec<&'static str> {
        [
            (self.network, "net"),
            (self.mount, "mnt"),
            (self.pid, "pid"),
            (self.uts, "uts"),
        ]
        .into_iter()
        .filter_map(|(enabled, name)| enabled.then_some(name))
        .collect()
    }
}
