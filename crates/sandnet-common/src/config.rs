//! Global configuration model for the sandnet runtime.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constants;
use crate::error::{Result, SandnetError};

/// Root configuration shared by every node of a network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SandnetConfig {
    /// Namespace-entry helper program.
    pub helper: PathBuf,
    /// Shell launched inside each sandbox.
    pub shell: PathBuf,
    /// Parent of per-node private log directories.
    pub log_root: PathBuf,
    /// Parent of per-node private run directories.
    pub run_root: PathBuf,
    /// Directory covered by a private log directory.
    pub log_target: PathBuf,
    /// Directory covered by a private run directory.
    pub run_target: PathBuf,
    /// File covered by a node's hostname.
    pub hostname_target: PathBuf,
    /// File covered by a node's hosts file.
    pub hosts_target: PathBuf,
    /// Hosts file copied before the node's own entry is appended.
    pub hosts_template: PathBuf,
    /// Directory holding service init scripts.
    pub init_dir: PathBuf,
    /// Builtins of `shell`, filled in once at startup.
    #[serde(skip)]
    pub builtins: ShellBuiltins,
}

impl Default for SandnetConfig {
    fn default() -> Self {
        Self {
            helper: PathBuf::from(constants::DEFAULT_HELPER),
            shell: PathBuf::from(constants::DEFAULT_SHELL),
            log_root: PathBuf::from(constants::DEFAULT_LOG_ROOT),
            run_root: PathBuf::from(constants::DEFAULT_RUN_ROOT),
            log_target: PathBuf::from(constants::LOG_TARGET),
            run_target: PathBuf::from(constants::RUN_TARGET),
            hostname_target: PathBuf::from(constants::HOSTNAME_FILE),
            hosts_target: PathBuf::from(constants::HOSTS_FILE),
            hosts_template: PathBuf::from(constants::HOSTS_FILE),
            init_dir: PathBuf::from(constants::INIT_DIR),
            builtins: ShellBuiltins::default(),
        }
    }
}

impl SandnetConfig {
    /// Returns the configuration with the given builtin table attached.
    #[must_use]
    pub fn with_builtins(mut self, builtins: ShellBuiltins) -> Self {
        self.builtins = builtins;
        self
    }
}

/// The set of builtin commands of the sandbox shell.
///
/// Builtins cannot be exec'd directly by the helper and must run through
/// `<shell> -c`. The table is computed once by [`ShellBuiltins::detect`]
/// during startup and travels inside [`SandnetConfig`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShellBuiltins {
    names: BTreeSet<String>,
}

impl ShellBuiltins {
    /// Builds a table from explicit names.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Asks `shell` for its builtins by running `<shell> -c enable`.
    ///
    /// # Errors
    ///
    /// Returns an error if the shell cannot be executed or exits non-zero.
    pub fn detect(shell: &Path) -> Result<Self> {
        let output = std::process::Command::new(shell)
            .args(["-c", "enable"])
            .output()
            .map_err(|e| SandnetError::io(shell, e))?;
        if !output.status.success() {
            return Err(SandnetError::Config {
                message: format!(
                    "{} -c enable exited with {}",
                    shell.display(),
                    output.status
                ),
            });
        }
        let builtins = Self::parse(&String::from_utf8_lossy(&output.stdout));
        tracing::debug!(shell = %shell.display(), count = builtins.len(), "detected shell builtins");
        Ok(builtins)
    }

    /// Parses `enable` output, one `enable <name>` line per builtin.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        Self::from_names(
            raw.lines()
                .filter_map(|line| line.split_once(' ').map(|(_, name)| name.trim()))
                .filter(|name| !name.is_empty()),
        )
    }

    /// Returns whether the first word of `command` is a builtin.
    #[must_use]
    pub fn is_builtin(&self, command: &str) -> bool {
        command
            .split_whitespace()
            .next()
            .is_some_and(|word| self.names.contains(word))
    }

    /// Number of known builtins.
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Returns whether the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
