//! System-wide constants and default paths.

/// Namespace-entry helper program.
pub const DEFAULT_HELPER: &str = "mxexec";

/// Shell launched inside every sandbox.
pub const DEFAULT_SHELL: &str = "bash";

/// Parent of the per-node private log directories.
pub const DEFAULT_LOG_ROOT: &str = "/var/log/sandnet";

/// Parent of the per-node private run directories.
pub const DEFAULT_RUN_ROOT: &str = "/run/sandnet";

/// Directory hidden by a node's private log directory.
pub const LOG_TARGET: &str = "/var/log";

/// Directory hidden by a node's private run directory.
pub const RUN_TARGET: &str = "/run";

/// Hostname file overlaid when a node sets its hostname.
pub const HOSTNAME_FILE: &str = "/etc/hostname";

/// Hosts file overlaid when a node sets its hostname.
pub const HOSTS_FILE: &str = "/etc/hosts";

/// Address the node's own hostname resolves to.
pub const HOSTNAME_ADDRESS: &str = "127.0.1.1";

/// Directory holding service init scripts.
pub const INIT_DIR: &str = "/etc/init.d";

/// Loopback device that carries the numbered aliases.
pub const LOOPBACK_DEVICE: &str = "lo";

/// Prefix of the argument passed to each sandbox shell, easy to spot in `ps`.
pub const SHELL_TAG_PREFIX: &str = "sandnet:";

/// Application name used in CLI output.
pub const APP_NAME: &str = "sandnet";

/// Binary name for the CLI.
pub const BIN_NAME: &str = "snet";
