//! Domain primitive types used across the sandnet workspace.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle phase of a sandbox node.
///
/// Phases are strictly ordered; a node only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum NodePhase {
    /// Node object exists, nothing validated yet.
    Created,
    /// Namespace dependency invariants hold.
    NamespacesValidated,
    /// The namespace-holding shell process is running.
    ShellStarted,
    /// Private `/var/log` bound (or skipped).
    PrivateLogsConfigured,
    /// Private `/run` bound (or skipped).
    PrivateRunConfigured,
    /// Caller-supplied private mounts bound.
    PrivateMountsConfigured,
    /// Service subscriptions set up.
    ServicesConfigured,
    /// Hostname applied (or skipped).
    HostnameConfigured,
    /// Loopback interfaces created (or skipped).
    LoopbacksConfigured,
    /// Auto-start services were started.
    ServicesAutoStarted,
    /// Node is fully up.
    Running,
    /// Services are being stopped.
    ServicesStopping,
    /// The shell process was stopped.
    ShellStopped,
    /// Node resources released.
    Terminal,
}

impl fmt::Display for NodePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Created => "created",
            Self::NamespacesValidated => "namespaces-validated",
            Self::ShellStarted => "shell-started",
            Self::PrivateLogsConfigured => "private-logs-configured",
            Self::PrivateRunConfigured => "private-run-configured",
            Self::PrivateMountsConfigured => "private-mounts-configured",
            Self::ServicesConfigured => "services-configured",
            Self::HostnameConfigured => "hostname-configured",
            Self::LoopbacksConfigured => "loopbacks-configured",
            Self::ServicesAutoStarted => "services-auto-started",
            Self::Running => "running",
            Self::ServicesStopping => "services-stopping",
            Self::ShellStopped => "shell-stopped",
            Self::Terminal => "terminal",
        };
        f.write_str(s)
    }
}

/// A single step of node bring-up, used to attribute failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConfigStep {
    /// Launching the sandbox shell.
    Shell,
    /// Private `/var/log`.
    PrivateLogs,
    /// Private `/run`.
    PrivateRun,
    /// Arbitrary private mounts.
    PrivateMounts,
    /// Service subscriptions.
    Services,
    /// Hostname.
    Hostname,
    /// Loopback interfaces.
    Loopbacks,
    /// Automatic service start.
    ServiceStart,
}

impl fmt::Display for ConfigStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Shell => write!(f, "shell launch"),
            Self::PrivateLogs => write!(f, "private log directory"),
            Self::PrivateRun => write!(f, "private run directory"),
            Self::PrivateMounts => write!(f, "private mounts"),
            Self::Services => write!(f, "service setup"),
            Self::Hostname => write!(f, "hostname"),
            Self::Loopbacks => write!(f, "loopback interfaces"),
            Self::ServiceStart => write!(f, "service start"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phases_are_ordered_linearly() {
        assert!(NodePhase::Created < NodePhase::NamespacesValidated);
        assert!(NodePhase::ShellStarted < NodePhase::PrivateLogsConfigured);
        assert!(NodePhase::LoopbacksConfigured < NodePhase::Running);
        assert!(NodePhase::ShellStopped < NodePhase::Terminal);
    }

    #[test]
    fn phase_display_is_kebab_case() {
        assert_eq!(NodePhase::ServicesAutoStarted.to_string(), "services-auto-started");
    }
}
