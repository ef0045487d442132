//! The sandbox node.
//!
//! A node is a long-lived shell started by the namespace-entry helper in a
//! fresh set of namespaces. Everything else (binds, service commands,
//! hostname, loopbacks) is executed by attaching to that shell's
//! namespaces, so the shell must be running before the node is configured.

use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use nix::sys::signal::Signal;
use sandnet_common::config::SandnetConfig;
use sandnet_common::constants::{HOSTNAME_ADDRESS, SHELL_TAG_PREFIX};
use sandnet_common::error::{Result, SandnetError};
use sandnet_common::types::{ConfigStep, NodePhase};
use sandnet_core::filesystem::mount::{MountPoint, MountSide, MountTable};
use sandnet_core::filesystem::path::PathSpec;
use sandnet_core::filesystem::permission::PermissionSpec;
use sandnet_core::helper::{CommandRunner, ExecOutput, Helper, ShellProcess, parse_reported_pid};
use sandnet_core::namespace::NamespaceSet;
use sandnet_core::sandbox::Sandboxable;
use sandnet_service::params::ParamMap;
use sandnet_service::registry::ServiceRegistry;
use sandnet_service::service::ServiceOutcome;
use serde::Serialize;
use tempfile::TempPath;

use crate::loopback::{LoopbackInterface, LoopbackSpec};
use crate::options::{NodeOptions, PrivateDir};

/// What happened to one service during auto-start or auto-stop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ServiceStatus {
    /// The command ran; see its exit code.
    Completed(ServiceOutcome),
    /// The command could not be run at all.
    Failed(String),
}

/// Result of auto-starting or auto-stopping one service on one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceReport {
    /// Service name.
    pub service: String,
    /// Outcome.
    pub status: ServiceStatus,
}

impl ServiceReport {
    /// Whether the command ran and exited with status zero.
    #[must_use]
    pub const fn succeeded(&self) -> bool {
        matches!(&self.status, ServiceStatus::Completed(outcome) if outcome.success())
    }
}

impl fmt::Display for ServiceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let result = if self.succeeded() { "OK" } else { "FAIL" };
        write!(f, "{} ({result})", self.service)
    }
}

/// An isolated node and the shell that holds its namespaces.
pub struct SandboxNode {
    name: String,
    namespaces: NamespaceSet,
    config: SandnetConfig,
    helper: Helper,
    runner: Arc<dyn CommandRunner>,
    phase: NodePhase,
    shell: Option<Box<dyn ShellProcess>>,
    pid: Option<u32>,
    private_logs: Option<PathBuf>,
    private_run: Option<PathBuf>,
    mounts: MountTable,
    services: Vec<String>,
    hostname: Option<String>,
    loopbacks: BTreeMap<String, LoopbackInterface>,
    scratch: Vec<TempPath>,
}

impl fmt::Debug for SandboxNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SandboxNode")
            .field("name", &self.name)
            .field("namespaces", &self.namespaces)
            .field("phase", &self.phase)
            .field("pid", &self.pid)
            .field("mounts", &self.mounts)
            .field("services", &self.services)
            .finish_non_exhaustive()
    }
}

impl SandboxNode {
    /// Creates a node.
    ///
    /// # Errors
    ///
    /// Returns [`SandnetError::InvalidConfig`] if `namespaces` asks for a
    /// PID namespace without a mount namespace.
    pub fn new(
        name: impl Into<String>,
        namespaces: NamespaceSet,
        config: SandnetConfig,
        runner: Arc<dyn CommandRunner>,
    ) -> Result<Self> {
        let name = name.into();
        namespaces.validate(&name)?;
        tracing::debug!(node = %name, namespaces = ?namespaces.kinds(), "node created");
        Ok(Self {
            helper: Helper::new(config.helper.clone()),
            name,
            namespaces,
            config,
            runner,
            phase: NodePhase::NamespacesValidated,
            shell: None,
            pid: None,
            private_logs: None,
            private_run: None,
            mounts: MountTable::default(),
            services: Vec::new(),
            hostname: None,
            loopbacks: BTreeMap::new(),
            scratch: Vec::new(),
        })
    }

    /// Current lifecycle phase.
    #[must_use]
    pub const fn phase(&self) -> NodePhase {
        self.phase
    }

    /// PID commands attach to, once the shell runs.
    #[must_use]
    pub const fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Whether the shell is running.
    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.shell.is_some()
    }

    /// Source of the private `/var/log`, if any.
    #[must_use]
    pub fn private_log_dir(&self) -> Option<&Path> {
        self.private_logs.as_deref()
    }

    /// Source of the private `/run`, if any.
    #[must_use]
    pub fn private_run_dir(&self) -> Option<&Path> {
        self.private_run.as_deref()
    }

    /// Subscribed services, in setup order.
    #[must_use]
    pub fn services(&self) -> &[String] {
        &self.services
    }

    /// Hostname, once set.
    #[must_use]
    pub fn hostname(&self) -> Option<&str> {
        self.hostname.as_deref()
    }

    /// Loopback aliases, by name.
    pub fn loopbacks(&self) -> impl Iterator<Item = &LoopbackInterface> {
        self.loopbacks.values()
    }

    /// Command line that launches the node's shell.
    #[must_use]
    pub fn launch_argv(&self) -> Vec<String> {
        let shell = [
            self.config.shell.display().to_string(),
            "-ms".to_owned(),
            format!("{SHELL_TAG_PREFIX}{}", self.name),
        ];
        self.helper.launch_argv(&self.namespaces, &shell)
    }

    /// Launches the shell that creates and holds the node's namespaces.
    ///
    /// In a PID namespace the PID seen from outside belongs to the helper,
    /// so the shell's own PID is taken from the first line the helper
    /// prints.
    ///
    /// # Errors
    ///
    /// - [`SandnetError::Conflict`] if the shell already runs.
    /// - [`SandnetError::Launch`] if the PID cannot be recovered.
    /// - Any error starting the helper.
    pub fn start_shell(&mut self) -> Result<()> {
        if self.shell.is_some() {
            return Err(SandnetError::Conflict {
                message: format!("shell of node {} is already running", self.name),
            });
        }
        let mut shell = self.runner.spawn(&self.launch_argv())?;
        let pid = if self.namespaces.pid {
            let reported = shell
                .read_line()
                .ok()
                .flatten()
                .as_deref()
                .and_then(parse_reported_pid);
            match reported {
                Some(pid) => pid,
                None => {
                    if let Err(e) = shell.terminate() {
                        tracing::warn!(node = %self.name, error = %e, "failed to reap shell");
                    }
                    return Err(SandnetError::Launch {
                        node: self.name.clone(),
                        message: "unable to determine the shell's PID".into(),
                    });
                }
            }
        } else {
            shell.pid()
        };
        self.shell = Some(shell);
        self.pid = Some(pid);
        self.phase = NodePhase::ShellStarted;
        tracing::info!(node = %self.name, pid, "shell started");
        Ok(())
    }

    /// Applies `options` in order: private logs, private run, private
    /// mounts, services, hostname, loopbacks.
    ///
    /// # Errors
    ///
    /// - [`SandnetError::Precondition`] if the shell is not running.
    /// - [`SandnetError::Conflict`] if the node was already configured.
    /// - [`SandnetError::Step`] wrapping the first failing step.
    pub fn configure(&mut self, options: &NodeOptions, services: &mut ServiceRegistry) -> Result<()> {
        if self.shell.is_none() {
            return Err(SandnetError::Precondition {
                message: format!("start the shell of node {} before configuring it", self.name),
            });
        }
        if self.phase != NodePhase::ShellStarted {
            return Err(SandnetError::Conflict {
                message: format!("node {} is already configured", self.name),
            });
        }

        self.setup_private_logs(&options.private_log_dir)
            .map_err(|e| e.at_step(&self.name, ConfigStep::PrivateLogs))?;
        self.phase = NodePhase::PrivateLogsConfigured;

        self.setup_private_run(&options.private_run_dir)
            .map_err(|e| e.at_step(&self.name, ConfigStep::PrivateRun))?;
        self.phase = NodePhase::PrivateRunConfigured;

        self.setup_private_mounts(&options.private_mounts)
            .map_err(|e| e.at_step(&self.name, ConfigStep::PrivateMounts))?;
        self.phase = NodePhase::PrivateMountsConfigured;

        self.setup_services(services, &options.services)
            .map_err(|e| e.at_step(&self.name, ConfigStep::Services))?;
        self.phase = NodePhase::ServicesConfigured;

        if let Some(hostname) = &options.hostname {
            self.setup_hostname(hostname)
                .map_err(|e| e.at_step(&self.name, ConfigStep::Hostname))?;
        }
        self.phase = NodePhase::HostnameConfigured;

        for spec in &options.loopbacks {
            if let Err(e) = self.add_loopback(spec) {
                return Err(e.at_step(&self.name, ConfigStep::Loopbacks));
            }
        }
        self.phase = NodePhase::LoopbacksConfigured;

        tracing::info!(node = %self.name, "node configured");
        Ok(())
    }

    /// Binds a private directory over the log target.
    ///
    /// # Errors
    ///
    /// Returns any error from directory or mount setup.
    pub fn setup_private_logs(&mut self, dir: &PrivateDir) -> Result<()> {
        let root = self.config.log_root.clone();
        let target = self.config.log_target.clone();
        if let Some(source) = self.bind_private_dir(dir, &root, &target)? {
            self.private_logs = Some(source);
        }
        Ok(())
    }

    /// Binds a private directory over the run target.
    ///
    /// # Errors
    ///
    /// Returns any error from directory or mount setup.
    pub fn setup_private_run(&mut self, dir: &PrivateDir) -> Result<()> {
        let root = self.config.run_root.clone();
        let target = self.config.run_target.clone();
        if let Some(source) = self.bind_private_dir(dir, &root, &target)? {
            self.private_run = Some(source);
        }
        Ok(())
    }

    /// The source inherits the owner, group and mode of `target`.
    fn bind_private_dir(&mut self, dir: &PrivateDir, root: &Path, target: &Path) -> Result<Option<PathBuf>> {
        let Some(source) = dir.source(root, &self.name) else {
            return Ok(None);
        };
        let mount = MountPoint {
            target: MountSide::Path(target.to_path_buf()),
            source: Some(MountSide::Spec(PathSpec {
                path: Some(source.clone()),
                permissions: Some(PermissionSpec::from_path(target)?),
                create: true,
                create_recursive: true,
                ..PathSpec::default()
            })),
        };
        self.setup_mount_point(&mount)?;
        Ok(Some(source))
    }

    /// Sets up each mount point in order.
    ///
    /// # Errors
    ///
    /// Returns the first mount setup error.
    pub fn setup_private_mounts(&mut self, mounts: &[MountPoint]) -> Result<()> {
        for mount in mounts {
            self.setup_mount_point(mount)?;
        }
        Ok(())
    }

    /// Subscribes the node to every service in `services`.
    ///
    /// # Errors
    ///
    /// - [`SandnetError::Conflict`] if any of them is already subscribed.
    /// - [`SandnetError::NotFound`] for an unregistered service.
    /// - Any error from [`sandnet_service::service::Service::setup`].
    pub fn setup_services(
        &mut self,
        registry: &mut ServiceRegistry,
        services: &BTreeMap<String, ParamMap>,
    ) -> Result<()> {
        if let Some(dup) = services.keys().find(|name| self.services.contains(name)) {
            return Err(SandnetError::Conflict {
                message: format!("cannot set up service {dup} twice on node {}", self.name),
            });
        }
        for (name, params) in services {
            registry.get_mut(name)?.setup(self, params.clone())?;
            self.services.push(name.clone());
        }
        Ok(())
    }

    /// Gives the node its own hostname.
    ///
    /// Scratch copies of the hostname and hosts files are bound over the
    /// originals; they are deleted when the node terminates.
    ///
    /// # Errors
    ///
    /// - [`SandnetError::InvalidConfig`] without mount and UTS namespaces.
    /// - Any error writing the scratch files or binding them.
    pub fn setup_hostname(&mut self, hostname: &str) -> Result<()> {
        if !self.namespaces.supports_hostname() {
            return Err(SandnetError::InvalidConfig {
                node: self.name.clone(),
                message: "hostname requires mount and UTS namespaces".into(),
            });
        }

        let hostname_file = self.scratch_file("hostname", hostname.as_bytes())?;
        let target = self.config.hostname_target.clone();
        self.bind(&hostname_file, &target)?;

        let template = &self.config.hosts_template;
        let existing = std::fs::read_to_string(template).map_err(|e| SandnetError::io(template, e))?;
        let hosts = format!("{existing}\n# sandnet node hostname\n{HOSTNAME_ADDRESS}\t{hostname}\n\n");
        let hosts_file = self.scratch_file("hosts", hosts.as_bytes())?;
        let target = self.config.hosts_target.clone();
        self.bind(&hosts_file, &target)?;

        let out = self.run(&format!("hostname {hostname}"))?;
        if !out.success() {
            tracing::warn!(
                node = %self.name,
                exit_code = out.exit_code,
                stderr = %out.stderr.trim(),
                "hostname command failed"
            );
        }
        self.hostname = Some(hostname.to_owned());
        tracing::debug!(node = %self.name, hostname, "hostname set");
        Ok(())
    }

    fn scratch_file(&mut self, kind: &str, contents: &[u8]) -> Result<PathBuf> {
        let mut file = tempfile::Builder::new()
            .prefix(&format!("sandnet-{kind}-{}-", self.name))
            .tempfile()
            .map_err(|e| SandnetError::io(std::env::temp_dir(), e))?;
        file.write_all(contents)
            .map_err(|e| SandnetError::io(file.path(), e))?;
        let path = file.into_temp_path();
        let owned = path.to_path_buf();
        self.scratch.push(path);
        Ok(owned)
    }

    /// Creates a loopback alias, numbered after the highest one when the
    /// spec has no index.
    ///
    /// # Errors
    ///
    /// - [`SandnetError::Conflict`] if the alias number is taken.
    /// - [`SandnetError::Launch`] if assigning the address fails.
    pub fn add_loopback(&mut self, spec: &LoopbackSpec) -> Result<&LoopbackInterface> {
        let index = spec.index.unwrap_or_else(|| self.next_loopback_index());
        let intf = LoopbackInterface::new(index, spec.ip.clone());
        let name = intf.name();
        if self.loopbacks.contains_key(&name) {
            return Err(SandnetError::Conflict {
                message: format!("node {} already has loopback {name}", self.name),
            });
        }
        if let Some(argv) = intf.config_argv() {
            let out = self.exec(&argv)?;
            if !out.success() {
                return Err(SandnetError::Launch {
                    node: self.name.clone(),
                    message: format!(
                        "configuring {name} exited with {}: {}",
                        out.exit_code,
                        out.stderr.trim()
                    ),
                });
            }
        }
        tracing::debug!(node = %self.name, intf = %name, address = ?intf.address(), "added loopback");
        Ok(self.loopbacks.entry(name).or_insert(intf))
    }

    /// One past the highest loopback number in use, or 0.
    #[must_use]
    pub fn next_loopback_index(&self) -> u32 {
        self.loopbacks
            .values()
            .map(LoopbackInterface::index)
            .max()
            .map_or(0, |max| max + 1)
    }

    /// Starts every subscribed service whose `autoStart` flag is set.
    ///
    /// # Errors
    ///
    /// Returns the first start error that escalates; other failures are
    /// reported.
    pub fn auto_start_services(&mut self, registry: &ServiceRegistry) -> Result<Vec<ServiceReport>> {
        let mut reports = Vec::new();
        for name in &self.services {
            if let Some(outcome) = registry.get(name)?.auto_start(&*self)? {
                reports.push(ServiceReport {
                    service: name.clone(),
                    status: ServiceStatus::Completed(outcome),
                });
            }
        }
        self.phase = NodePhase::ServicesAutoStarted;
        Ok(reports)
    }

    /// Marks the node as fully up.
    pub fn mark_running(&mut self) {
        self.phase = NodePhase::Running;
        tracing::debug!(node = %self.name, "node running");
    }

    /// Stops every subscribed service whose `autoStop` flag is set.
    ///
    /// Never fails: problems are returned in the reports so teardown can
    /// continue.
    pub fn auto_stop_services(&mut self, registry: &ServiceRegistry) -> Vec<ServiceReport> {
        self.phase = NodePhase::ServicesStopping;
        let mut reports = Vec::new();
        for name in &self.services {
            let status = match registry.get(name).and_then(|s| s.auto_stop(&*self)) {
                Ok(Some(outcome)) => ServiceStatus::Completed(outcome),
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!(node = %self.name, service = %name, error = %e, "service stop failed");
                    ServiceStatus::Failed(e.to_string())
                }
            };
            reports.push(ServiceReport {
                service: name.clone(),
                status,
            });
        }
        reports
    }

    /// Delivers `signal` to the node's shell.
    ///
    /// Inside a PID namespace the shell's PID means nothing to the host,
    /// so the signal is sent by running `kill` in the node.
    ///
    /// # Errors
    ///
    /// - [`SandnetError::Precondition`] if the shell is not running.
    /// - [`SandnetError::Launch`] if the in-node `kill` fails.
    pub fn send_signal(&mut self, signal: Signal) -> Result<()> {
        let pid = self.running_pid()?;
        if self.namespaces.pid {
            let argv = ["kill".to_owned(), format!("-{}", signal as i32), pid.to_string()];
            let out = self.exec(&argv)?;
            if !out.success() {
                return Err(SandnetError::Launch {
                    node: self.name.clone(),
                    message: format!("{} failed: {}", argv.join(" "), out.stderr.trim()),
                });
            }
            return Ok(());
        }
        match self.shell.as_mut() {
            Some(shell) => shell.signal(signal),
            None => Err(self.no_shell()),
        }
    }

    /// Kills the shell, which releases the node's namespaces.
    ///
    /// # Errors
    ///
    /// Returns an error if the shell cannot be killed or reaped.
    pub fn stop_shell(&mut self) -> Result<()> {
        if let Some(mut shell) = self.shell.take() {
            shell.terminate()?;
            tracing::info!(node = %self.name, "shell stopped");
        }
        self.pid = None;
        self.phase = NodePhase::ShellStopped;
        Ok(())
    }

    /// Releases everything the node still holds.
    ///
    /// # Errors
    ///
    /// Returns an error if a scratch file cannot be removed.
    pub fn terminate(&mut self) -> Result<()> {
        if let Err(e) = self.stop_shell() {
            tracing::warn!(node = %self.name, error = %e, "failed to stop shell");
        }
        for path in self.scratch.drain(..) {
            let display = path.to_path_buf();
            path.close().map_err(|e| SandnetError::io(display, e))?;
        }
        self.phase = NodePhase::Terminal;
        tracing::debug!(node = %self.name, "node terminated");
        Ok(())
    }

    fn running_pid(&self) -> Result<u32> {
        self.pid.ok_or_else(|| self.no_shell())
    }

    fn no_shell(&self) -> SandnetError {
        SandnetError::Precondition {
            message: format!("node {} has no running shell", self.name),
        }
    }
}

impl Sandboxable for SandboxNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn namespaces(&self) -> &NamespaceSet {
        &self.namespaces
    }

    fn has_private_logs(&self) -> bool {
        self.private_logs.is_some()
    }

    fn has_private_run(&self) -> bool {
        self.private_run.is_some()
    }

    fn mounts(&self) -> &MountTable {
        &self.mounts
    }

    fn mounts_mut(&mut self) -> &mut MountTable {
        &mut self.mounts
    }

    fn exec(&self, argv: &[String]) -> Result<ExecOutput> {
        let pid = self.running_pid()?;
        self.runner
            .output(&self.helper.attach_argv(&self.namespaces, pid, argv))
    }

    fn run(&self, command: &str) -> Result<ExecOutput> {
        let argv: Vec<String> = if self.config.builtins.is_builtin(command) {
            vec![
                self.config.shell.display().to_string(),
                "-c".to_owned(),
                command.to_owned(),
            ]
        } else {
            command.split_whitespace().map(str::to_owned).collect()
        };
        if argv.is_empty() {
            return Err(SandnetError::Config {
                message: format!("empty command for node {}", self.name),
            });
        }
        self.exec(&argv)
    }
}

impl Drop for SandboxNode {
    fn drop(&mut self) {
        if let Some(mut shell) = self.shell.take() {
            if let Err(e) = shell.terminate() {
                tracing::warn!(node = %self.name, error = %e, "failed to stop shell on drop");
            }
        }
    }
}
