//! A shared service instance and its per-node lifecycle.
//!
//! One [`Service`] serves many nodes. Each node subscribes once with its own
//! overrides; start and stop commands are resolved per node because they
//! may embed node-specific paths.

use std::fmt;

use sandnet_common::error::{Result, SandnetError};
use sandnet_core::filesystem::mount::MountPoint;
use sandnet_core::helper::ExecOutput;
use sandnet_core::sandbox::Sandboxable;
use serde::Serialize;

use crate::descriptor::ServiceDescriptor;
use crate::params::{ParamMap, ParamValue, ParameterStore, keys};

/// Exit status and output of a start or stop command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ServiceOutcome {
    /// Exit code of the command.
    pub exit_code: i32,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

impl ServiceOutcome {
    /// Whether the command exited with status zero.
    #[must_use]
    pub const fn success(&self) -> bool {
        self.exit_code == 0
    }
}

impl From<ExecOutput> for ServiceOutcome {
    fn from(out: ExecOutput) -> Self {
        Self {
            exit_code: out.exit_code,
            stdout: out.stdout,
            stderr: out.stderr,
        }
    }
}

/// A daemon that nodes can subscribe to.
pub struct Service {
    descriptor: Box<dyn ServiceDescriptor>,
    params: ParameterStore<String>,
    mounts: Vec<(String, MountPoint)>,
}

impl fmt::Debug for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Service")
            .field("name", &self.descriptor.name())
            .field("params", &self.params)
            .field("mounts", &self.mounts)
            .finish()
    }
}

impl Service {
    /// Creates a service from its descriptor's defaults with `overrides`
    /// merged over them.
    ///
    /// # Errors
    ///
    /// Returns [`SandnetError::Config`] if `overrides` names a key the
    /// service does not know.
    pub fn new(descriptor: Box<dyn ServiceDescriptor>, overrides: ParamMap) -> Result<Self> {
        let mounts = descriptor.default_mounts();
        let params = ParameterStore::with_defaults(descriptor.default_params(), ParamMap::new());
        let mut service = Self {
            descriptor,
            params,
            mounts,
        };
        service.validate_keys(&overrides)?;
        service.params.update_globals(overrides);
        Ok(service)
    }

    /// Service name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.descriptor.name()
    }

    /// The descriptor backing this service.
    #[must_use]
    pub fn descriptor(&self) -> &dyn ServiceDescriptor {
        self.descriptor.as_ref()
    }

    /// Global and per-node parameters.
    #[must_use]
    pub const fn params(&self) -> &ParameterStore<String> {
        &self.params
    }

    /// Whether `key` is a parameter this service understands.
    #[must_use]
    pub fn accepts(&self, key: &str) -> bool {
        keys::STANDARD.contains(&key)
            || self.params.globals().contains_key(key)
            || self.mounts.iter().any(|(name, _)| name == key)
            || self.descriptor.option_keys().iter().any(|k| k == key)
    }

    /// Rejects parameter sets with keys the service does not know.
    ///
    /// # Errors
    ///
    /// Returns [`SandnetError::Config`] naming the first unknown key.
    pub fn validate_keys(&self, params: &ParamMap) -> Result<()> {
        match params.keys().find(|k| !self.accepts(k)) {
            Some(key) => Err(SandnetError::Config {
                message: format!("unknown parameter {key} for service {}", self.name()),
            }),
            None => Ok(()),
        }
    }

    /// Whether `node` has subscribed, even with no overrides.
    #[must_use]
    pub fn is_subscribed(&self, node: &str) -> bool {
        self.params.is_subscribed(&node.to_owned())
    }

    /// Subscribes `node` and prepares it to run the service.
    ///
    /// Checks requirements, records the node's parameters, binds the
    /// node's mounts and finally runs the descriptor's setup hook. Mounts
    /// without a source or target path are skipped, as are mounts whose
    /// target the node already has a private mount at.
    ///
    /// # Errors
    ///
    /// - [`SandnetError::Conflict`] if `node` is already subscribed.
    /// - [`SandnetError::Requirement`] if the node lacks a capability.
    /// - [`SandnetError::Config`] for unknown keys or malformed mounts.
    /// - Any error from mount setup or the setup hook.
    pub fn setup(&mut self, node: &mut dyn Sandboxable, node_config: ParamMap) -> Result<()> {
        let node_name = node.name().to_owned();
        if self.is_subscribed(&node_name) {
            return Err(SandnetError::Conflict {
                message: format!(
                    "service {} has already been set up for node {node_name}",
                    self.name()
                ),
            });
        }
        self.descriptor.verify_requirements(node)?;
        self.validate_keys(&node_config)?;
        self.params.subscribe(node_name.clone(), node_config, true)?;

        for mount in self.resolve_mounts(&node_name)? {
            if !mount.is_enabled() {
                continue;
            }
            if mount.target_path().is_some_and(|t| node.has_private_mount(t)) {
                tracing::debug!(
                    node = %node_name,
                    service = %self.name(),
                    target = ?mount.target_path(),
                    "target already privately mounted, skipping"
                );
                continue;
            }
            node.setup_mount_point(&mount)?;
        }

        self.descriptor.on_setup(node)?;
        tracing::info!(node = %node_name, service = %self.name(), "service set up");
        Ok(())
    }

    /// The mounts `node` gets from this service.
    ///
    /// A `mounts` parameter replaces everything. Otherwise each named
    /// default mount is included only if the node's parameters mention it:
    /// a string replaces the source path, a mount point replaces the mount,
    /// an unset value leaves it out.
    ///
    /// # Errors
    ///
    /// - [`SandnetError::NotSubscribed`] if `node` never subscribed.
    /// - [`SandnetError::Config`] if a mount parameter has the wrong type.
    pub fn resolve_mounts(&self, node: &str) -> Result<Vec<MountPoint>> {
        let entity = self.subscribed(node)?;

        if self.params.contains(&entity, keys::MOUNTS) {
            return match self.params.get(&entity, keys::MOUNTS)? {
                ParamValue::Mounts(list) => Ok(list.clone()),
                ParamValue::Mount(m) => Ok(vec![m.clone()]),
                ParamValue::Unset => Ok(Vec::new()),
                other => Err(self.mount_type_error(keys::MOUNTS, other)),
            };
        }

        let mut resolved = Vec::new();
        for (name, default) in &self.mounts {
            match self.params.get_or(&entity, name, &ParamValue::Unset) {
                ParamValue::Unset => {}
                ParamValue::Text(source) => {
                    let mut mount = default.clone();
                    mount.set_source_path(source);
                    resolved.push(mount);
                }
                ParamValue::Mount(m) => resolved.push(m.clone()),
                other => return Err(self.mount_type_error(name, other)),
            }
        }
        Ok(resolved)
    }

    /// Runs the node's start command inside the node.
    ///
    /// A non-zero exit is returned as data unless the node set
    /// `exceptionOnStartFail`.
    ///
    /// # Errors
    ///
    /// - [`SandnetError::NotSubscribed`] if `node` never subscribed.
    /// - [`SandnetError::Config`] if no start command is defined.
    /// - [`SandnetError::ServiceFailed`] on a failed start with escalation.
    pub fn start(&self, node: &dyn Sandboxable) -> Result<ServiceOutcome> {
        let entity = self.subscribed(node.name())?;
        let command = self.command(&entity, keys::START_CMD, "start")?;
        let outcome = ServiceOutcome::from(node.run(command)?);
        if !outcome.success() {
            if self.params.flag(&entity, keys::EXCEPTION_ON_START_FAIL) {
                return Err(SandnetError::ServiceFailed {
                    service: self.name().to_owned(),
                    node: entity,
                    exit_code: outcome.exit_code,
                    stderr: outcome.stderr,
                });
            }
            tracing::warn!(
                node = %entity,
                service = %self.name(),
                exit_code = outcome.exit_code,
                "service start failed"
            );
        }
        Ok(outcome)
    }

    /// Runs the node's stop command inside the node.
    ///
    /// A non-zero exit is always returned as data.
    ///
    /// # Errors
    ///
    /// - [`SandnetError::NotSubscribed`] if `node` never subscribed.
    /// - [`SandnetError::Config`] if no stop command is defined.
    pub fn stop(&self, node: &dyn Sandboxable) -> Result<ServiceOutcome> {
        let entity = self.subscribed(node.name())?;
        let command = self.command(&entity, keys::STOP_CMD, "stop")?;
        let outcome = ServiceOutcome::from(node.run(command)?);
        if !outcome.success() {
            tracing::warn!(
                node = %entity,
                service = %self.name(),
                exit_code = outcome.exit_code,
                "service stop failed"
            );
        }
        Ok(outcome)
    }

    /// [`Service::start`] if the node's `autoStart` flag is true.
    ///
    /// # Errors
    ///
    /// See [`Service::start`].
    pub fn auto_start(&self, node: &dyn Sandboxable) -> Result<Option<ServiceOutcome>> {
        let entity = self.subscribed(node.name())?;
        if self.params.flag(&entity, keys::AUTO_START) {
            self.start(node).map(Some)
        } else {
            Ok(None)
        }
    }

    /// [`Service::stop`] if the node's `autoStop` flag is true.
    ///
    /// # Errors
    ///
    /// See [`Service::stop`].
    pub fn auto_stop(&self, node: &dyn Sandboxable) -> Result<Option<ServiceOutcome>> {
        let entity = self.subscribed(node.name())?;
        if self.params.flag(&entity, keys::AUTO_STOP) {
            self.stop(node).map(Some)
        } else {
            Ok(None)
        }
    }

    fn subscribed(&self, node: &str) -> Result<String> {
        let entity = node.to_owned();
        if self.params.is_subscribed(&entity) {
            Ok(entity)
        } else {
            Err(SandnetError::NotSubscribed {
                service: self.name().to_owned(),
                node: entity,
            })
        }
    }

    fn command(&self, entity: &str, key: &str, action: &str) -> Result<&str> {
        self.params
            .get(&entity.to_owned(), key)
            .ok()
            .and_then(ParamValue::as_text)
            .ok_or_else(|| SandnetError::Config {
                message: format!("cannot {action} service {}, {key} not defined", self.name()),
            })
    }

    fn mount_type_error(&self, key: &str, value: &ParamValue) -> SandnetError {
        SandnetError::Config {
            message: format!(
                "parameter {key} of service {} must be a path or a mount point, got {}",
                self.name(),
                value.kind()
            ),
        }
    }
}
