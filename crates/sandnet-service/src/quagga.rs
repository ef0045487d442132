//! The Quagga software router.
//!
//! Quagga needs its own PID namespace plus private `/var/log` and `/run`,
//! because its daemons write pid files and logs at fixed locations. A node
//! opts into a private `/etc/quagga` by setting `quaggaConfigPath`.

use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use sandnet_common::error::{Result, SandnetError};
use sandnet_core::filesystem::mount::{MountPoint, MountSide};
use sandnet_core::filesystem::path::PathSpec;
use sandnet_core::filesystem::permission::PermissionSpec;
use sandnet_core::sandbox::Sandboxable;

use crate::descriptor::ServiceDescriptor;
use crate::params::{ParamMap, ParamValue, keys, param_map};

/// Default service name.
pub const QUAGGA: &str = "Quagga";

/// Parameter selecting the source of the private `/etc/quagga`.
pub const CONFIG_PATH_MOUNT: &str = "quaggaConfigPath";

const INIT_SCRIPT: &str = "quagga";
const CONFIG_TARGET: &str = "/etc/quagga";
const LOG_DIR: &str = "/var/log/quagga";

/// Descriptor of the Quagga routing suite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuaggaService {
    name: String,
}

impl Default for QuaggaService {
    fn default() -> Self {
        Self::named(QUAGGA)
    }
}

impl QuaggaService {
    /// A Quagga descriptor registered under `name`.
    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// Checks that Quagga's init script is installed in `init_dir`.
    ///
    /// # Errors
    ///
    /// Returns [`SandnetError::Requirement`] if the script is missing or
    /// not executable.
    pub fn check_installed(init_dir: &Path) -> Result<()> {
        let script = init_dir.join(INIT_SCRIPT);
        let executable = std::fs::metadata(&script)
            .is_ok_and(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0);
        if executable {
            Ok(())
        } else {
            Err(SandnetError::Requirement {
                service: QUAGGA.to_owned(),
                node: "host".to_owned(),
                capability: format!("an executable {}", script.display()),
            })
        }
    }

    fn requirement(&self, node: &dyn Sandboxable, capability: &str) -> SandnetError {
        SandnetError::Requirement {
            service: self.name.clone(),
            node: node.name().to_owned(),
            capability: capability.to_owned(),
        }
    }
}

impl ServiceDescriptor for QuaggaService {
    fn name(&self) -> &str {
        &self.name
    }

    fn default_params(&self) -> ParamMap {
        param_map([
            (keys::START_CMD, ParamValue::from("/etc/init.d/quagga start")),
            (keys::STOP_CMD, "/etc/init.d/quagga stop".into()),
            (keys::AUTO_START, true.into()),
            (keys::AUTO_STOP, true.into()),
            ("configPath", ParamValue::Unset),
        ])
    }

    fn default_mounts(&self) -> Vec<(String, MountPoint)> {
        let source = PathSpec {
            path: None,
            permissions: Some(PermissionSpec {
                enforce_recursive: true,
                ..PermissionSpec::named("quagga", "quaggavty", 0o775)
            }),
            create: true,
            create_recursive: true,
            set_permissions: true,
            check_permissions: true,
        };
        vec![(
            CONFIG_PATH_MOUNT.to_owned(),
            MountPoint {
                target: MountSide::Path(CONFIG_TARGET.into()),
                source: Some(MountSide::Spec(source)),
            },
        )]
    }

    fn verify_requirements(&self, node: &dyn Sandboxable) -> Result<()> {
        if !node.namespaces().pid {
            return Err(self.requirement(node, "PID namespace"));
        }
        if !node.has_private_logs() {
            return Err(self.requirement(node, "private logs"));
        }
        if !node.has_private_run() {
            return Err(self.requirement(node, "private /run"));
        }
        Ok(())
    }

    fn on_setup(&self, node: &mut dyn Sandboxable) -> Result<()> {
        for command in [
            format!("mkdir {LOG_DIR}"),
            format!("chown quagga:quagga {LOG_DIR}"),
        ] {
            let out = node.run(&command)?;
            if !out.success() {
                tracing::debug!(
                    node = %node.name(),
                    service = %self.name,
                    command = %command,
                    exit_code = out.exit_code,
                    stderr = %out.stderr.trim(),
                    "log directory step failed"
                );
            }
        }
        Ok(())
    }
}
