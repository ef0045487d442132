//! The [`ServiceDescriptor`] trait: what makes one daemon different from
//! another.
//!
//! A [`crate::service::Service`] owns one descriptor and does the generic
//! bookkeeping (subscriptions, parameters, mounts, start/stop). The
//! descriptor only supplies defaults and hooks.

use sandnet_common::error::Result;
use sandnet_core::filesystem::mount::MountPoint;
use sandnet_core::sandbox::Sandboxable;

use crate::params::ParamMap;

/// Static description of an installable daemon.
pub trait ServiceDescriptor: Send + Sync {
    /// Service name, also its key in a [`crate::registry::ServiceRegistry`].
    fn name(&self) -> &str;

    /// Service-wide default parameters.
    fn default_params(&self) -> ParamMap;

    /// Default mounts, each under the parameter name a node uses to opt in.
    ///
    /// A node that sets the parameter to a string overrides the mount's
    /// source path; a full mount point replaces the mount.
    fn default_mounts(&self) -> Vec<(String, MountPoint)> {
        Vec::new()
    }

    /// Extra parameter keys accepted besides the standard ones, the
    /// default parameters and the named mounts.
    fn option_keys(&self) -> Vec<String> {
        Vec::new()
    }

    /// Checks that `node` can host the service.
    ///
    /// # Errors
    ///
    /// Returns [`sandnet_common::error::SandnetError::Requirement`] naming
    /// the first missing capability.
    fn verify_requirements(&self, node: &dyn Sandboxable) -> Result<()> {
        let _ = node;
        Ok(())
    }

    /// Finishing steps run after the service's mounts are in place.
    ///
    /// # Errors
    ///
    /// Returns an error if a step the service cannot run without fails.
    fn on_setup(&self, node: &mut dyn Sandboxable) -> Result<()> {
        let _ = node;
        Ok(())
    }
}
