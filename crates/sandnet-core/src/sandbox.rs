//! The capability a node offers to mount management and services.

use std::path::Path;

use sandnet_common::error::Result;

use crate::filesystem::mount::{self, MountPoint, MountTable};
use crate::helper::ExecOutput;
use crate::namespace::NamespaceSet;

/// An isolated process environment that commands and binds can target.
///
/// Services only ever see a node through this trait: they inspect its
/// namespaces and private directories, run commands in it, and ask it to
/// bind mount points.
pub trait Sandboxable {
    /// Node name.
    fn name(&self) -> &str;

    /// Namespaces the node lives in.
    fn namespaces(&self) -> &NamespaceSet;

    /// Whether `/var/log` is private to the node.
    fn has_private_logs(&self) -> bool;

    /// Whether `/run` is private to the node.
    fn has_private_run(&self) -> bool;

    /// Binds made in the node so far.
    fn mounts(&self) -> &MountTable;

    /// Mutable access to the bind records.
    fn mounts_mut(&mut self) -> &mut MountTable;

    /// Runs `argv` inside the node's namespaces.
    ///
    /// # Errors
    ///
    /// Returns an error if the node is not running or the helper cannot be
    /// started. A non-zero exit is reported through [`ExecOutput`].
    fn exec(&self, argv: &[String]) -> Result<ExecOutput>;

    /// Runs a command line inside the node's namespaces.
    ///
    /// # Errors
    ///
    /// Same as [`Sandboxable::exec`].
    fn run(&self, command: &str) -> Result<ExecOutput>;

    /// Whether something is already bound at `target`.
    fn has_private_mount(&self, target: &Path) -> bool {
        self.mounts().contains(target)
    }

    /// Binds `source` onto `target`. See [`mount::bind`].
    ///
    /// # Errors
    ///
    /// See [`mount::bind`].
    fn bind(&mut self, source: &Path, target: &Path) -> Result<()> {
        mount::bind(self, source, target)
    }

    /// Prepares and binds a mount point. See [`mount::setup_mount_point`].
    ///
    /// # Errors
    ///
    /// See [`mount::setup_mount_point`].
    fn setup_mount_point(&mut self, mount: &MountPoint) -> Result<()> {
        mount::setup_mount_point(self, mount)
    }
}
