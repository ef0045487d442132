//! Bind mounts inside a sandbox's private mount namespace.
//!
//! A [`MountPoint`] pairs a target with a source. Either side may be a bare
//! path or a [`PathSpec`] whose setup actions run before the bind. Every
//! successful bind is recorded in the node's [`MountTable`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use sandnet_common::error::{Result, SandnetError};
use serde::{Deserialize, Serialize};

use super::path::{self, PathSpec};
use crate::sandbox::Sandboxable;

/// One side of a mount point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MountSide {
    /// A bare path; nothing is set up before binding.
    Path(PathBuf),
    /// A path with setup actions.
    Spec(PathSpec),
}

impl MountSide {
    /// The path on this side, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Path(p) => Some(p),
            Self::Spec(spec) => spec.path.as_deref(),
        }
    }

    /// Replaces the path while keeping any setup actions.
    pub fn set_path(&mut self, new_path: impl Into<PathBuf>) {
        match self {
            Self::Path(p) => *p = new_path.into(),
            Self::Spec(spec) => spec.path = Some(new_path.into()),
        }
    }

    fn prepare(&self) -> Result<PathBuf> {
        match self {
            Self::Path(p) => Ok(p.clone()),
            Self::Spec(spec) => path::setup(spec),
        }
    }
}

impl From<&str> for MountSide {
    fn from(p: &str) -> Self {
        Self::Path(PathBuf::from(p))
    }
}

impl From<PathBuf> for MountSide {
    fn from(p: PathBuf) -> Self {
        Self::Path(p)
    }
}

impl From<PathSpec> for MountSide {
    fn from(spec: PathSpec) -> Self {
        Self::Spec(spec)
    }
}

/// A source to be bound onto a target inside a sandbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MountPoint {
    /// Attachment point inside the sandbox.
    pub target: MountSide,
    /// Object being attached. `None` leaves the mount disabled.
    #[serde(default)]
    pub source: Option<MountSide>,
}

impl MountPoint {
    /// Creates a mount point.
    pub fn new(target: impl Into<MountSide>, source: impl Into<MountSide>) -> Self {
        Self {
            target: target.into(),
            source: Some(source.into()),
        }
    }

    /// Path of the source side, if set.
    #[must_use]
    pub fn source_path(&self) -> Option<&Path> {
        self.source.as_ref().and_then(MountSide::path)
    }

    /// Path of the target side, if set.
    #[must_use]
    pub fn target_path(&self) -> Option<&Path> {
        self.target.path()
    }

    /// A mount is enabled only when both sides carry a path.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.source_path().is_some() && self.target_path().is_some()
    }

    /// Points the source side at `new_source`, keeping its setup actions.
    pub fn set_source_path(&mut self, new_source: impl Into<PathBuf>) {
        match &mut self.source {
            Some(side) => side.set_path(new_source),
            None => self.source = Some(MountSide::Path(new_source.into())),
        }
    }
}

/// Binds recorded for one sandbox, keyed by target.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MountTable {
    binds: BTreeMap<PathBuf, PathBuf>,
}

impl MountTable {
    /// Records that `source` is bound at `target`.
    pub fn record(&mut self, target: PathBuf, source: PathBuf) {
        let _ = self.binds.insert(target, source);
    }

    /// Returns whether something is bound at `target`.
    #[must_use]
    pub fn contains(&self, target: &Path) -> bool {
        self.binds.contains_key(target)
    }

    /// Source bound at `target`.
    #[must_use]
    pub fn source_for(&self, target: &Path) -> Option<&Path> {
        self.binds.get(target).map(PathBuf::as_path)
    }

    /// Number of recorded binds.
    #[must_use]
    pub fn len(&self) -> usize {
        self.binds.len()
    }

    /// Returns whether nothing has been bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.binds.is_empty()
    }

    /// Iterates `(target, source)` pairs in target order.
    pub fn iter(&self) -> impl Iterator<Item = (&Path, &Path)> {
        self.binds.iter().map(|(t, s)| (t.as_path(), s.as_path()))
    }
}

/// Binds `source` onto `target` inside `node`'s mount namespace.
///
/// # Errors
///
/// - [`SandnetError::Precondition`] if the node has no private mount
///   namespace or either path is missing. Nothing is executed.
/// - [`SandnetError::Mount`] if the mount command exits non-zero.
pub fn bind<S: Sandboxable + ?Sized>(node: &mut S, source: &Path, target: &Path) -> Result<()> {
    if !node.namespaces().mount {
        return Err(SandnetError::Precondition {
            message: format!(
                "refusing to bind {} to {}: node {} is not in a private mount namespace",
                source.display(),
                target.display(),
                node.name()
            ),
        });
    }
    for p in [source, target] {
        if !path::exists(p) {
            return Err(SandnetError::Precondition {
                message: format!("path {} does not exist", p.display()),
            });
        }
    }

    let argv = [
        "mount".to_owned(),
        "-n".to_owned(),
        "-B".to_owned(),
        source.display().to_string(),
        target.display().to_string(),
    ];
    let output = node.exec(&argv)?;
    if output.exit_code != 0 {
        return Err(SandnetError::Mount {
            source_path: source.to_path_buf(),
            target: target.to_path_buf(),
            exit_code: output.exit_code,
            stderr: output.stderr,
        });
    }

    node.mounts_mut().record(target.to_path_buf(), source.to_path_buf());
    tracing::debug!(
        node = %node.name(),
        source = %source.display(),
        target = %target.display(),
        "bind mounted"
    );
    Ok(())
}

/// Runs any path setup either side of `mount` asks for, then binds.
///
/// # Errors
///
/// Returns [`SandnetError::Config`] if a side has no path, or any error
/// from path setup or [`bind`].
pub fn setup_mount_point<S: Sandboxable + ?Sized>(node: &mut S, mount: &MountPoint) -> Result<()> {
    let source = mount.source.as_ref().ok_or_else(|| SandnetError::Config {
        message: format!(
            "mount at {} has no source",
            mount.target_path().unwrap_or_else(|| Path::new("?")).display()
        ),
    })?;
    let source = source.prepare()?;
    let target = mount.target.prepare()?;
    bind(node, &source, &target)
}
