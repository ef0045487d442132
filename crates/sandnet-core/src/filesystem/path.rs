//! Idempotent directory setup with permission enforcement.

use std::fs::{self, DirBuilder};
use std::os::unix::fs::DirBuilderExt;
use std::path::{Path, PathBuf};

use nix::sys::stat::{Mode, umask};
use sandnet_common::error::{Result, SandnetError};
use serde::{Deserialize, Serialize};

use super::permission::{self, PermissionSpec};

/// A path plus the setup actions to take on it before it is used.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PathSpec {
    /// Path being described. `None` disables any mount that uses it.
    pub path: Option<PathBuf>,
    /// Ownership and mode used by `create`, `set_permissions` and
    /// `check_permissions`.
    pub permissions: Option<PermissionSpec>,
    /// Create the directory if missing.
    pub create: bool,
    /// Create missing parents as well.
    pub create_recursive: bool,
    /// Apply `permissions` after creation.
    pub set_permissions: bool,
    /// Verify `permissions` and fail on mismatch.
    pub check_permissions: bool,
}

impl PathSpec {
    /// A path with no setup actions.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }
}

/// Restores the previous umask when dropped.
struct UmaskGuard(Mode);

impl UmaskGuard {
    fn clear() -> Self {
        Self(umask(Mode::empty()))
    }
}

impl Drop for UmaskGuard {
    fn drop(&mut self) {
        let _ = umask(self.0);
    }
}

/// Returns whether anything exists at `path`.
#[must_use]
pub fn exists(path: &Path) -> bool {
    path.exists()
}

/// Returns whether `path` is a directory.
#[must_use]
pub fn is_dir(path: &Path) -> bool {
    path.is_dir()
}

/// Creates a directory unless one already exists.
///
/// With `perms`, the directory is created with exactly the requested mode
/// (umask cleared for the duration of the call) and chowned to the
/// requested owner and group. Without `perms` the process defaults apply.
///
/// # Errors
///
/// Returns [`SandnetError::Conflict`] if a non-directory object occupies
/// `path`, or an error if creation or chown fails.
pub fn ensure_dir(path: &Path, perms: Option<&PermissionSpec>, recursive: bool) -> Result<()> {
    if path.is_dir() {
        return Ok(());
    }
    if path.exists() {
        return Err(SandnetError::Conflict {
            message: format!("cannot create directory, object at path {}", path.display()),
        });
    }

    let mut builder = DirBuilder::new();
    let _ = builder.recursive(recursive);

    let Some(perms) = perms else {
        builder.create(path).map_err(|e| SandnetError::io(path, e))?;
        tracing::debug!(path = %path.display(), "created directory");
        return Ok(());
    };

    let perms = perms.resolved()?;
    {
        let _guard = UmaskGuard::clear();
        if let Some(mode) = perms.mode {
            let _ = builder.mode(mode);
        }
        builder.create(path).map_err(|e| SandnetError::io(path, e))?;
    }
    let ownership = PermissionSpec {
        mode: None,
        enforce_recursive: false,
        ..perms
    };
    permission::apply(path, &ownership)?;
    tracing::debug!(path = %path.display(), "created directory with permissions");
    Ok(())
}

/// Deletes the directory tree at `path`; does nothing if there is none.
///
/// # Errors
///
/// Returns an error if the removal fails.
pub fn remove(path: &Path) -> Result<()> {
    if !path.is_dir() {
        return Ok(());
    }
    fs::remove_dir_all(path).map_err(|e| SandnetError::io(path, e))?;
    tracing::debug!(path = %path.display(), "removed directory");
    Ok(())
}

/// Runs the actions a [`PathSpec`] asks for, in order: create, set
/// permissions, check permissions.
///
/// # Errors
///
/// Returns [`SandnetError::Config`] if `spec` has no path, or if a
/// permission action is requested without permissions; otherwise any
/// error from the individual actions.
pub fn setup(spec: &PathSpec) -> Result<PathBuf> {
    let path = spec.path.as_deref().ok_or_else(|| SandnetError::Config {
        message: "path setup requested without a path".into(),
    })?;

    if spec.create {
        ensure_dir(path, spec.permissions.as_ref(), spec.create_recursive)?;
    }
    if spec.set_permissions {
        permission::apply_tree(path, required_permissions(spec, path)?)?;
    }
    if spec.check_permissions {
        permission::verify_tree(path, required_permissions(spec, path)?)?;
    }
    Ok(path.to_path_buf())
}

fn required_permissions<'a>(spec: &'a PathSpec, path: &Path) -> Result<&'a PermissionSpec> {
    spec.permissions.as_ref().ok_or_else(|| SandnetError::Config {
        message: format!("permission action on {} without permissions", path.display()),
    })
}
