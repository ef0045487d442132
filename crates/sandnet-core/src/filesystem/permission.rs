//! Ownership and mode requirements for filesystem objects.
//!
//! A [`PermissionSpec`] names an owner, a group and a mode that a file or
//! directory must carry. Any field may be absent, in which case it is
//! neither checked nor changed. Owner and group may be given by name and
//! are resolved to numeric IDs before use.
//!
//! Modes are compared on the permission bits (`0o777`) only. In the default
//! (non-strict) mode the required mode is a minimum: every bit it sets must
//! also be set on the object, extra bits are fine. Strict mode requires an
//! exact match.

use std::fs;
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};

use nix::unistd::{Gid, Group, Uid, User};
use sandnet_common::error::{Result, SandnetError};
use serde::{Deserialize, Serialize};

/// Bits of `st_mode` that permission specs talk about.
pub const PERMISSION_BITS: u32 = 0o777;

/// Required ownership and mode of a filesystem object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PermissionSpec {
    /// Owner user name, resolved into `owner_id`.
    pub owner_name: Option<String>,
    /// Owner user ID.
    pub owner_id: Option<u32>,
    /// Group name, resolved into `group_id`.
    pub group_name: Option<String>,
    /// Group ID.
    pub group_id: Option<u32>,
    /// Required permission bits.
    pub mode: Option<u32>,
    /// Require the exact mode instead of a minimum.
    pub strict_mode: bool,
    /// Apply checks and changes to everything below a directory too.
    pub enforce_recursive: bool,
}

impl PermissionSpec {
    /// Spec requiring the given owner and group names and minimum mode.
    #[must_use]
    pub fn named(owner: &str, group: &str, mode: u32) -> Self {
        Self {
            owner_name: Some(owner.to_owned()),
            group_name: Some(group.to_owned()),
            mode: Some(mode),
            ..Self::default()
        }
    }

    /// Captures the current owner, group and mode of `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if `path` cannot be stat'ed.
    pub fn from_path(path: &Path) -> Result<Self> {
        let meta = fs::metadata(path).map_err(|e| SandnetError::io(path, e))?;
        Ok(Self {
            owner_id: Some(meta.uid()),
            group_id: Some(meta.gid()),
            mode: Some(meta.mode() & PERMISSION_BITS),
            ..Self::default()
        })
    }

    /// Fills in missing IDs from the owner and group names.
    ///
    /// Calling this again after a successful resolution does nothing.
    ///
    /// # Errors
    ///
    /// Returns [`SandnetError::NotFound`] if a named user or group does
    /// not exist.
    pub fn resolve(&mut self) -> Result<()> {
        if let (None, Some(name)) = (self.owner_id, &self.owner_name) {
            let user = User::from_name(name)
                .map_err(|e| SandnetError::io("/etc/passwd", e.into()))?
                .ok_or_else(|| SandnetError::NotFound {
                    kind: "user",
                    id: name.clone(),
                })?;
            self.owner_id = Some(user.uid.as_raw());
        }
        if let (None, Some(name)) = (self.group_id, &self.group_name) {
            let group = Group::from_name(name)
                .map_err(|e| SandnetError::io("/etc/group", e.into()))?
                .ok_or_else(|| SandnetError::NotFound {
                    kind: "group",
                    id: name.clone(),
                })?;
            self.group_id = Some(group.gid.as_raw());
        }
        Ok(())
    }

    /// Returns a resolved copy of this spec.
    ///
    /// # Errors
    ///
    /// Same as [`PermissionSpec::resolve`].
    pub fn resolved(&self) -> Result<Self> {
        let mut spec = self.clone();
        spec.resolve()?;
        Ok(spec)
    }

    /// Returns whether an observed `st_mode` satisfies the required mode.
    ///
    /// Always true when no mode is required.
    #[must_use]
    pub const fn mode_satisfied(&self, observed: u32) -> bool {
        let Some(required) = self.mode else {
            return true;
        };
        let observed = observed & PERMISSION_BITS;
        if self.strict_mode {
            observed == required
        } else {
            observed & required == required
        }
    }

    fn describe(&self) -> String {
        let who = |name: &Option<String>, id: Option<u32>| match (name, id) {
            (Some(name), _) => name.clone(),
            (None, Some(id)) => id.to_string(),
            (None, None) => "any".to_owned(),
        };
        let mode = self.mode.map_or_else(|| "any".to_owned(), |m| format!("{m:#o}"));
        let qualifier = if self.strict_mode { "exact" } else { "minimum" };
        format!(
            "expected owner = {}, group = {}, ({qualifier}) mode = {mode}",
            who(&self.owner_name, self.owner_id),
            who(&self.group_name, self.group_id),
        )
    }
}

/// Checks a single object against `spec`.
///
/// # Errors
///
/// Returns an error if `spec` cannot be resolved or `path` cannot be
/// stat'ed.
pub fn compare(path: &Path, spec: &PermissionSpec) -> Result<bool> {
    let spec = spec.resolved()?;
    compare_object(path, &spec)
}

/// Makes a single object satisfy `spec`.
///
/// Owner and group are only changed for fields `spec` sets. The mode is
/// only changed when the object does not already satisfy it.
///
/// # Errors
///
/// Returns an error if `spec` cannot be resolved or a syscall fails.
pub fn apply(path: &Path, spec: &PermissionSpec) -> Result<()> {
    let spec = spec.resolved()?;
    apply_object(path, &spec)
}

/// Checks `path` and, when `enforce_recursive` is set, everything below it.
///
/// # Errors
///
/// Returns an error if `spec` cannot be resolved or the walk fails.
pub fn compare_tree(path: &Path, spec: &PermissionSpec) -> Result<bool> {
    Ok(find_mismatch(path, spec)?.is_none())
}

/// Returns the first object under `path` that does not satisfy `spec`.
///
/// # Errors
///
/// Returns an error if `spec` cannot be resolved or the walk fails.
pub fn find_mismatch(path: &Path, spec: &PermissionSpec) -> Result<Option<PathBuf>> {
    let spec = spec.resolved()?;
    for entry in tree(path, spec.enforce_recursive) {
        let entry = entry?;
        if !compare_object(&entry, &spec)? {
            return Ok(Some(entry));
        }
    }
    Ok(None)
}

/// Fails with a descriptive error naming the first offending object.
///
/// # Errors
///
/// Returns [`SandnetError::Permission`] on the first mismatch, or any error
/// of [`find_mismatch`].
pub fn verify_tree(path: &Path, spec: &PermissionSpec) -> Result<()> {
    match find_mismatch(path, spec)? {
        None => Ok(()),
        Some(offender) => Err(SandnetError::Permission {
            path: offender,
            message: spec.describe(),
        }),
    }
}

/// Applies `spec` to `path` and, when `enforce_recursive` is set, to
/// everything below it.
///
/// # Errors
///
/// Returns an error naming the object on which a change failed.
pub fn apply_tree(path: &Path, spec: &PermissionSpec) -> Result<()> {
    let spec = spec.resolved()?;
    for entry in tree(path, spec.enforce_recursive) {
        apply_object(&entry?, &spec)?;
    }
    Ok(())
}

fn compare_object(path: &Path, spec: &PermissionSpec) -> Result<bool> {
    let meta = fs::metadata(path).map_err(|e| SandnetError::io(path, e))?;
    let owner_ok = spec.owner_id.is_none_or(|uid| meta.uid() == uid);
    let group_ok = spec.group_id.is_none_or(|gid| meta.gid() == gid);
    Ok(owner_ok && group_ok && spec.mode_satisfied(meta.mode()))
}

fn apply_object(path: &Path, spec: &PermissionSpec) -> Result<()> {
    if spec.owner_id.is_some() || spec.group_id.is_some() {
        nix::unistd::chown(
            path,
            spec.owner_id.map(Uid::from_raw),
            spec.group_id.map(Gid::from_raw),
        )
        .map_err(|e| SandnetError::io(path, e.into()))?;
        tracing::debug!(path = %path.display(), uid = ?spec.owner_id, gid = ?spec.group_id, "chown");
    }

    if let Some(mode) = spec.mode {
        let meta = fs::metadata(path).map_err(|e| SandnetError::io(path, e))?;
        if !spec.mode_satisfied(meta.mode()) {
            fs::set_permissions(path, fs::Permissions::from_mode(mode))
                .map_err(|e| SandnetError::io(path, e))?;
            tracing::debug!(path = %path.display(), mode = format_args!("{mode:#o}"), "chmod");
        }
    }
    Ok(())
}

/// `root` first, then (if requested) every directory and file below it.
fn tree(root: &Path, recursive: bool) -> impl Iterator<Item = Result<PathBuf>> {
    let below = recursive.then(|| {
        walkdir::WalkDir::new(root)
            .min_depth(1)
            .into_iter()
            .map(|entry| {
                entry.map(walkdir::DirEntry::into_path).map_err(|e| {
                    let path = e.path().map_or_else(PathBuf::new, Path::to_path_buf);
                    SandnetError::io(path, e.into())
                })
            })
    });
    std::iter::once(Ok(root.to_path_buf())).chain(below.into_iter().flatten())
}
