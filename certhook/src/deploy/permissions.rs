//! Mode and ownership normalization of a certificate archive.

use certhook_core::CertsPermissions;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PermissionError {
    #[error("Unknown user '{0}'")]
    UnknownUser(String),

    #[error("Unknown group '{0}'")]
    UnknownGroup(String),

    #[error("Permission denied changing {0}")]
    Denied(PathBuf),

    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to walk archive: {0}")]
    Walk(String),
}

impl PermissionError {
    fn from_io(path: &Path, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::PermissionDenied {
            PermissionError::Denied(path.to_path_buf())
        } else {
            PermissionError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    }
}

#[derive(Debug, Error)]
#[error("{} permission change(s) failed under {}", .failures.len(), .root.display())]
pub struct PermissionsFailed {
    pub root: PathBuf,
    pub failures: Vec<PermissionError>,
}

#[derive(Debug, Default)]
pub struct PermissionReport {
    /// Files and directories whose mode was applied
    pub applied: usize,
    pub failures: Vec<PermissionError>,
}

impl PermissionReport {
    fn fail(&mut self, error: PermissionError) {
        tracing::error!("{}", error);
        self.failures.push(error);
    }

    pub fn into_result(self, root: &Path) -> Result<usize, PermissionsFailed> {
        if self.failures.is_empty() {
            Ok(self.applied)
        } else {
            Err(PermissionsFailed {
                root: root.to_path_buf(),
                failures: self.failures,
            })
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryKind {
    File,
    Dir,
}

/// Apply `files_mode`/`dirs_mode` and ownership to every entry under `root`,
/// `root` included.
///
/// Failures are collected per path; the walk always covers the whole tree.
/// Symlinks are left alone.
pub fn normalize(root: &Path, perms: &CertsPermissions) -> PermissionReport {
    let mut report = PermissionReport::default();
    let owner = resolve_owner(perms, &mut report);

    let mut walker = ignore::WalkBuilder::new(root);
    walker
        .hidden(false)
        .ignore(false)
        .git_ignore(false)
        .git_global(false)
        .git_exclude(false)
        .parents(false)
        .follow_links(false);

    for entry in walker.build() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                report.fail(PermissionError::Walk(e.to_string()));
                continue;
            }
        };
        let Some(file_type) = entry.file_type() else {
            continue;
        };
        let kind = if file_type.is_dir() {
            EntryKind::Dir
        } else if file_type.is_file() {
            EntryKind::File
        } else {
            continue;
        };

        let path = entry.path();
        let mode = match kind {
            EntryKind::File => perms.files_mode,
            EntryKind::Dir => perms.dirs_mode,
        };

        // Ownership first: chown may clear setuid/setgid bits set by the mode.
        if let Err(e) = apply_owner(path, owner) {
            report.fail(e);
        }
        match apply_mode(path, mode) {
            Ok(()) => report.applied += 1,
            Err(e) => report.fail(e),
        }
    }

    tracing::debug!(
        root = %root.display(),
        applied = report.applied,
        failures = report.failures.len(),
        "Normalized certificate permissions"
    );
    report
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Owner {
    uid: Option<u32>,
    gid: Option<u32>,
}

fn resolve_owner(perms: &CertsPermissions, report: &mut PermissionReport) -> Owner {
    let mut owner = Owner::default();
    if let Some(user) = perms.user.as_deref() {
        match users::uid_for(user) {
            Some(uid) => owner.uid = Some(uid),
            None => report.fail(PermissionError::UnknownUser(user.to_string())),
        }
    }
    if let Some(group) = perms.group.as_deref() {
        match users::gid_for(group) {
            Some(gid) => owner.gid = Some(gid),
            None => report.fail(PermissionError::UnknownGroup(group.to_string())),
        }
    }
    owner
}

#[cfg(unix)]
fn apply_mode(path: &Path, mode: u32) -> Result<(), PermissionError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
        .map_err(|e| PermissionError::from_io(path, e))
}

#[cfg(not(unix))]
fn apply_mode(_path: &Path, _mode: u32) -> Result<(), PermissionError> {
    Ok(())
}

#[cfg(unix)]
fn apply_owner(path: &Path, owner: Owner) -> Result<(), PermissionError> {
    if owner == Owner::default() {
        return Ok(());
    }
    std::os::unix::fs::lchown(path, owner.uid, owner.gid)
        .map_err(|e| PermissionError::from_io(path, e))
}

#[cfg(not(unix))]
fn apply_owner(_path: &Path, _owner: Owner) -> Result<(), PermissionError> {
    Ok(())
}

#[cfg(unix)]
mod users {
    use std::ffi::CString;

    const MAX_BUFFER: usize = 1 << 20;

    /// Numeric ids are taken as-is; names go through the system database.
    pub fn uid_for(name: &str) -> Option<u32> {
        if let Ok(id) = name.parse::<u32>() {
            return Some(id);
        }
        let c_name = CString::new(name).ok()?;
        let mut buf = vec![0 as libc::c_char; 1024];
        loop {
            let mut pwd: libc::passwd = unsafe { std::mem::zeroed() };
            let mut result: *mut libc::passwd = std::ptr::null_mut();
            let rc = unsafe {
                libc::getpwnam_r(
                    c_name.as_ptr(),
                    &mut pwd,
                    buf.as_mut_ptr(),
                    buf.len(),
                    &mut result,
                )
            };
            if rc == libc::ERANGE && buf.len() < MAX_BUFFER {
                buf.resize(buf.len() * 2, 0);
                continue;
            }
            if rc != 0 || result.is_null() {
                return None;
            }
            return Some(pwd.pw_uid);
        }
    }

    pub fn gid_for(name: &str) -> Option<u32> {
        if let Ok(id) = name.parse::<u32>() {
            return Some(id);
        }
        let c_name = CString::new(name).ok()?;
        let mut buf = vec![0 as libc::c_char; 1024];
        loop {
            let mut grp: libc::group = unsafe { std::mem::zeroed() };
            let mut result: *mut libc::group = std::ptr::null_mut();
            let rc = unsafe {
                libc::getgrnam_r(
                    c_name.as_ptr(),
                    &mut grp,
                    buf.as_mut_ptr(),
                    buf.len(),
                    &mut result,
                )
            };
            if rc == libc::ERANGE && buf.len() < MAX_BUFFER {
                buf.resize(buf.len() * 2, 0);
                continue;
            }
            if rc != 0 || result.is_null() {
                return None;
            }
            return Some(grp.gr_gid);
        }
    }
}

// Ownership is never applied on these platforms.
#[cfg(not(unix))]
mod users {
    pub fn uid_for(_name: &str) -> Option<u32> {
        Some(0)
    }

    pub fn gid_for(_name: &str) -> Option<u32> {
        Some(0)
    }
}
