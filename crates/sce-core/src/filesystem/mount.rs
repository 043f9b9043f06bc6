//! Mount table for the container filesystem.
//!
//! Mounts `/proc`, `/sys` and a writable `/dev` inside the container's
//! mount namespace, below the root filesystem, before the root is switched.

use std::fmt;
use std::path::{Path, PathBuf};

use nix::NixPath;
use nix::mount::{MsFlags, mount};
use serde::{Deserialize, Serialize};

use sce_common::error::{Result, SceError};

/// Filesystem type mounted at a destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MountSource {
    /// Process information filesystem.
    Proc,
    /// System information filesystem.
    Sysfs,
    /// Writable in-memory filesystem.
    Tmpfs,
}

impl MountSource {
    /// Filesystem type passed to `mount(2)`.
    #[must_use]
    pub const fn fstype(self) -> &'static str {
        match self {
            Self::Proc => "proc",
            Self::Sysfs => "sysfs",
            Self::Tmpfs => "tmpfs",
        }
    }

    fn flags(self) -> MsFlags {
        match self {
            Self::Proc | Self::Sysfs => MsFlags::MS_NOSUID | MsFlags::MS_NOEXEC | MsFlags::MS_NODEV,
            Self::Tmpfs => MsFlags::MS_NOSUID | MsFlags::MS_STRICTATIME,
        }
    }

    const fn data(self) -> Option<&'static str> {
        match self {
            Self::Tmpfs => Some("mode=755"),
            Self::Proc | Self::Sysfs => None,
        }
    }
}

impl fmt::Display for MountSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.fstype())
    }
}

/// One entry of the container mount table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountSpec {
    /// Filesystem to mount.
    pub source: MountSource,
    /// Absolute destination inside the container.
    pub destination: PathBuf,
}

/// The fixed mount table, in mount order.
///
/// `/dev` has to be a tmpfs so device nodes can be created in it.
#[must_use]
pub fn default_mounts() -> Vec<MountSpec> {
    [
        (MountSource::Proc, "/proc"),
        (MountSource::Sysfs, "/sys"),
        (MountSource::Tmpfs, "/dev"),
    ]
    .into_iter()
    .map(|(source, dest)| MountSpec {
        source,
        destination: PathBuf::from(dest),
    })
    .collect()
}

/// Creates the mount point `target` on the host side, before the
/// container init is cloned.
///
/// # Errors
///
/// Returns an error if the directory cannot be created.
pub fn create_mount_point(target: &Path) -> Result<()> {
    std::fs::create_dir_all(target).map_err(|e| SceError::Io {
        path: target.to_path_buf(),
        source: e,
    })
}

/// Mounts `spec` at `target`, the host path of its destination.
///
/// The mount point must already exist. Does not allocate.
///
/// # Errors
///
/// Returns the errno of the failing `mount(2)`.
pub fn mount_at<P: ?Sized + NixPath>(target: &P, spec: &MountSpec) -> nix::Result<()> {
    let fstype = spec.source.fstype();
    mount(
        Some(fstype),
        target,
        Some(fstype),
        spec.source.flags(),
        spec.source.data(),
    )
}
