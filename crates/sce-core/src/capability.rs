//! Linux capability management for least-privilege execution.
//!
//! Every capability outside the container's allow-list is removed from
//! the bounding set before `execve(2)`, so the contained program can never
//! regain it, even when it runs as root.

use std::fmt;

use caps::{CapSet, CapsHashSet};
use serde::{Deserialize, Serialize};

use sce_common::error::{Result, SceError};

/// Linux capability identifiers retained by containers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Capability {
    /// Change file ownership.
    Chown,
    /// Bypass file read, write and execute permission checks.
    DacOverride,
    /// Keep set-user-ID bits on modified files.
    Fsetid,
    /// Bypass checks requiring file ownership.
    Fowner,
    /// Create special files with `mknod(2)`.
    Mknod,
    /// Use raw and packet sockets.
    NetRaw,
    /// Set group IDs.
    Setgid,
    /// Set user IDs.
    Setuid,
    /// Set file capabilities.
    Setfcap,
    /// Transfer capabilities from the bounding set.
    Setpcap,
    /// Bind to ports below 1024.
    NetBindService,
    /// Use `chroot(2)`.
    SysChroot,
    /// Send signals to arbitrary processes.
    Kill,
    /// Write records to the kernel audit log.
    AuditWrite,
}

/// Capabilities a container keeps; everything else is dropped.
pub const DEFAULT_CAPABILITIES: [Capability; 14] = [
    Capability::Chown,
    Capability::DacOverride,
    Capability::Fsetid,
    Capability::Fowner,
    Capability::Mknod,
    Capability::NetRaw,
    Capability::Setgid,
    Capability::Setuid,
    Capability::Setfcap,
    Capability::Setpcap,
    Capability::NetBindService,
    Capability::SysChroot,
    Capability::Kill,
    Capability::AuditWrite,
];

impl Capability {
    /// The matching `caps` identifier.
    #[must_use]
    pub const fn to_caps(self) -> caps::Capability {
        match self {
            Self::Chown => caps::Capability::CAP_CHOWN,
            Self::DacOverride => caps::Capability::CAP_DAC_OVERRIDE,
            Self::Fsetid => caps::Capability::CAP_FSETID,
            Self::Fowner => caps::Capability::CAP_FOWNER,
            Self::Mknod => caps::Capability::CAP_MKNOD,
            Self::NetRaw => caps::Capability::CAP_NET_RAW,
            Self::Setgid => caps::Capability::CAP_SETGID,
            Self::Setuid => caps::Capability::CAP_SETUID,
            Self::Setfcap => caps::Capability::CAP_SETFCAP,
            Self::Setpcap => caps::Capability::CAP_SETPCAP,
            Self::NetBindService => caps::Capability::CAP_NET_BIND_SERVICE,
            Self::SysChroot => caps::Capability::CAP_SYS_CHROOT,
            Self::Kill => caps::Capability::CAP_KILL,
            Self::AuditWrite => caps::Capability::CAP_AUDIT_WRITE,
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.to_caps().fmt(f)
    }
}

/// Capabilities the running kernel knows about.
#[must_use]
pub fn supported_capabilities() -> CapsHashSet {
    caps::runtime::thread_all_supported()
}

/// Lists the capabilities in `supported` not present in `keep`, in kernel
/// number order.
#[must_use]
pub fn capabilities_to_drop(keep: &[Capability], supported: &CapsHashSet) -> Vec<caps::Capability> {
    let mut drop: Vec<_> = supported
        .iter()
        .copied()
        .filter(|cap| !keep.iter().any(|k| k.to_caps() == *cap))
        .collect();
    drop.sort_by_key(|cap| cap.index());
    drop
}

/// Checks that the calling thread may shrink bounding sets.
///
/// # Errors
///
/// Returns [`SceError::PermissionDenied`] without effective `CAP_SETPCAP`.
pub fn ensure_can_drop() -> Result<()> {
    match caps::has_cap(None, CapSet::Effective, caps::Capability::CAP_SETPCAP) {
        Ok(true) => Ok(()),
        Ok(false) => Err(SceError::PermissionDenied {
            message: "CAP_SETPCAP is required to restrict container capabilities".into(),
        }),
        Err(e) => Err(SceError::PermissionDenied {
            message: format!("reading effective capabilities failed: {e}"),
        }),
    }
}

/// Drops `drop` from the calling thread's bounding set.
///
/// Runs in a freshly cloned child, so it takes a precomputed list and
/// reports only the capability that could not be dropped.
///
/// # Errors
///
/// Returns the first capability whose drop was refused.
pub fn drop_bounding_set(drop: &[caps::Capability]) -> std::result::Result<(), caps::Capability> {
    for &cap in drop {
        if caps::drop(None, CapSet::Bounding, cap).is_err() {
            return Err(cap);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_allow_list_has_fourteen_distinct_capabilities() {
        let kept: CapsHashSet = DEFAULT_CAPABILITIES.iter().map(|c| c.to_caps()).collect();
        assert_eq!(kept.len(), 14);
    }

    #[test]
    fn drop_list_excludes_exactly_the_allow_list() {
        let all = caps::all();
        let drop = capabilities_to_drop(&DEFAULT_CAPABILITIES, &all);
        assert_eq!(drop.len(), all.len() - 14);
        for cap in DEFAULT_CAPABILITIES {
            assert!(!drop.contains(&cap.to_caps()), "{cap} must be kept");
        }
        assert!(drop.contains(&caps::Capability::CAP_SYS_ADMIN));
        assert!(drop.windows(2).all(|w| w[0].index() < w[1].index()));
    }

    #[test]
    fn drop_list_is_limited_to_supported_capabilities() {
        let supported: CapsHashSet = [
            caps::Capability::CAP_CHOWN,
            caps::Capability::CAP_SYS_ADMIN,
            caps::Capability::CAP_NET_ADMIN,
        ]
        .into_iter()
        .collect();
        let drop = capabilities_to_drop(&DEFAULT_CAPABILITIES, &supported);
        assert_eq!(
            drop,
            [caps::Capability::CAP_NET_ADMIN, caps::Capability::CAP_SYS_ADMIN]
        );
    }

    #[test]
    fn kernel_reports_the_allow_list_as_supported() {
        let supported = supported_capabilities();
        for cap in DEFAULT_CAPABILITIES {
            assert!(supported.contains(&cap.to_caps()), "{cap} unsupported");
        }
    }

    #[test]
    fn display_uses_kernel_names() {
        assert_eq!(Capability::NetBindService.to_string(), "CAP_NET_BIND_SERVICE");
    }
}
