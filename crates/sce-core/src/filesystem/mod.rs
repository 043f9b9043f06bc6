//! Filesystem management for container isolation.
//!
//! Provides the pseudo-filesystem mount table, device-node creation in the
//! container's `/dev`, and the `chroot` root switch.

pub mod chroot;
pub mod mount;
pub mod nodes;

use std::path::{Path, PathBuf};

/// Maps an absolute container path onto the host path below `rootfs`.
#[must_use]
pub fn host_path(rootfs: &Path, container_path: &Path) -> PathBuf {
    rootfs.join(container_path.strip_prefix("/").unwrap_or(container_path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_path_nests_absolute_paths_under_rootfs() {
        let p = host_path(Path::new("/srv/root"), Path::new("/dev/null"));
        assert_eq!(p, PathBuf::from("/srv/root/dev/null"));
    }

    #[test]
    fn host_path_accepts_relative_paths() {
        let p = host_path(Path::new("/srv/root"), Path::new("proc"));
        assert_eq!(p, PathBuf::from("/srv/root/proc"));
    }
}
