//! Linux namespace management for container isolation.
//!
//! The container is created by a single `clone(2)` carrying the flags of
//! every configured namespace; the helpers in the submodules run inside
//! the new namespaces before the target program is executed.

pub mod mount;
pub mod uts;

use std::fmt;

use nix::sched::CloneFlags;
use serde::{Deserialize, Serialize};

/// A namespace kind the container is isolated in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Namespace {
    /// Private mount table.
    Mount,
    /// Private hostname and domain name.
    Uts,
    /// Private System V IPC objects and POSIX message queues.
    Ipc,
    /// Private process ID space; the container init is PID 1.
    Pid,
    /// Private network stack.
    Network,
}

/// The namespace set every container is created with.
pub const DEFAULT_NAMESPACES: [Namespace; 5] = [
    Namespace::Mount,
    Namespace::Uts,
    Namespace::Ipc,
    Namespace::Pid,
    Namespace::Network,
];

impl Namespace {
    /// Returns the `clone(2)` flag creating this namespace.
    #[must_use]
    pub const fn clone_flag(self) -> CloneFlags {
        match self {
            Self::Mount => CloneFlags::CLONE_NEWNS,
            Self::Uts => CloneFlags::CLONE_NEWUTS,
            Self::Ipc => CloneFlags::CLONE_NEWIPC,
            Self::Pid => CloneFlags::CLONE_NEWPID,
            Self::Network => CloneFlags::CLONE_NEWNET,
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Mount => "mnt",
            Self::Uts => "uts",
            Self::Ipc => "ipc",
            Self::Pid => "pid",
            Self::Network => "net",
        };
        write!(f, "{name}")
    }
}

/// Combines the clone flags of all given namespaces.
#[must_use]
pub fn clone_flags(namespaces: &[Namespace]) -> CloneFlags {
    namespaces
        .iter()
        .fold(CloneFlags::empty(), |flags, ns| flags | ns.clone_flag())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_set_covers_all_five_namespaces() {
        let flags = clone_flags(&DEFAULT_NAMESPACES);
        assert!(flags.contains(CloneFlags::CLONE_NEWNS));
        assert!(flags.contains(CloneFlags::CLONE_NEWUTS));
        assert!(flags.contains(CloneFlags::CLONE_NEWIPC));
        assert!(flags.contains(CloneFlags::CLONE_NEWPID));
        assert!(flags.contains(CloneFlags::CLONE_NEWNET));
        assert!(!flags.contains(CloneFlags::CLONE_NEWUSER));
    }

    #[test]
    fn empty_set_has_no_flags() {
        assert!(clone_flags(&[]).is_empty());
    }
}
