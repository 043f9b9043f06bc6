//! Device definitions shared by the cgroup device controller and the
//! device-node setup of the container's `/dev`.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Kind of device special file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceKind {
    /// Character device.
    Char,
    /// Block device.
    Block,
}

impl DeviceKind {
    /// Letter used by the cgroup `devices.allow` syntax.
    #[must_use]
    pub const fn letter(self) -> char {
        match self {
            Self::Char => 'c',
            Self::Block => 'b',
        }
    }
}

/// A device node created inside the container's `/dev`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceNode {
    /// Absolute path inside the container.
    pub path: PathBuf,
    /// Character or block device.
    pub kind: DeviceKind,
    /// Major number.
    pub major: u64,
    /// Minor number.
    pub minor: u64,
    /// Permission bits of the node.
    pub file_mode: u32,
    /// Owner user ID.
    pub uid: u32,
    /// Owner group ID.
    pub gid: u32,
}

impl DeviceNode {
    fn simple(path: &str, major: u64, minor: u64) -> Self {
        Self {
            path: PathBuf::from(path),
            kind: DeviceKind::Char,
            major,
            minor,
            file_mode: 0o666,
            uid: 0,
            gid: 0,
        }
    }

    /// The cgroup rule granting full access to this node.
    #[must_use]
    pub fn allow_rule(&self) -> DeviceRule {
        DeviceRule {
            kind: self.kind,
            major: Some(self.major),
            minor: Some(self.minor),
            permissions: "rwm".into(),
        }
    }
}

/// Minimal device nodes created before the root is switched.
#[must_use]
pub fn default_simple_devices() -> Vec<DeviceNode> {
    vec![
        DeviceNode::simple("/dev/null", 1, 3),
        DeviceNode::simple("/dev/zero", 1, 5),
        DeviceNode::simple("/dev/full", 1, 7),
        DeviceNode::simple("/dev/tty", 5, 0),
        DeviceNode::simple("/dev/urandom", 1, 9),
        DeviceNode::simple("/dev/random", 1, 8),
    ]
}

/// A cgroup device access rule; `None` numbers are wildcards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRule {
    /// Character or block device.
    pub kind: DeviceKind,
    /// Major number, `None` for any.
    pub major: Option<u64>,
    /// Minor number, `None` for any.
    pub minor: Option<u64>,
    /// Any combination of `r`, `w` and `m`.
    pub permissions: String,
}

impl DeviceRule {
    fn new(kind: DeviceKind, major: Option<u64>, minor: Option<u64>, permissions: &str) -> Self {
        Self {
            kind,
            major,
            minor,
            permissions: permissions.into(),
        }
    }
}

impl fmt::Display for DeviceRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let num = |n: Option<u64>| n.map_or_else(|| "*".to_string(), |n| n.to_string());
        write!(
            f,
            "{} {}:{} {}",
            self.kind.letter(),
            num(self.major),
            num(self.minor),
            self.permissions
        )
    }
}

/// Devices a container may access: mknod of anything, the console and
/// ttys, ptys, tun, and the simple device set.
#[must_use]
pub fn default_allowed_devices() -> Vec<DeviceRule> {
    use DeviceKind::{Block, Char};

    let mut rules = vec![
        DeviceRule::new(Char, None, None, "m"),
        DeviceRule::new(Block, None, None, "m"),
        // /dev/console
        DeviceRule::new(Char, Some(5), Some(1), "rwm"),
        // /dev/tty0
        DeviceRule::new(Char, Some(4), Some(0), "rwm"),
        // /dev/tty1
        DeviceRule::new(Char, Some(4), Some(1), "rwm"),
        // /dev/pts/*
        DeviceRule::new(Char, Some(136), None, "rwm"),
        // /dev/ptmx
        DeviceRule::new(Char, Some(5), Some(2), "rwm"),
        // /dev/net/tun
        DeviceRule::new(Char, Some(10), Some(200), "rwm"),
    ];
    rules.extend(default_simple_devices().iter().map(DeviceNode::allow_rule));
    rules
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rule_display_uses_cgroup_syntax() {
        let any = DeviceRule::new(DeviceKind::Block, None, None, "m");
        assert_eq!(any.to_string(), "b *:* m");
        let null = default_simple_devices()[0].allow_rule();
        assert_eq!(null.to_string(), "c 1:3 rwm");
    }

    #[test]
    fn allowed_devices_include_every_simple_device() {
        let allowed = default_allowed_devices();
        for node in default_simple_devices() {
            assert!(allowed.contains(&node.allow_rule()), "{}", node.path.display());
        }
    }

    #[test]
    fn simple_devices_live_under_dev() {
        for node in default_simple_devices() {
            assert!(node.path.starts_with("/dev"));
            assert_eq!(node.file_mode, 0o666);
        }
    }
}
