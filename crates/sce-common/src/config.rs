//! Validated run options.
//!
//! [`RawOptions`] mirrors the command line as typed; [`Options::validate`]
//! turns it into the immutable [`Options`] threaded through bridge lookup,
//! identity generation and config building.

use std::path::{Path, PathBuf};

use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_BRIDGE;
use crate::error::{Result, SceError};

/// Unvalidated options as collected from the command line.
#[derive(Debug, Clone, Default)]
pub struct RawOptions {
    /// Memory ceiling in bytes, 0 for unlimited.
    pub memory_limit: u64,
    /// Kernel cpuset list, e.g. `0-3,6`.
    pub cpu_core_ids: String,
    /// Root filesystem to chroot into.
    pub chroot: String,
    /// CIDR address for the container interface, empty to skip networking.
    pub network_address: String,
    /// Bridge to attach the host side of the veth pair to.
    pub bridge: String,
    /// Program and its arguments.
    pub program: Vec<String>,
}

/// Validated, immutable run options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Options {
    memory_limit: u64,
    cpu_core_ids: String,
    rootfs: PathBuf,
    network_address: Option<IpNetwork>,
    bridge: String,
    program: Vec<String>,
}

impl Options {
    /// Validates raw options and resolves the root filesystem.
    ///
    /// # Errors
    ///
    /// Returns [`SceError::Config`] if the program is empty, the chroot is
    /// empty or does not resolve to an existing directory, or the network
    /// address is not in CIDR form.
    pub fn validate(raw: RawOptions) -> Result<Self> {
        if raw.program.is_empty() || raw.program[0].is_empty() {
            return Err(SceError::Config {
                message: "you need to give me some program and arguments to contain".into(),
            });
        }
        if raw.chroot.is_empty() {
            return Err(SceError::Config {
                message: "you need to provide me a chroot with --chroot".into(),
            });
        }
        let rootfs = resolve_rootfs(Path::new(&raw.chroot))?;

        let network_address = if raw.network_address.is_empty() {
            None
        } else {
            Some(parse_cidr(&raw.network_address)?)
        };

        let bridge = if raw.bridge.is_empty() {
            DEFAULT_BRIDGE.to_string()
        } else {
            raw.bridge
        };

        Ok(Self {
            memory_limit: raw.memory_limit,
            cpu_core_ids: raw.cpu_core_ids.trim().to_string(),
            rootfs,
            network_address,
            bridge,
            program: raw.program,
        })
    }

    /// Memory ceiling in bytes; 0 means unlimited.
    #[must_use]
    pub const fn memory_limit(&self) -> u64 {
        self.memory_limit
    }

    /// Cpuset core list; empty means no restriction.
    #[must_use]
    pub fn cpu_core_ids(&self) -> &str {
        &self.cpu_core_ids
    }

    /// Absolute, symlink-free root filesystem path.
    #[must_use]
    pub fn rootfs(&self) -> &Path {
        &self.rootfs
    }

    /// Address and prefix of the container interface, if networking was
    /// requested.
    #[must_use]
    pub const fn network_address(&self) -> Option<IpNetwork> {
        self.network_address
    }

    /// Whether a veth link to the bridge should be created.
    #[must_use]
    pub const fn network_enabled(&self) -> bool {
        self.network_address.is_some()
    }

    /// Bridge interface name.
    #[must_use]
    pub fn bridge(&self) -> &str {
        &self.bridge
    }

    /// Program and arguments, never empty.
    #[must_use]
    pub fn program(&self) -> &[String] {
        &self.program
    }
}

/// Resolves a root filesystem to an absolute path with symlinks evaluated.
fn resolve_rootfs(path: &Path) -> Result<PathBuf> {
    let resolved = std::fs::canonicalize(path).map_err(|e| SceError::Config {
        message: format!("unable to resolve root filesystem {}: {e}", path.display()),
    })?;
    if !resolved.is_dir() {
        return Err(SceError::Config {
            message: format!(
                "unable to resolve root filesystem {}: not a directory",
                path.display()
            ),
        });
    }
    Ok(resolved)
}

/// Parses an explicit `addr/prefix` network address.
///
/// `IpNetwork` alone would read a bare address as a host network, so the
/// prefix must be present and made of decimal digits only.
fn parse_cidr(cidr: &str) -> Result<IpNetwork> {
    let invalid = |reason: String| SceError::Config {
        message: format!(
            "invalid network address {cidr:?} ({reason}), expected CIDR such as 10.0.10.5/24"
        ),
    };
    match cidr.split_once('/') {
        Some((_, prefix)) if !prefix.is_empty() && prefix.bytes().all(|b| b.is_ascii_digit()) => {}
        Some(_) => return Err(invalid("malformed prefix".into())),
        None => return Err(invalid("missing prefix".into())),
    }
    cidr.parse::<IpNetwork>().map_err(|e| invalid(e.to_string()))
}
