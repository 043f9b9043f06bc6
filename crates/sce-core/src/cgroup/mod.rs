//! Cgroup resource management.
//!
//! Containers get a cgroup at `<cgroupfs>/<parent>/<name>` on the unified
//! hierarchy. Memory and cpuset limits are written to its control files;
//! device rules go to the legacy `devices` hierarchy when the host still
//! mounts one.

pub mod cpuset;
pub mod devices;
pub mod memory;

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use sce_common::error::{Result, SceError};

use crate::device::DeviceRule;

/// Declarative cgroup settings for one container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CgroupSpec {
    /// Cgroup name, equal to the container name.
    pub name: String,
    /// Parent group the container cgroup is nested under.
    pub parent: String,
    /// Grant access to every device, ignoring `allowed_devices`.
    pub allow_all_devices: bool,
    /// Device access rules.
    pub allowed_devices: Vec<DeviceRule>,
    /// Memory ceiling in bytes.
    pub memory: Option<u64>,
    /// Cpuset core list in kernel syntax.
    pub cpuset_cpus: Option<String>,
}

/// Handle to a cgroup for a specific container.
#[derive(Debug)]
pub struct CgroupManager {
    /// Path to this container's cgroup directory.
    path: PathBuf,
    /// Path in the legacy devices hierarchy, when one is mounted.
    devices_path: Option<PathBuf>,
}

const RMDIR_ATTEMPTS: u32 = 20;
const RMDIR_BACKOFF: Duration = Duration::from_millis(25);

impl CgroupManager {
    /// Creates the container cgroup under the host cgroupfs and applies `spec`.
    ///
    /// # Errors
    ///
    /// Returns an error if the cgroup already exists, cannot be created, or a
    /// limit cannot be written.
    pub fn create(spec: &CgroupSpec) -> Result<Self> {
        Self::create_in(Path::new(sce_common::constants::CGROUP_ROOT), spec)
    }

    /// Creates the container cgroup under `root` and applies `spec`.
    ///
    /// # Errors
    ///
    /// Returns an error if the cgroup already exists, cannot be created, or a
    /// limit cannot be written.
    pub fn create_in(root: &Path, spec: &CgroupSpec) -> Result<Self> {
        let parent = root.join(&spec.parent);
        std::fs::create_dir_all(&parent).map_err(|e| SceError::Io {
            path: parent.clone(),
            source: e,
        })?;
        enable_controllers(root, &parent, spec);

        let path = parent.join(&spec.name);
        std::fs::create_dir(&path).map_err(|e| SceError::Io {
            path: path.clone(),
            source: e,
        })?;
        tracing::info!(path = %path.display(), "cgroup created");

        let mut manager = Self {
            path,
            devices_path: None,
        };
        if let Err(e) = manager.apply(root, spec) {
            let _ = manager.destroy();
            return Err(e);
        }
        Ok(manager)
    }

    fn apply(&mut self, root: &Path, spec: &CgroupSpec) -> Result<()> {
        if let Some(bytes) = spec.memory {
            memory::set_memory_max(&self.path, bytes)?;
        }
        if let Some(cpus) = &spec.cpuset_cpus {
            cpuset::set_cpuset_cpus(&self.path, cpus)?;
        }

        let legacy = root.join("devices");
        if legacy.is_dir() {
            let devices_path = legacy.join(&spec.parent).join(&spec.name);
            std::fs::create_dir_all(&devices_path).map_err(|e| SceError::Io {
                path: devices_path.clone(),
                source: e,
            })?;
            devices::apply_device_rules(&devices_path, spec.allow_all_devices, &spec.allowed_devices)?;
            self.devices_path = Some(devices_path);
        } else if !spec.allow_all_devices {
            tracing::warn!(
                rules = spec.allowed_devices.len(),
                "no devices cgroup hierarchy mounted, device rules not enforced"
            );
        }
        Ok(())
    }

    /// Returns the cgroup directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Adds a process to this cgroup by writing its PID.
    ///
    /// # Errors
    ///
    /// Returns an error if writing to `cgroup.procs` fails.
    pub fn add_process(&self, pid: u32) -> Result<()> {
        for dir in std::iter::once(&self.path).chain(self.devices_path.as_ref()) {
            let procs_path = dir.join("cgroup.procs");
            std::fs::write(&procs_path, pid.to_string()).map_err(|e| SceError::Io {
                path: procs_path,
                source: e,
            })?;
        }
        tracing::debug!(pid, "added process to cgroup");
        Ok(())
    }

    /// Kills every process still in the cgroup.
    ///
    /// Uses `cgroup.kill` when the kernel provides it and falls back to
    /// signalling each PID listed in `cgroup.procs`.
    pub fn kill_all(&self) {
        let kill_file = self.path.join("cgroup.kill");
        if kill_file.exists() && std::fs::write(&kill_file, "1").is_ok() {
            return;
        }
        let Ok(procs) = std::fs::read_to_string(self.path.join("cgroup.procs")) else {
            return;
        };
        for pid in procs.lines().filter_map(|l| l.trim().parse::<i32>().ok()) {
            let _ = nix::sys::signal::kill(
                nix::unistd::Pid::from_raw(pid),
                nix::sys::signal::Signal::SIGKILL,
            );
        }
    }

    /// Removes the cgroup and releases resources.
    ///
    /// A cgroup can only be removed once its last process is reaped, so
    /// `EBUSY` is retried for a short while.
    ///
    /// # Errors
    ///
    /// Returns an error if the cgroup directory cannot be removed.
    pub fn destroy(&self) -> Result<()> {
        for dir in std::iter::once(&self.path).chain(self.devices_path.as_ref()) {
            remove_cgroup_dir(dir)?;
        }
        tracing::info!(path = %self.path.display(), "cgroup destroyed");
        Ok(())
    }
}

fn remove_cgroup_dir(dir: &Path) -> Result<()> {
    let mut attempt = 0;
    loop {
        match std::fs::remove_dir(dir) {
            Ok(()) => return Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) if e.raw_os_error() == Some(libc::EBUSY) && attempt < RMDIR_ATTEMPTS => {
                attempt += 1;
                std::thread::sleep(RMDIR_BACKOFF);
            }
            Err(e) => {
                return Err(SceError::Io {
                    path: dir.to_path_buf(),
                    source: e,
                });
            }
        }
    }
}

/// Enables the memory and cpuset controllers down to `parent`.
///
/// Failures are logged: controllers may already be enabled, or the host
/// may not offer them, in which case writing the limit reports the error.
fn enable_controllers(root: &Path, parent: &Path, spec: &CgroupSpec) {
    let mut controllers = Vec::new();
    if spec.memory.is_some() {
        controllers.push("+memory");
    }
    if spec.cpuset_cpus.is_some() {
        controllers.push("+cpuset");
    }
    if controllers.is_empty() {
        return;
    }
    let value = controllers.join(" ");
    for dir in [root, parent] {
        let file = dir.join("cgroup.subtree_control");
        if let Err(e) = std::fs::write(&file, &value) {
            tracing::debug!(path = %file.display(), error = %e, "enabling controllers failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(name: &str) -> CgroupSpec {
        CgroupSpec {
            name: name.into(),
            parent: "system".into(),
            allow_all_devices: false,
            allowed_devices: crate::device::default_allowed_devices(),
            memory: Some(64 * 1024 * 1024),
            cpuset_cpus: Some("0-1".into()),
        }
    }

    #[test]
    fn create_in_writes_limits() {
        let root = tempfile::tempdir().unwrap();
        let cg = CgroupManager::create_in(root.path(), &spec("abc")).unwrap();

        assert_eq!(cg.path(), root.path().join("system/abc"));
        let mem = std::fs::read_to_string(cg.path().join("memory.max")).unwrap();
        assert_eq!(mem, "67108864");
        let cpus = std::fs::read_to_string(cg.path().join("cpuset.cpus")).unwrap();
        assert_eq!(cpus, "0-1");
    }

    #[test]
    fn unset_limits_are_not_written() {
        let root = tempfile::tempdir().unwrap();
        let mut s = spec("unlimited");
        s.memory = None;
        s.cpuset_cpus = None;
        let cg = CgroupManager::create_in(root.path(), &s).unwrap();
        assert!(!cg.path().join("memory.max").exists());
        assert!(!cg.path().join("cpuset.cpus").exists());
    }

    #[test]
    fn create_in_refuses_existing_cgroup() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(root.path().join("system/dup")).unwrap();
        assert!(CgroupManager::create_in(root.path(), &spec("dup")).is_err());
    }

    #[test]
    fn legacy_devices_hierarchy_receives_rules() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir(root.path().join("devices")).unwrap();
        let _cg = CgroupManager::create_in(root.path(), &spec("dev")).unwrap();
        let allow = std::fs::read_to_string(root.path().join("devices/system/dev/devices.allow"))
            .unwrap();
        assert!(allow.contains("c 1:3 rwm"));
    }

    #[test]
    fn destroy_of_missing_cgroup_is_ok() {
        let cg = CgroupManager {
            path: PathBuf::from("/nonexistent/cgroup/path"),
            devices_path: None,
        };
        assert!(cg.destroy().is_ok());
    }
}
