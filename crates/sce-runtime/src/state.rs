//! Persistent container state.
//!
//! The Linux engine records each container in
//! `<root>/<name>/state.json` for as long as it exists, so an operator can
//! see which cgroup and veth belong to a running container. The directory
//! is removed on destroy.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use sce_common::error::{Result, SceError};

use crate::config::IsolationConfig;

/// Lifecycle status recorded in the state file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerStatus {
    /// Resources allocated, program not started.
    Created,
    /// Program running.
    Running,
    /// Program terminated, resources not yet released.
    Stopped,
}

impl fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Running => write!(f, "running"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// Persistent record of a container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateEntry {
    /// Container name.
    pub name: String,
    /// Current lifecycle status.
    pub status: ContainerStatus,
    /// Host PID of the container init, once started.
    pub init_pid: Option<i32>,
    /// Cgroup directory of the container.
    pub cgroup_path: PathBuf,
    /// ISO-8601 creation timestamp.
    pub created_at: String,
    /// Configuration the container was created with.
    pub config: IsolationConfig,
}

/// Loads a state file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn load_state(path: &Path) -> Result<StateEntry> {
    let content = std::fs::read_to_string(path).map_err(|e| SceError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(serde_json::from_str(&content)?)
}

/// Persists a state file atomically through a temporary file and rename.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn save_state(path: &Path, entry: &StateEntry) -> Result<()> {
    let json = serde_json::to_string_pretty(entry)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json).map_err(|e| SceError::Io {
        path: tmp.clone(),
        source: e,
    })?;
    std::fs::rename(&tmp, path).map_err(|e| SceError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    tracing::debug!(path = %path.display(), status = %entry.status, "state saved");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use sce_common::config::{Options, RawOptions};

    use super::*;
    use crate::config::build_isolation_config;
    use crate::identity::ContainerIdentity;

    fn entry(rootfs: &Path) -> StateEntry {
        let opts = Options::validate(RawOptions {
            chroot: rootfs.to_string_lossy().into_owned(),
            bridge: "docker0".into(),
            program: vec!["/bin/true".into()],
            ..RawOptions::default()
        })
        .unwrap();
        let id = ContainerIdentity::generate(false).unwrap();
        let config = build_isolation_config(&opts, &id, Ipv4Addr::new(172, 17, 0, 1));
        StateEntry {
            name: id.name.to_string(),
            status: ContainerStatus::Created,
            init_pid: None,
            cgroup_path: PathBuf::from("/sys/fs/cgroup/system").join(id.name.as_str()),
            created_at: chrono::Utc::now().to_rfc3339(),
            config,
        }
    }

    #[test]
    fn state_survives_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let mut e = entry(dir.path());
        e.status = ContainerStatus::Running;
        e.init_pid = Some(4242);

        save_state(&path, &e).unwrap();
        let loaded = load_state(&path).unwrap();
        assert_eq!(loaded, e);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn status_is_lowercase_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        save_state(&path, &entry(dir.path())).unwrap();
        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"status\": \"created\""));
    }

    #[test]
    fn loading_missing_state_fails() {
        assert!(load_state(Path::new("/nonexistent/state.json")).is_err());
    }
}
