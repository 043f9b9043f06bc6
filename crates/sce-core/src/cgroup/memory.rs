//! Memory resource control.
//!
//! Manages the `memory.max` hard ceiling of a container cgroup.

use std::path::Path;

use sce_common::error::{Result, SceError};

/// Sets the hard memory limit for a cgroup.
///
/// # Errors
///
/// Returns an error if writing to `memory.max` fails.
pub fn set_memory_max(cgroup_path: &Path, bytes: u64) -> Result<()> {
    let file = cgroup_path.join("memory.max");
    std::fs::write(&file, bytes.to_string()).map_err(|e| SceError::Io {
        path: file,
        source: e,
    })?;
    tracing::debug!(bytes, "memory max set");
    Ok(())
}
