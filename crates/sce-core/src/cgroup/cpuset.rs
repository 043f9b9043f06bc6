//! CPU placement via the cpuset controller.
//!
//! Manages `cpuset.cpus`, which takes the kernel list syntax
//! (`0,1,2`, `0-7`, `3,5-7`).

use std::path::Path;

use sce_common::error::{Result, SceError};

/// Restricts a cgroup to the given CPU cores.
///
/// # Errors
///
/// Returns an error if writing to `cpuset.cpus` fails, which is also how
/// the kernel rejects malformed lists or offline cores.
pub fn set_cpuset_cpus(cgroup_path: &Path, cpus: &str) -> Result<()> {
    let file = cgroup_path.join("cpuset.cpus");
    std::fs::write(&file, cpus).map_err(|e| SceError::Io {
        path: file,
        source: e,
    })?;
    tracing::debug!(cpus, "cpuset set");
    Ok(())
}
