//! Device access control on the legacy `devices` hierarchy.
//!
//! Access is denied wholesale, then each allowed rule is written to
//! `devices.allow`, one rule per write.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use sce_common::error::{Result, SceError};

use crate::device::DeviceRule;

/// Applies device rules to a cgroup in the devices hierarchy.
///
/// # Errors
///
/// Returns an error if `devices.deny` or `devices.allow` cannot be written.
pub fn apply_device_rules(cgroup_path: &Path, allow_all: bool, rules: &[DeviceRule]) -> Result<()> {
    if allow_all {
        return write_rule(&cgroup_path.join("devices.allow"), "a");
    }
    write_rule(&cgroup_path.join("devices.deny"), "a")?;
    let allow = cgroup_path.join("devices.allow");
    for rule in rules {
        write_rule(&allow, &rule.to_string())?;
    }
    tracing::debug!(rules = rules.len(), "device rules applied");
    Ok(())
}

fn write_rule(file: &Path, rule: &str) -> Result<()> {
    let io_err = |e: std::io::Error| SceError::Io {
        path: file.to_path_buf(),
        source: e,
    };
    let mut f = OpenOptions::new()
        .append(true)
        .create(true)
        .open(file)
        .map_err(io_err)?;
    f.write_all(rule.as_bytes()).map_err(io_err)
}
