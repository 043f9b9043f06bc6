//! Isolation engines implementing [`RuntimeFactory`](crate::factory::RuntimeFactory).

mod init;
pub mod linux;

use std::path::Path;

use sce_common::error::Result;

/// Loads the native Linux engine rooted at `state_root`.
///
/// # Errors
///
/// Returns an error if the state root cannot be created.
pub fn detect_factory(state_root: &Path) -> Result<linux::LinuxFactory> {
    linux::LinuxFactory::load(state_root)
}
