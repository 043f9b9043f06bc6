//! Mount namespace isolation.
//!
//! A fresh mount namespace still shares propagation with the host until
//! the tree is remounted private.

use nix::mount::{MsFlags, mount};

/// Marks the whole mount tree private so container mounts never reach the host.
///
/// # Errors
///
/// Returns the errno of the failing `mount(2)`.
pub fn make_mounts_private() -> nix::Result<()> {
    mount(
        None::<&str>,
        "/",
        None::<&str>,
        MsFlags::MS_REC | MsFlags::MS_PRIVATE,
        None::<&str>,
    )
}
