//! Root filesystem switching via `chroot(2)`.
//!
//! The executor never pivots the root: a plain `chroot` into the resolved
//! rootfs followed by `chdir("/")` is all the container gets.

use nix::NixPath;

/// Changes the root directory of the calling process to `rootfs`.
///
/// # Errors
///
/// Returns the errno of the failing `chroot(2)` or `chdir(2)`.
pub fn chroot_into<P: ?Sized + NixPath>(rootfs: &P) -> nix::Result<()> {
    nix::unistd::chroot(rootfs)?;
    nix::unistd::chdir("/")
}
