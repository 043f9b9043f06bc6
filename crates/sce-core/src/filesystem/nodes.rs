//! Device-node creation in the container's `/dev`.

use nix::NixPath;
use nix::errno::Errno;
use nix::fcntl::AT_FDCWD;
use nix::sys::stat::{FchmodatFlags, Mode, SFlag, fchmodat, makedev, mknod};
use nix::unistd::{Gid, Uid, chown};

use crate::device::{DeviceKind, DeviceNode};

/// Creates `node` at `target`, the host path of its container path.
///
/// The mode is set explicitly after `mknod(2)` so the process umask does
/// not narrow it. An already existing node is left untouched. Does not
/// allocate, so it is safe between `clone(2)` and `execve(2)`.
///
/// # Errors
///
/// Returns the errno of the failing `mknod(2)`, `fchmodat(2)` or `chown(2)`.
pub fn create_device_node<P: ?Sized + NixPath>(target: &P, node: &DeviceNode) -> nix::Result<()> {
    let kind = match node.kind {
        DeviceKind::Char => SFlag::S_IFCHR,
        DeviceKind::Block => SFlag::S_IFBLK,
    };
    let mode = Mode::from_bits_truncate(node.file_mode);
    match mknod(target, kind, mode, makedev(node.major, node.minor)) {
        Ok(()) => {}
        Err(Errno::EEXIST) => return Ok(()),
        Err(e) => return Err(e),
    }
    fchmodat(AT_FDCWD, target, mode, FchmodatFlags::FollowSymlink)?;
    chown(
        target,
        Some(Uid::from_raw(node.uid)),
        Some(Gid::from_raw(node.gid)),
    )
}
