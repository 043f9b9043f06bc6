//! UTS namespace isolation.
//!
//! Allows the container to have its own hostname.

/// Sets the hostname inside the container's UTS namespace.
///
/// # Errors
///
/// Returns the errno of the failing `sethostname(2)`.
pub fn set_hostname(hostname: &str) -> nix::Result<()> {
    nix::unistd::sethostname(hostname)
}
