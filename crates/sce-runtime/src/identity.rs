//! Random container identity.
//!
//! Names and MAC addresses come from the operating system's CSPRNG so
//! sibling containers on the same host never collide in practice.

use std::fmt::Write as _;

use rand::RngCore;
use rand::rngs::OsRng;

use sce_common::constants::{
    CONTAINER_NAME_LENGTH, HOST_INTERFACE_PREFIX, HOST_INTERFACE_SUFFIX_LENGTH,
};
use sce_common::error::{Result, SceError};
use sce_common::types::{ContainerName, InterfaceName, MacAddress};

/// Identity of one container run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerIdentity {
    /// Container name, hostname and cgroup name.
    pub name: ContainerName,
    /// Veth identity, present only when networking is enabled.
    pub network: Option<NetworkIdentity>,
}

/// Identifiers of the veth pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkIdentity {
    /// Name of the host end of the veth pair.
    pub host_interface: InterfaceName,
    /// MAC address of the container end.
    pub mac: MacAddress,
}

impl ContainerIdentity {
    /// Generates a fresh identity; veth identifiers only if `network` is set.
    ///
    /// # Errors
    ///
    /// Returns [`SceError::Identity`] if the OS random source fails.
    pub fn generate(network: bool) -> Result<Self> {
        let name = ContainerName::new(random_name("", CONTAINER_NAME_LENGTH, "container name")?)?;
        let network = if network {
            // Longer names make the kernel reject the link.
            let host = random_name(
                HOST_INTERFACE_PREFIX,
                HOST_INTERFACE_SUFFIX_LENGTH,
                "host interface name",
            )?;
            Some(NetworkIdentity {
                host_interface: InterfaceName::new(host)?,
                // A fixed MAC would confuse ARP between containers on the bridge.
                mac: random_mac()?,
            })
        } else {
            None
        };
        tracing::debug!(name = %name, network = network.is_some(), "generated container identity");
        Ok(Self { name, network })
    }
}

/// Returns `prefix` followed by `len` random lowercase hex characters.
///
/// # Errors
///
/// Returns [`SceError::Identity`] if the OS random source fails.
pub fn random_name(prefix: &str, len: usize, what: &'static str) -> Result<String> {
    let mut bytes = vec![0u8; len.div_ceil(2)];
    fill(&mut bytes, what)?;
    let mut name = String::with_capacity(prefix.len() + bytes.len() * 2);
    name.push_str(prefix);
    for b in &bytes {
        let _ = write!(name, "{b:02x}");
    }
    name.truncate(prefix.len() + len);
    Ok(name)
}

/// Returns a random MAC address whose three most significant bytes are zero.
///
/// # Errors
///
/// Returns [`SceError::Identity`] if the OS random source fails.
pub fn random_mac() -> Result<MacAddress> {
    let mut suffix = [0u8; 3];
    fill(&mut suffix, "mac address")?;
    Ok(MacAddress::without_oui(suffix))
}

fn fill(buf: &mut [u8], what: &'static str) -> Result<()> {
    OsRng.try_fill_bytes(buf).map_err(|e| SceError::Identity {
        what,
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use sce_common::constants::MAX_INTERFACE_NAME_LENGTH;

    use super::*;

    #[test]
    fn container_name_is_sixteen_hex_chars() {
        let id = ContainerIdentity::generate(false).unwrap();
        assert_eq!(id.name.as_str().len(), 16);
        assert!(id.name.as_str().chars().all(|c| c.is_ascii_hexdigit()));
        assert!(id.network.is_none());
    }

    #[test]
    fn names_do_not_repeat() {
        let names: HashSet<String> = (0..500)
            .map(|_| ContainerIdentity::generate(false).unwrap().name.to_string())
            .collect();
        assert_eq!(names.len(), 500);
    }

    #[test]
    fn host_interface_fits_kernel_limit() {
        for _ in 0..100 {
            let id = ContainerIdentity::generate(true).unwrap();
            let net = id.network.unwrap();
            let host = net.host_interface.as_str();
            assert!(host.len() <= MAX_INTERFACE_NAME_LENGTH);
            assert!(host.starts_with("veth"));
            assert_eq!(host.len(), 10);
        }
    }

    #[test]
    fn mac_has_zeroed_vendor_prefix() {
        for _ in 0..100 {
            let mac = random_mac().unwrap();
            assert_eq!(mac.octets()[..3], [0, 0, 0]);
        }
    }

    #[test]
    fn random_name_handles_odd_lengths() {
        let name = random_name("x", 7, "test").unwrap();
        assert_eq!(name.len(), 8);
        assert!(name.starts_with('x'));
    }
}
