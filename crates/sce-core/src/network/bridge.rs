//! Host bridge address resolution.
//!
//! The container's default gateway is the first IPv4 address bound to the
//! configured bridge. Addresses without an IPv4 form are skipped; an
//! IPv4-mapped IPv6 address counts as IPv4.

use std::net::{IpAddr, Ipv4Addr};

use sce_common::error::{Result, SceError};

/// Source of bridge gateway addresses.
pub trait BridgeLookup {
    /// Returns the IPv4 address bound to the interface `bridge`.
    ///
    /// # Errors
    ///
    /// Returns [`SceError::Bridge`] if the interface does not exist or
    /// carries no IPv4 address.
    fn bridge_ipv4(&self, bridge: &str) -> Result<Ipv4Addr>;
}

/// Looks bridges up among the host's network interfaces.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostInterfaces;

impl BridgeLookup for HostInterfaces {
    fn bridge_ipv4(&self, bridge: &str) -> Result<Ipv4Addr> {
        resolve_bridge_ipv4(bridge)
    }
}

/// Enumerates host interfaces and returns the IPv4 address of `bridge`.
///
/// # Errors
///
/// Returns [`SceError::Bridge`] if interfaces cannot be listed, the bridge
/// does not exist, or it has no IPv4 address.
pub fn resolve_bridge_ipv4(bridge: &str) -> Result<Ipv4Addr> {
    let addrs = nix::ifaddrs::getifaddrs().map_err(|e| SceError::Bridge {
        bridge: bridge.into(),
        reason: format!("unable to retrieve interfaces: {e}"),
    })?;
    let entries = addrs.map(|ifa| {
        let ip = ifa.address.as_ref().and_then(|addr| {
            addr.as_sockaddr_in()
                .map(|sin| IpAddr::V4(sin.ip()))
                .or_else(|| addr.as_sockaddr_in6().map(|sin6| IpAddr::V6(sin6.ip())))
        });
        (ifa.interface_name, ip)
    });
    let ip = select_bridge_ipv4(bridge, entries)?;
    tracing::debug!(bridge, %ip, "resolved bridge address");
    Ok(ip)
}

/// Picks the first IPv4 address of `bridge` from `(interface, address)` pairs.
///
/// `getifaddrs(3)` yields one entry per address, plus address-less entries
/// for link-level records.
///
/// # Errors
///
/// Returns [`SceError::Bridge`] if no entry names `bridge` or none of its
/// addresses is IPv4.
pub fn select_bridge_ipv4<I>(bridge: &str, entries: I) -> Result<Ipv4Addr>
where
    I: IntoIterator<Item = (String, Option<IpAddr>)>,
{
    let mut found = false;
    for (name, addr) in entries {
        if name != bridge {
            continue;
        }
        found = true;
        let v4 = match addr {
            Some(IpAddr::V4(v4)) => Some(v4),
            Some(IpAddr::V6(v6)) => v6.to_ipv4_mapped(),
            None => None,
        };
        if let Some(v4) = v4 {
            return Ok(v4);
        }
    }
    let reason = if found {
        "no IPv4 address bound"
    } else {
        "interface not found"
    };
    Err(SceError::Bridge {
        bridge: bridge.into(),
        reason: reason.into(),
    })
}
