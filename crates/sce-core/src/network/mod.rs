//! Container networking.
//!
//! Every container gets a loopback interface. When an address is
//! configured it also gets one end of a veth pair whose other end is
//! attached to a host bridge; the bridge's IPv4 address is the
//! container's default gateway.

pub mod bridge;
pub mod setup;

use std::net::Ipv4Addr;

use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};

use sce_common::types::{InterfaceName, MacAddress};

/// A network definition enacted inside the container's network namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum NetworkSpec {
    /// The loopback interface.
    Loopback(LoopbackSpec),
    /// A veth pair bridged to the host.
    Veth(VethSpec),
}

impl NetworkSpec {
    /// Returns `true` for loopback definitions.
    #[must_use]
    pub const fn is_loopback(&self) -> bool {
        matches!(self, Self::Loopback(_))
    }

    /// Returns the veth definition, if this is one.
    #[must_use]
    pub const fn as_veth(&self) -> Option<&VethSpec> {
        match self {
            Self::Veth(v) => Some(v),
            Self::Loopback(_) => None,
        }
    }
}

/// Loopback interface definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopbackSpec {
    /// Recorded loopback address.
    pub address: String,
    /// Recorded loopback gateway.
    pub gateway: String,
}

impl Default for LoopbackSpec {
    fn default() -> Self {
        Self {
            address: sce_common::constants::LOOPBACK_ADDRESS.into(),
            gateway: "localhost".into(),
        }
    }
}

/// Veth pair definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VethSpec {
    /// Interface name inside the container.
    pub name: String,
    /// Host bridge the host end is attached to.
    pub bridge: String,
    /// Name of the host end.
    pub host_interface: InterfaceName,
    /// MAC address of the container end.
    pub mac: MacAddress,
    /// MTU of both ends.
    pub mtu: u32,
    /// Address and prefix of the container end.
    pub address: IpNetwork,
    /// Default gateway, the bridge address.
    pub gateway: Ipv4Addr,
}
