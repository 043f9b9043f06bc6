//! Isolation configuration assembly.
//!
//! [`build_isolation_config`] turns validated options, the generated
//! identity and the bridge address into the declarative description the
//! isolation engine enacts. Nothing here can fail: every input has already
//! been validated or generated.

use std::net::Ipv4Addr;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use sce_common::config::Options;
use sce_common::constants::{CGROUP_PARENT, CONTAINER_INTERFACE_NAME, VETH_MTU};
use sce_core::capability::{Capability, DEFAULT_CAPABILITIES};
use sce_core::cgroup::CgroupSpec;
use sce_core::device::{DeviceNode, default_allowed_devices, default_simple_devices};
use sce_core::filesystem::mount::{MountSpec, default_mounts};
use sce_core::namespace::{DEFAULT_NAMESPACES, Namespace};
use sce_core::network::{LoopbackSpec, NetworkSpec, VethSpec};

use crate::identity::ContainerIdentity;

/// Everything the isolation engine applies before the program starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IsolationConfig {
    /// Absolute root filesystem.
    pub rootfs: PathBuf,
    /// Always `true`: the root is switched with `chroot`, never pivoted.
    pub no_pivot_root: bool,
    /// Hostname inside the UTS namespace.
    pub hostname: String,
    /// Namespaces the container is created in.
    pub namespaces: Vec<Namespace>,
    /// Capabilities kept in the bounding set.
    pub capabilities: Vec<Capability>,
    /// Cgroup placement and limits.
    pub cgroup: CgroupSpec,
    /// Mounts below the rootfs, in order.
    pub mounts: Vec<MountSpec>,
    /// Device nodes created in `/dev` before the root is switched.
    pub devices: Vec<DeviceNode>,
    /// Network interfaces; loopback is always first.
    pub networks: Vec<NetworkSpec>,
}

impl IsolationConfig {
    /// Returns the veth definition, if networking was requested.
    #[must_use]
    pub fn veth(&self) -> Option<&VethSpec> {
        self.networks.iter().find_map(NetworkSpec::as_veth)
    }
}

/// Builds the isolation config for one run.
///
/// The memory ceiling is set only for a non-zero limit, the cpuset only for
/// a non-empty core list, and the veth only when a network address was
/// configured and the identity carries veth identifiers.
#[must_use]
pub fn build_isolation_config(
    options: &Options,
    identity: &ContainerIdentity,
    bridge_ip: Ipv4Addr,
) -> IsolationConfig {
    let name = identity.name.to_string();

    let cgroup = CgroupSpec {
        name: name.clone(),
        parent: CGROUP_PARENT.into(),
        allow_all_devices: false,
        allowed_devices: default_allowed_devices(),
        memory: (options.memory_limit() != 0).then_some(options.memory_limit()),
        cpuset_cpus: (!options.cpu_core_ids().is_empty())
            .then(|| options.cpu_core_ids().to_string()),
    };

    let mut networks = vec![NetworkSpec::Loopback(LoopbackSpec::default())];
    if let (Some(address), Some(net)) = (options.network_address(), &identity.network) {
        networks.push(NetworkSpec::Veth(VethSpec {
            name: CONTAINER_INTERFACE_NAME.into(),
            bridge: options.bridge().into(),
            host_interface: net.host_interface.clone(),
            mac: net.mac,
            mtu: VETH_MTU,
            address,
            gateway: bridge_ip,
        }));
    }

    IsolationConfig {
        rootfs: options.rootfs().to_path_buf(),
        no_pivot_root: true,
        hostname: name,
        namespaces: DEFAULT_NAMESPACES.to_vec(),
        capabilities: DEFAULT_CAPABILITIES.to_vec(),
        cgroup,
        mounts: default_mounts(),
        devices: default_simple_devices(),
        networks,
    }
}
