//! System-wide constants and default paths.

/// Root directory where the isolation engine keeps per-container state.
pub const CONTAINER_HOST_PATH: &str = "/var/lib/container";

/// Name of the state file written inside each container directory.
pub const STATE_FILE_NAME: &str = "state.json";

/// Cgroup filesystem mount point.
pub const CGROUP_ROOT: &str = "/sys/fs/cgroup";

/// Parent cgroup under which every container cgroup is created.
pub const CGROUP_PARENT: &str = "system";

/// Bridge interface used when none is given on the command line.
pub const DEFAULT_BRIDGE: &str = "docker0";

/// The only environment variable handed to the contained program.
pub const DEFAULT_PATH_ENV: &str = "PATH=/bin:/usr/bin:/sbin:/usr/sbin";

/// Length of the random container name, also used as hostname and cgroup name.
pub const CONTAINER_NAME_LENGTH: usize = 16;

/// Prefix of the host-side veth interface name.
pub const HOST_INTERFACE_PREFIX: &str = "veth";

/// Random suffix length of the host-side veth interface name.
pub const HOST_INTERFACE_SUFFIX_LENGTH: usize = 6;

/// Kernel limit on interface names (`IFNAMSIZ` minus the trailing NUL).
pub const MAX_INTERFACE_NAME_LENGTH: usize = 15;

/// Name of the veth end placed inside the container.
pub const CONTAINER_INTERFACE_NAME: &str = "eth0";

/// MTU applied to both ends of the veth pair.
pub const VETH_MTU: u32 = 1500;

/// Address recorded for the loopback network definition.
pub const LOOPBACK_ADDRESS: &str = "127.0.0.1/0";

/// Exit code used when the run fails before the contained program starts.
pub const GENERIC_FAILURE_EXIT_CODE: i32 = 1;

/// Base added to a signal number when the contained program was killed by it.
pub const SIGNAL_EXIT_BASE: i32 = 128;

/// Binary name for the CLI.
pub const BIN_NAME: &str = "sce";
