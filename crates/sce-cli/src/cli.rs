//! Command-line definition.

use std::path::PathBuf;

use clap::Parser;
use sce_common::config::RawOptions;
use sce_common::constants::{
    BIN_NAME, CONTAINER_HOST_PATH, DEFAULT_BRIDGE, GENERIC_FAILURE_EXIT_CODE,
};

use crate::size::parse_byte_size;

/// Run one program in a fresh, isolated container.
#[derive(Parser, Debug)]
#[command(name = BIN_NAME, version, about, long_about = None)]
pub struct Cli {
    /// Memory limit, e.g. `128MB`, `128MiB`, `1.5GB` or plain bytes.
    #[arg(long, value_name = "SIZE", value_parser = parse_byte_size)]
    pub memory_limit: Option<u64>,

    /// Root filesystem directory of the container.
    #[arg(long, value_name = "ROOTFS")]
    pub chroot: String,

    /// CPU cores the container may run on, in cpuset syntax (`0-2,5`).
    #[arg(long, value_name = "CPUS", default_value = "")]
    pub cpu_core_ids: String,

    /// Container address in CIDR form; enables the veth network.
    #[arg(long, value_name = "CIDR", default_value = "")]
    pub network_address: String,

    /// Host bridge the container network is attached to.
    #[arg(long, value_name = "IFACE", default_value = DEFAULT_BRIDGE)]
    pub bridge: String,

    /// Root directory of the isolation engine's container state.
    #[arg(long, value_name = "DIR", default_value = CONTAINER_HOST_PATH)]
    pub state_root: PathBuf,

    /// Emit logs as JSON lines.
    #[arg(long, env = "SCE_LOG_JSON")]
    pub log_json: bool,

    /// Program to run, followed by its arguments.
    #[arg(
        value_name = "PROGRAM",
        required = true,
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    pub program: Vec<String>,
}

impl Cli {
    /// Converts the parsed flags into unvalidated options.
    #[must_use]
    pub fn raw_options(&self) -> RawOptions {
        RawOptions {
            memory_limit: self.memory_limit.unwrap_or(0),
            cpu_core_ids: self.cpu_core_ids.clone(),
            chroot: self.chroot.clone(),
            network_address: self.network_address.clone(),
            bridge: self.bridge.clone(),
            program: self.program.clone(),
        }
    }
}

/// Exit code for a command line clap refused.
///
/// `--help` and `--version` succeed; every usage error is a configuration
/// error and exits like any other one.
#[must_use]
pub fn parse_exit_code(error: &clap::Error) -> i32 {
    if error.use_stderr() {
        GENERIC_FAILURE_EXIT_CODE
    } else {
        0
    }
}
