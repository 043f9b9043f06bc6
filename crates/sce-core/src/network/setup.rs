//! Network enactment from the host side.
//!
//! Links are created with the host `ip` tool; configuration inside the
//! container's network namespace goes through `nsenter --net` targeting the
//! container init PID, so the container itself never runs host binaries.

use std::path::{Path, PathBuf};
use std::process::Command;

use sce_common::error::{Result, SceError};

use super::{LoopbackSpec, VethSpec};

/// Host tools used to configure container networking.
#[derive(Debug, Clone)]
pub struct HostNetwork {
    ip: PathBuf,
    nsenter: PathBuf,
}

impl HostNetwork {
    /// Locates `ip` and `nsenter` on the host `PATH`.
    ///
    /// # Errors
    ///
    /// Returns [`SceError::NotFound`] if either tool is missing.
    pub fn locate() -> Result<Self> {
        let find = |tool: &'static str| {
            which::which(tool).map_err(|_| SceError::NotFound {
                kind: "host tool",
                id: tool.into(),
            })
        };
        Ok(Self {
            ip: find("ip")?,
            nsenter: find("nsenter")?,
        })
    }

    /// Brings up the loopback interface of the namespace owned by `pid`.
    ///
    /// # Errors
    ///
    /// Returns an error if the `ip` invocation fails.
    pub fn setup_loopback(&self, pid: i32, lo: &LoopbackSpec) -> Result<()> {
        self.ip_in(pid, &["link", "set", "lo", "up"])?;
        tracing::debug!(pid, address = %lo.address, "loopback up");
        Ok(())
    }

    /// Creates the veth pair, bridges the host end and configures the
    /// container end inside the namespace owned by `pid`.
    ///
    /// The host end is removed again if any later step fails.
    ///
    /// # Errors
    ///
    /// Returns an error if any `ip` invocation fails.
    pub fn setup_veth(&self, pid: i32, veth: &VethSpec) -> Result<()> {
        let host = veth.host_interface.as_str();
        let peer = peer_name(host);
        let mtu = veth.mtu.to_string();

        self.ip_host(&[
            "link", "add", host, "mtu", &mtu, "type", "veth", "peer", "name", &peer, "mtu", &mtu,
        ])?;
        if let Err(e) = self.configure_veth(pid, veth, &peer) {
            let _ = self.delete_link(host);
            return Err(e);
        }
        tracing::info!(
            host_interface = host,
            bridge = %veth.bridge,
            address = %veth.address,
            gateway = %veth.gateway,
            mac = %veth.mac,
            "veth attached"
        );
        Ok(())
    }

    fn configure_veth(&self, pid: i32, veth: &VethSpec, peer: &str) -> Result<()> {
        let host = veth.host_interface.as_str();
        let pid_str = pid.to_string();
        let mac = veth.mac.to_string();
        let gateway = veth.gateway.to_string();
        let address = veth.address.to_string();

        self.ip_host(&["link", "set", host, "master", &veth.bridge])?;
        self.ip_host(&["link", "set", host, "up"])?;
        self.ip_host(&["link", "set", peer, "netns", &pid_str])?;

        self.ip_in(pid, &["link", "set", peer, "name", &veth.name])?;
        self.ip_in(pid, &["link", "set", &veth.name, "address", &mac])?;
        self.ip_in(pid, &["addr", "add", &address, "dev", &veth.name])?;
        self.ip_in(pid, &["link", "set", &veth.name, "up"])?;
        self.ip_in(pid, &["route", "add", "default", "via", &gateway])
    }

    /// Deletes a host link; deleting one end of a veth pair removes both.
    ///
    /// # Errors
    ///
    /// Returns an error if the `ip` invocation fails.
    pub fn delete_link(&self, name: &str) -> Result<()> {
        self.ip_host(&["link", "del", name])
    }

    fn ip_host(&self, args: &[&str]) -> Result<()> {
        run(Command::new(&self.ip).args(args), &self.ip)
    }

    fn ip_in(&self, pid: i32, args: &[&str]) -> Result<()> {
        let mut cmd = Command::new(&self.nsenter);
        let _ = cmd
            .args(["--target", &pid.to_string(), "--net", "--"])
            .arg(&self.ip)
            .args(args);
        run(&mut cmd, &self.nsenter)
    }
}

/// Returns `true` if a link called `name` exists in the host namespace.
#[must_use]
pub fn link_exists(name: &str) -> bool {
    Path::new("/sys/class/net").join(name).exists()
}

/// Temporary host-namespace name of the container end, before it is moved
/// into the container and renamed.
fn peer_name(host: &str) -> String {
    let keep = host.len().min(sce_common::constants::MAX_INTERFACE_NAME_LENGTH - 1);
    format!("{}p", &host[..keep])
}

fn run(cmd: &mut Command, program: &Path) -> Result<()> {
    tracing::trace!(command = ?cmd, "running host tool");
    let output = cmd.output().map_err(|e| SceError::Io {
        path: program.to_path_buf(),
        source: e,
    })?;
    if output.status.success() {
        return Ok(());
    }
    Err(SceError::Command {
        program: format!("{cmd:?}"),
        message: format!(
            "{}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        ),
    })
}
