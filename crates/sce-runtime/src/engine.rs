//! Runtime engine that assembles and runs one container.

use std::path::Path;
use std::sync::Arc;

use nix::sys::signal::Signal;
use tokio::sync::mpsc;

use sce_common::config::Options;
use sce_common::error::Result;
use sce_core::network::bridge::{BridgeLookup, HostInterfaces};

use crate::backend;
use crate::config::{IsolationConfig, build_isolation_config};
use crate::factory::{ContainerHandle, RuntimeFactory};
use crate::identity::ContainerIdentity;
use crate::process::ContainerProcess;
use crate::supervisor::Supervisor;

/// A container that has been created but not started.
pub struct Prepared {
    /// Generated identity.
    pub identity: ContainerIdentity,
    /// Configuration the container was created with.
    pub config: IsolationConfig,
    /// Handle returned by the factory.
    pub handle: Arc<dyn ContainerHandle>,
}

/// The runtime engine that coordinates a single run.
///
/// Construction steps (bridge lookup, identity, isolation config and
/// container creation) happen in that order; any failure among them returns
/// before a container exists.
pub struct Engine {
    factory: Box<dyn RuntimeFactory>,
    bridges: Box<dyn BridgeLookup>,
}

impl Engine {
    /// Creates an engine from an isolation engine and a bridge source.
    #[must_use]
    pub fn new(factory: Box<dyn RuntimeFactory>, bridges: Box<dyn BridgeLookup>) -> Self {
        Self { factory, bridges }
    }

    /// Creates an engine on the native Linux isolation engine rooted at
    /// `state_root`, resolving bridges among host interfaces.
    ///
    /// # Errors
    ///
    /// Returns an error if the isolation engine cannot be loaded.
    pub fn native(state_root: &Path) -> Result<Self> {
        let factory = backend::detect_factory(state_root)?;
        Ok(Self::new(Box::new(factory), Box::new(HostInterfaces)))
    }

    /// Creates the container described by `options` without starting it.
    ///
    /// The bridge is looked up even when networking is disabled.
    ///
    /// # Errors
    ///
    /// Returns an error if the bridge has no IPv4 address, identity
    /// generation fails, or the container cannot be created.
    pub fn prepare(&self, options: &Options) -> Result<Prepared> {
        let bridge_ip = self.bridges.bridge_ipv4(options.bridge())?;
        let identity = ContainerIdentity::generate(options.network_enabled())?;
        let config = build_isolation_config(options, &identity, bridge_ip);
        tracing::info!(
            name = %identity.name,
            rootfs = %config.rootfs.display(),
            bridge = options.bridge(),
            %bridge_ip,
            network = options.network_enabled(),
            "creating container"
        );
        let handle = self.factory.create(&identity.name, config.clone())?;
        Ok(Prepared {
            identity,
            config,
            handle,
        })
    }

    /// Runs the program of `options` in a new container and returns the exit
    /// code the executor should terminate with.
    ///
    /// # Errors
    ///
    /// Returns an error if the container cannot be created, started or
    /// waited on. The container is destroyed in every case once created.
    pub async fn run(&self, options: &Options, signals: mpsc::Receiver<Signal>) -> Result<i32> {
        let prepared = self.prepare(options)?;
        let process = ContainerProcess::new(options.program().to_vec());
        let mut supervisor = Supervisor::new(prepared.handle, process);
        let code = supervisor.run(signals).await?;
        tracing::info!(name = %prepared.identity.name, code, "container finished");
        Ok(code)
    }
}
