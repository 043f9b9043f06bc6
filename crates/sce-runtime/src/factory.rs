//! Contract between container assembly and the isolation engine.
//!
//! The supervisor only ever talks to these traits; how namespaces, cgroups,
//! mounts and devices are enacted is the engine's business, as long as every
//! field of the [`IsolationConfig`] is applied before the program starts.

use std::sync::Arc;

use nix::sys::signal::Signal;

use sce_common::error::Result;
use sce_common::types::ContainerName;

use crate::config::IsolationConfig;
use crate::process::{ContainerProcess, ExitStatus};

/// Creates container handles from an isolation config.
pub trait RuntimeFactory {
    /// Creates a container called `name` isolated according to `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the container cannot be created.
    fn create(&self, name: &ContainerName, config: IsolationConfig)
    -> Result<Arc<dyn ContainerHandle>>;
}

/// A created container.
///
/// Shared between the supervisor and the signal relay, hence `Send + Sync`
/// and `&self` receivers throughout.
pub trait ContainerHandle: Send + Sync {
    /// Name the container was created with.
    fn name(&self) -> &ContainerName;

    /// Starts `process` inside the container and publishes its PID.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be launched.
    fn start(&self, process: &ContainerProcess) -> Result<()>;

    /// Delivers `signal` to `process`.
    ///
    /// # Errors
    ///
    /// Returns an error if the process was never started or is gone.
    fn signal(&self, process: &ContainerProcess, signal: Signal) -> Result<()>;

    /// Blocks until `process` terminates.
    ///
    /// # Errors
    ///
    /// Returns an error if the process was never started or cannot be waited on.
    fn wait(&self, process: &ContainerProcess) -> Result<ExitStatus>;

    /// Releases every resource held by the container.
    ///
    /// # Errors
    ///
    /// Returns an error if part of the teardown fails.
    fn destroy(&self) -> Result<()>;
}
