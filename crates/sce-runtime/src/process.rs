//! The program run inside the container.

use std::sync::OnceLock;

use nix::sys::signal::Signal;
use nix::unistd::Pid;

use sce_common::constants::{DEFAULT_PATH_ENV, SIGNAL_EXIT_BASE};
use sce_common::error::{Result, SceError};

/// The contained program: arguments, environment and, once started, its PID.
///
/// Standard input, output and error are inherited from the executor.
#[derive(Debug)]
pub struct ContainerProcess {
    args: Vec<String>,
    env: Vec<String>,
    pid: OnceLock<Pid>,
}

impl ContainerProcess {
    /// Creates an unstarted process with the minimal `PATH` environment.
    #[must_use]
    pub fn new(args: Vec<String>) -> Self {
        Self {
            args,
            env: vec![DEFAULT_PATH_ENV.to_string()],
            pid: OnceLock::new(),
        }
    }

    /// Program and arguments.
    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Environment as `KEY=value` entries.
    #[must_use]
    pub fn env(&self) -> &[String] {
        &self.env
    }

    /// Host PID of the running process, if it was started.
    #[must_use]
    pub fn pid(&self) -> Option<Pid> {
        self.pid.get().copied()
    }

    /// Publishes the host PID. Called once by the engine that started it.
    ///
    /// # Errors
    ///
    /// Returns [`SceError::Start`] if a PID was already published.
    pub fn set_pid(&self, pid: Pid) -> Result<()> {
        self.pid.set(pid).map_err(|_| SceError::Start {
            message: format!("process already started as pid {pid}"),
        })
    }
}

/// How the contained program terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// Normal exit with the given code.
    Exited(i32),
    /// Killed by the given signal.
    Signaled(Signal),
}

impl ExitStatus {
    /// Exit code the executor itself terminates with.
    ///
    /// A signal death maps to `128 + signo`, as shells report it.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::Exited(code) => code,
            Self::Signaled(sig) => SIGNAL_EXIT_BASE + sig as i32,
        }
    }
}
