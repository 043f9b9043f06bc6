//! Supervision of the contained process.
//!
//! The supervisor starts the process, forwards signals to it while it runs,
//! waits for it to terminate and destroys the container. Destruction happens
//! exactly once on every path, including failed starts and panics, through a
//! [`DestroyGuard`].

use std::fmt;
use std::sync::Arc;

use nix::sys::signal::Signal;
use tokio::sync::mpsc;

use sce_common::error::{Result, SceError};

use crate::factory::ContainerHandle;
use crate::process::{ContainerProcess, ExitStatus};
use crate::signals;

/// Lifecycle of a supervised container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    /// Container created, process not launched.
    Unstarted,
    /// Process launched, signal relay not yet running.
    Started,
    /// Signals are being relayed while the process runs.
    Running,
    /// Process exited with a code.
    Exited(i32),
    /// Process was killed by a signal.
    SignalTerminated(Signal),
    /// Container resources released. Terminal.
    Destroyed,
}

impl fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unstarted => write!(f, "unstarted"),
            Self::Started => write!(f, "started"),
            Self::Running => write!(f, "running"),
            Self::Exited(code) => write!(f, "exited({code})"),
            Self::SignalTerminated(sig) => write!(f, "signal-terminated({sig})"),
            Self::Destroyed => write!(f, "destroyed"),
        }
    }
}

/// Destroys a container handle when dropped, unless already destroyed.
pub struct DestroyGuard {
    handle: Option<Arc<dyn ContainerHandle>>,
}

impl DestroyGuard {
    /// Arms a guard for `handle`.
    #[must_use]
    pub fn new(handle: Arc<dyn ContainerHandle>) -> Self {
        Self {
            handle: Some(handle),
        }
    }

    /// Destroys the container now and disarms the guard.
    pub fn destroy(mut self) {
        self.release();
    }

    fn release(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        match handle.destroy() {
            Ok(()) => tracing::debug!(container = %handle.name(), "container destroyed"),
            Err(e) => tracing::warn!(container = %handle.name(), error = %e, "container destroy failed"),
        }
    }
}

impl Drop for DestroyGuard {
    fn drop(&mut self) {
        self.release();
    }
}

/// Drives one container from start to destruction.
pub struct Supervisor {
    handle: Arc<dyn ContainerHandle>,
    process: Arc<ContainerProcess>,
    state: SupervisorState,
}

impl Supervisor {
    /// Creates a supervisor for a created, unstarted container.
    #[must_use]
    pub fn new(handle: Arc<dyn ContainerHandle>, process: ContainerProcess) -> Self {
        Self {
            handle,
            process: Arc::new(process),
            state: SupervisorState::Unstarted,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> SupervisorState {
        self.state
    }

    /// Runs the process to completion and returns the executor's exit code.
    ///
    /// Signals arriving on `signals` are forwarded to the process while it
    /// runs. The container is destroyed before this returns, whatever the
    /// outcome.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be started or waited on.
    pub async fn run(&mut self, signals: mpsc::Receiver<Signal>) -> Result<i32> {
        let guard = DestroyGuard::new(Arc::clone(&self.handle));
        let result = self.supervise(signals).await;
        guard.destroy();
        self.transition(SupervisorState::Destroyed);
        result
    }

    async fn supervise(&mut self, signals: mpsc::Receiver<Signal>) -> Result<i32> {
        self.handle.start(&self.process)?;
        self.transition(SupervisorState::Started);

        let relay = tokio::spawn(signals::relay(
            Arc::clone(&self.handle),
            Arc::clone(&self.process),
            signals,
        ));
        self.transition(SupervisorState::Running);

        let handle = Arc::clone(&self.handle);
        let process = Arc::clone(&self.process);
        let waited = tokio::task::spawn_blocking(move || handle.wait(&process)).await;
        relay.abort();

        let status = waited.map_err(|e| SceError::Start {
            message: format!("wait task failed: {e}"),
        })??;
        self.transition(match status {
            ExitStatus::Exited(code) => SupervisorState::Exited(code),
            ExitStatus::Signaled(sig) => SupervisorState::SignalTerminated(sig),
        });
        Ok(status.code())
    }

    fn transition(&mut self, next: SupervisorState) {
        tracing::debug!(container = %self.handle.name(), from = %self.state, to = %next, "state transition");
        self.state = next;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Condvar, Mutex};

    use sce_common::types::ContainerName;

    use super::*;

    /// Handle whose process "runs" until it is signalled, or exits at once
    /// with `exit` when set.
    struct FakeHandle {
        name: ContainerName,
        fail_start: bool,
        exit: Option<i32>,
        signalled: Mutex<Option<Signal>>,
        wake: Condvar,
        destroyed: AtomicUsize,
    }

    impl FakeHandle {
        fn new(fail_start: bool, exit: Option<i32>) -> Arc<Self> {
            Arc::new(Self {
                name: ContainerName::new("supervised").unwrap(),
                fail_start,
                exit,
                signalled: Mutex::new(None),
                wake: Condvar::new(),
                destroyed: AtomicUsize::new(0),
            })
        }
    }

    impl ContainerHandle for FakeHandle {
        fn name(&self) -> &ContainerName {
            &self.name
        }

        fn start(&self, process: &ContainerProcess) -> Result<()> {
            if self.fail_start {
                return Err(SceError::Start {
                    message: "exec failed".into(),
                });
            }
            process.set_pid(nix::unistd::Pid::from_raw(4242))
        }

        fn signal(&self, _: &ContainerProcess, signal: Signal) -> Result<()> {
            *self.signalled.lock().unwrap() = Some(signal);
            self.wake.notify_all();
            Ok(())
        }

        fn wait(&self, _: &ContainerProcess) -> Result<ExitStatus> {
            if let Some(code) = self.exit {
                return Ok(ExitStatus::Exited(code));
            }
            let mut signalled = self.signalled.lock().unwrap();
            loop {
                if let Some(sig) = *signalled {
                    return Ok(ExitStatus::Signaled(sig));
                }
                signalled = self.wake.wait(signalled).unwrap();
            }
        }

        fn destroy(&self) -> Result<()> {
            let _ = self.destroyed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn process() -> ContainerProcess {
        ContainerProcess::new(vec!["/bin/sh".into()])
    }

    #[tokio::test]
    async fn exit_code_is_propagated() {
        let fake = FakeHandle::new(false, Some(3));
        let mut sup = Supervisor::new(fake.clone(), process());
        let (_tx, rx) = mpsc::channel(1);

        assert_eq!(sup.state(), SupervisorState::Unstarted);
        assert_eq!(sup.run(rx).await.unwrap(), 3);
        assert_eq!(sup.state(), SupervisorState::Destroyed);
        assert_eq!(fake.destroyed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_start_still_destroys_once() {
        let fake = FakeHandle::new(true, None);
        let mut sup = Supervisor::new(fake.clone(), process());
        let (_tx, rx) = mpsc::channel(1);

        let err = sup.run(rx).await.unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(sup.state(), SupervisorState::Destroyed);
        assert_eq!(fake.destroyed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn relayed_signal_terminates_process() {
        let fake = FakeHandle::new(false, None);
        let mut sup = Supervisor::new(fake.clone(), process());
        let (tx, rx) = mpsc::channel(1);

        tx.send(Signal::SIGTERM).await.unwrap();
        assert_eq!(sup.run(rx).await.unwrap(), 128 + 15);
        assert_eq!(*fake.signalled.lock().unwrap(), Some(Signal::SIGTERM));
        assert_eq!(fake.destroyed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn guard_destroys_on_drop_only_once() {
        let fake = FakeHandle::new(false, Some(0));
        {
            let _guard = DestroyGuard::new(fake.clone());
        }
        assert_eq!(fake.destroyed.load(Ordering::SeqCst), 1);

        let guard = DestroyGuard::new(fake.clone());
        guard.destroy();
        assert_eq!(fake.destroyed.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn states_display() {
        assert_eq!(SupervisorState::Exited(0).to_string(), "exited(0)");
        assert_eq!(
            SupervisorState::SignalTerminated(Signal::SIGINT).to_string(),
            "signal-terminated(SIGINT)"
        );
    }
}
