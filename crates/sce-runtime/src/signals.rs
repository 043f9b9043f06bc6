//! Signal forwarding from the executor to the contained process.
//!
//! [`listen`] turns the executor's own `SIGINT` and `SIGTERM` into messages on
//! a channel; [`relay`] delivers each one to the contained process. Relay
//! failures are runtime errors: they are logged and the loop carries on.

use std::sync::Arc;

use nix::sys::signal::Signal;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use sce_common::error::{Result, SceError};

use crate::factory::ContainerHandle;
use crate::process::ContainerProcess;

/// Capacity of the signal channel.
pub const SIGNAL_CHANNEL_CAPACITY: usize = 16;

/// Installs handlers for `SIGINT` and `SIGTERM` and spawns a task that sends
/// every delivery to `tx`.
///
/// The task ends when every receiver is dropped.
///
/// # Errors
///
/// Returns an error if a signal handler cannot be installed.
pub fn listen(tx: mpsc::Sender<Signal>) -> Result<JoinHandle<()>> {
    let install = |sig: Signal| {
        signal(SignalKind::from_raw(sig as i32)).map_err(|e| SceError::Signal {
            signal: sig.to_string(),
            message: format!("installing handler: {e}"),
        })
    };
    let mut interrupt = install(Signal::SIGINT)?;
    let mut terminate = install(Signal::SIGTERM)?;

    Ok(tokio::spawn(async move {
        loop {
            let sig = tokio::select! {
                Some(()) = interrupt.recv() => Signal::SIGINT,
                Some(()) = terminate.recv() => Signal::SIGTERM,
                else => break,
            };
            tracing::debug!(signal = %sig, "signal received");
            if tx.send(sig).await.is_err() {
                break;
            }
        }
    }))
}

/// Forwards every signal from `rx` to `process` until the channel closes.
pub async fn relay(
    handle: Arc<dyn ContainerHandle>,
    process: Arc<ContainerProcess>,
    mut rx: mpsc::Receiver<Signal>,
) {
    while let Some(sig) = rx.recv().await {
        match handle.signal(&process, sig) {
            Ok(()) => tracing::info!(signal = %sig, container = %handle.name(), "signal forwarded"),
            Err(e) => tracing::warn!(error = %e, class = ?e.class(), "signal relay failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use sce_common::types::ContainerName;

    use super::*;
    use crate::process::ExitStatus;

    struct Recorder {
        name: ContainerName,
        seen: Mutex<Vec<Signal>>,
        fail: bool,
    }

    impl ContainerHandle for Recorder {
        fn name(&self) -> &ContainerName {
            &self.name
        }
        fn start(&self, _: &ContainerProcess) -> Result<()> {
            Ok(())
        }
        fn signal(&self, _: &ContainerProcess, signal: Signal) -> Result<()> {
            self.seen.lock().unwrap().push(signal);
            if self.fail {
                return Err(SceError::Signal {
                    signal: signal.to_string(),
                    message: "no such process".into(),
                });
            }
            Ok(())
        }
        fn wait(&self, _: &ContainerProcess) -> Result<ExitStatus> {
            Ok(ExitStatus::Exited(0))
        }
        fn destroy(&self) -> Result<()> {
            Ok(())
        }
    }

    fn recorder(fail: bool) -> Arc<Recorder> {
        Arc::new(Recorder {
            name: ContainerName::new("relaytest").unwrap(),
            seen: Mutex::default(),
            fail,
        })
    }

    #[tokio::test]
    async fn relays_in_order_until_closed() {
        let rec = recorder(false);
        let process = Arc::new(ContainerProcess::new(vec!["/bin/true".into()]));
        let (tx, rx) = mpsc::channel(SIGNAL_CHANNEL_CAPACITY);

        tx.send(Signal::SIGINT).await.unwrap();
        tx.send(Signal::SIGTERM).await.unwrap();
        drop(tx);
        relay(rec.clone(), process, rx).await;

        assert_eq!(*rec.seen.lock().unwrap(), [Signal::SIGINT, Signal::SIGTERM]);
    }

    #[tokio::test]
    async fn failures_do_not_stop_the_relay() {
        let rec = recorder(true);
        let process = Arc::new(ContainerProcess::new(vec!["/bin/true".into()]));
        let (tx, rx) = mpsc::channel(SIGNAL_CHANNEL_CAPACITY);

        for _ in 0..3 {
            tx.send(Signal::SIGTERM).await.unwrap();
        }
        drop(tx);
        relay(rec.clone(), process, rx).await;

        assert_eq!(rec.seen.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn interrupt_reaches_the_channel() {
        let (tx, mut rx) = mpsc::channel(SIGNAL_CHANNEL_CAPACITY);
        let task = listen(tx).unwrap();

        // The handler installed by `listen` keeps the test process alive.
        nix::sys::signal::raise(Signal::SIGINT).unwrap();
        let received = tokio::time::timeout(std::time::Duration::from_secs(5), rx.recv())
            .await
            .unwrap();
        assert_eq!(received, Some(Signal::SIGINT));
        task.abort();
    }
}
