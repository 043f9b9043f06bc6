//! Linux native isolation engine using direct syscalls.

use std::fs::File;
use std::io::{ErrorKind, Read, Write};
use std::os::fd::AsRawFd;
use std::os::unix::fs::DirBuilderExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::sys::signal::{Signal, kill};
use nix::sys::wait::{Id, WaitPidFlag, WaitStatus, waitid, waitpid};
use nix::unistd::Pid;

use sce_common::error::{Result, SceError};
use sce_common::types::ContainerName;
use sce_core::cgroup::CgroupManager;
use sce_core::network::NetworkSpec;
use sce_core::network::setup::{HostNetwork, link_exists};
use sce_core::{capability, namespace};

use super::init::{InitFailure, InitPlan};
use crate::config::IsolationConfig;
use crate::factory::{ContainerHandle, RuntimeFactory};
use crate::process::{ContainerProcess, ExitStatus};
use crate::state::{ContainerStatus, StateEntry, save_state};

/// Stack size of the cloned container init before it execs.
const INIT_STACK_SIZE: usize = 1024 * 1024;

/// Factory creating containers with Linux kernel features directly.
///
/// Keeps per-container state below its root directory and places
/// container cgroups below the cgroup root.
#[derive(Debug, Clone)]
pub struct LinuxFactory {
    root: PathBuf,
    cgroup_root: PathBuf,
}

impl LinuxFactory {
    /// Loads a factory rooted at `root`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the root directory cannot be created.
    pub fn load(root: impl Into<PathBuf>) -> Result<Self> {
        Self::with_cgroup_root(root, sce_common::constants::CGROUP_ROOT)
    }

    /// Loads a factory with a custom cgroup root.
    ///
    /// # Errors
    ///
    /// Returns an error if the root directory cannot be created.
    pub fn with_cgroup_root(
        root: impl Into<PathBuf>,
        cgroup_root: impl Into<PathBuf>,
    ) -> Result<Self> {
        let root = root.into();
        std::fs::DirBuilder::new()
            .recursive(true)
            .mode(0o700)
            .create(&root)
            .map_err(|e| SceError::Io {
                path: root.clone(),
                source: e,
            })?;
        tracing::debug!(root = %root.display(), "container factory loaded");
        Ok(Self {
            root,
            cgroup_root: cgroup_root.into(),
        })
    }

    /// Returns the factory root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl RuntimeFactory for LinuxFactory {
    fn create(
        &self,
        name: &ContainerName,
        config: IsolationConfig,
    ) -> Result<Arc<dyn ContainerHandle>> {
        validate(&config)?;

        let dir = self.root.join(name.as_str());
        std::fs::DirBuilder::new()
            .mode(0o700)
            .create(&dir)
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::AlreadyExists => SceError::Config {
                    message: format!("container {name} already exists"),
                },
                _ => SceError::Io {
                    path: dir.clone(),
                    source: e,
                },
            })?;

        let cgroup = match CgroupManager::create_in(&self.cgroup_root, &config.cgroup) {
            Ok(cg) => cg,
            Err(e) => {
                let _ = std::fs::remove_dir_all(&dir);
                return Err(e);
            }
        };

        let container = LinuxContainer {
            name: name.clone(),
            config,
            dir,
            cgroup,
            created_at: chrono::Utc::now().to_rfc3339(),
            init_pid: OnceLock::new(),
            network: OnceLock::new(),
            reaped: Mutex::new(false),
            destroyed: AtomicBool::new(false),
        };
        if let Err(e) = container.record(ContainerStatus::Created) {
            let _ = container.destroy();
            return Err(e);
        }
        tracing::info!(name = %name, "container created");
        Ok(Arc::new(container))
    }
}

fn validate(config: &IsolationConfig) -> Result<()> {
    if !config.no_pivot_root {
        return Err(SceError::Config {
            message: "pivot_root is not supported, only chroot".into(),
        });
    }
    if !config.rootfs.is_absolute() || !config.rootfs.is_dir() {
        return Err(SceError::Config {
            message: format!(
                "rootfs {} is not an absolute directory",
                config.rootfs.display()
            ),
        });
    }
    if config.cgroup.name.is_empty() || config.cgroup.name.contains('/') {
        return Err(SceError::Config {
            message: format!("invalid cgroup name {:?}", config.cgroup.name),
        });
    }
    Ok(())
}

/// A container created by [`LinuxFactory`].
#[derive(Debug)]
pub struct LinuxContainer {
    name: ContainerName,
    config: IsolationConfig,
    dir: PathBuf,
    cgroup: CgroupManager,
    created_at: String,
    init_pid: OnceLock<Pid>,
    network: OnceLock<HostNetwork>,
    /// Set once init is reaped; held while signalling so a reaped PID is
    /// never reused as a target.
    reaped: Mutex<bool>,
    destroyed: AtomicBool,
}

impl LinuxContainer {
    fn record(&self, status: ContainerStatus) -> Result<()> {
        let entry = StateEntry {
            name: self.name.to_string(),
            status,
            init_pid: self.init_pid.get().map(|p| p.as_raw()),
            cgroup_path: self.cgroup.path().to_path_buf(),
            created_at: self.created_at.clone(),
            config: self.config.clone(),
        };
        save_state(&self.dir.join(sce_common::constants::STATE_FILE_NAME), &entry)
    }

    /// Host-side setup of a freshly cloned, still blocked init.
    fn prepare(&self, pid: Pid) -> Result<()> {
        let raw = u32::try_from(pid.as_raw()).map_err(|_| SceError::Start {
            message: format!("invalid pid {pid}"),
        })?;
        self.cgroup.add_process(raw)?;

        let net = match self.network.get() {
            Some(net) => net,
            None => {
                let located = HostNetwork::locate()?;
                self.network.get_or_init(|| located)
            }
        };
        for spec in &self.config.networks {
            match spec {
                NetworkSpec::Loopback(lo) => net.setup_loopback(pid.as_raw(), lo)?,
                NetworkSpec::Veth(veth) => net.setup_veth(pid.as_raw(), veth)?,
            }
        }
        Ok(())
    }

    fn spawn(&self, plan: &InitPlan) -> Result<Pid> {
        let (sync_read, sync_write) = pipe()?;
        let (error_read, error_write) = pipe()?;
        let parent_fds = [sync_write.as_raw_fd(), error_read.as_raw_fd()];

        let mut stack = vec![0u8; INIT_STACK_SIZE];
        let flags = namespace::clone_flags(&self.config.namespaces);
        let cb = Box::new(|| plan.run(&sync_read, &error_write, parent_fds));
        // SAFETY: the child gets a private copy of the address space (no
        // CLONE_VM) and its own stack; it only runs `InitPlan::run`, which
        // never allocates and ends in execve or returns an exit code.
        #[allow(unsafe_code)]
        let pid = unsafe { nix::sched::clone(cb, &mut stack, flags, Some(libc::SIGCHLD)) }
            .map_err(|e| SceError::Start {
                message: format!("clone failed: {e}"),
            })?;
        drop(sync_read);
        drop(error_write);
        let _ = self.init_pid.set(pid);
        tracing::debug!(pid = pid.as_raw(), ?flags, "container init cloned");

        if let Err(e) = self.prepare(pid) {
            // Dropping the sync pipe unblocks the child, which then exits.
            drop(sync_write);
            self.reap(pid);
            return Err(e);
        }

        let mut release = &sync_write;
        release.write_all(&[1]).map_err(|e| SceError::Start {
            message: format!("releasing container init failed: {e}"),
        })?;
        drop(sync_write);

        // The pipe closes without data once execve succeeds.
        let mut record = [0u8; InitFailure::SIZE];
        match (&error_read).read_exact(&mut record) {
            Ok(()) => {
                self.reap(pid);
                Err(InitFailure::from_bytes(&record).map_or_else(
                    || SceError::Start {
                        message: "container init sent a malformed failure report".into(),
                    },
                    |failure| plan.describe(failure),
                ))
            }
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => Ok(pid),
            Err(e) => Err(SceError::Start {
                message: format!("reading container init status failed: {e}"),
            }),
        }
    }

    fn lock_reaped(&self) -> MutexGuard<'_, bool> {
        self.reaped.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn reap(&self, pid: Pid) {
        let mut reaped = self.lock_reaped();
        if !*reaped {
            let _ = waitpid(pid, None);
            *reaped = true;
        }
    }

    fn teardown_network(&self) -> Result<()> {
        let Some(veth) = self.config.veth() else {
            return Ok(());
        };
        let host = veth.host_interface.as_str();
        if !link_exists(host) {
            return Ok(());
        }
        let net = match self.network.get() {
            Some(net) => net.clone(),
            None => HostNetwork::locate()?,
        };
        net.delete_link(host)
    }
}

impl ContainerHandle for LinuxContainer {
    fn name(&self) -> &ContainerName {
        &self.name
    }

    fn start(&self, process: &ContainerProcess) -> Result<()> {
        if self.init_pid.get().is_some() || process.pid().is_some() {
            return Err(SceError::Start {
                message: format!("container {} already started", self.name),
            });
        }
        capability::ensure_can_drop()?;
        let plan = InitPlan::new(&self.config, process, &capability::supported_capabilities())?;
        plan.create_mount_points()?;
        let pid = self.spawn(&plan)?;
        process.set_pid(pid)?;
        self.record(ContainerStatus::Running)?;
        tracing::info!(name = %self.name, pid = pid.as_raw(), "container started");
        Ok(())
    }

    fn signal(&self, process: &ContainerProcess, signal: Signal) -> Result<()> {
        let pid = process.pid().ok_or_else(|| SceError::Signal {
            signal: signal.to_string(),
            message: "process not started".into(),
        })?;
        let reaped = self.lock_reaped();
        if *reaped {
            return Err(SceError::Signal {
                signal: signal.to_string(),
                message: "process already exited".into(),
            });
        }
        let sent = kill(pid, signal).map_err(|e| SceError::Signal {
            signal: signal.to_string(),
            message: e.to_string(),
        });
        drop(reaped);
        sent
    }

    fn wait(&self, process: &ContainerProcess) -> Result<ExitStatus> {
        let pid = process.pid().ok_or_else(|| SceError::Start {
            message: "process not started".into(),
        })?;
        let wait_failed = |e: Errno| SceError::PermissionDenied {
            message: format!("waiting for {pid} failed: {e}"),
        };
        // Wait for the exit without reaping, so the PID stays valid until
        // the reaped lock is held.
        loop {
            match waitid(Id::Pid(pid), WaitPidFlag::WEXITED | WaitPidFlag::WNOWAIT) {
                Ok(_) => break,
                Err(Errno::EINTR) => {}
                Err(e) => return Err(wait_failed(e)),
            }
        }
        let mut reaped = self.lock_reaped();
        let status = loop {
            match waitpid(pid, None) {
                Ok(WaitStatus::Exited(_, code)) => break ExitStatus::Exited(code),
                Ok(WaitStatus::Signaled(_, sig, _)) => break ExitStatus::Signaled(sig),
                Ok(_) | Err(Errno::EINTR) => {}
                Err(e) => return Err(wait_failed(e)),
            }
        };
        *reaped = true;
        drop(reaped);
        if let Err(e) = self.record(ContainerStatus::Stopped) {
            tracing::warn!(error = %e, "updating container state failed");
        }
        tracing::info!(name = %self.name, ?status, "container process exited");
        Ok(status)
    }

    fn destroy(&self) -> Result<()> {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.cgroup.kill_all();
        if let Some(&pid) = self.init_pid.get() {
            let mut reaped = self.lock_reaped();
            if !*reaped {
                let _ = kill(pid, Signal::SIGKILL);
                let _ = waitpid(pid, None);
                *reaped = true;
            }
        }

        let mut first_error = None;
        let steps = [
            self.teardown_network(),
            self.cgroup.destroy(),
            std::fs::remove_dir_all(&self.dir).map_err(|e| SceError::Io {
                path: self.dir.clone(),
                source: e,
            }),
        ];
        for result in steps {
            if let Err(e) = result {
                tracing::warn!(name = %self.name, error = %e, "container teardown step failed");
                let _ = first_error.get_or_insert(e);
            }
        }
        tracing::info!(name = %self.name, "container destroyed");
        first_error.map_or(Ok(()), Err)
    }
}

fn pipe() -> Result<(File, File)> {
    let (read, write) = nix::unistd::pipe2(OFlag::O_CLOEXEC).map_err(|e| SceError::Start {
        message: format!("pipe failed: {e}"),
    })?;
    Ok((File::from(read), File::from(write)))
}
