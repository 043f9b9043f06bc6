//! Container init: the code running in the cloned child.
//!
//! The child is cloned from a multi-threaded process without fork handlers,
//! so another thread may have held the allocator lock at clone time. Between
//! `clone(2)` and `execve(2)` it must therefore never allocate. Everything it
//! needs is computed up front by [`InitPlan::new`] in the parent, and a
//! failure travels back as a fixed-size [`InitFailure`] record that only the
//! parent turns into a message.

use std::ffi::{CStr, CString, OsStr};
use std::fs::File;
use std::io::{Read, Write};
use std::os::fd::RawFd;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

use nix::errno::Errno;

use sce_common::error::{Result, SceError};
use sce_core::capability::capabilities_to_drop;
use sce_core::device::DeviceNode;
use sce_core::filesystem::host_path;
use sce_core::filesystem::mount::MountSpec;
use sce_core::{capability, filesystem, namespace};

use crate::config::IsolationConfig;
use crate::process::ContainerProcess;

/// Exit code of the child when setup fails before `execve(2)`.
const SETUP_FAILED: isize = 1;
/// Exit code of the child when no candidate program could be executed.
const EXEC_FAILED: isize = 127;

/// The child-side step that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum InitStep {
    Hostname,
    PrivateMounts,
    /// Index into the plan's mounts.
    Mount(usize),
    /// Index into the plan's device nodes.
    Device(usize),
    Chroot,
    /// Kernel number of the capability.
    DropCapability(u8),
    Exec,
}

impl InitStep {
    fn encode(self) -> (u32, u64) {
        match self {
            Self::Hostname => (1, 0),
            Self::PrivateMounts => (2, 0),
            Self::Mount(i) => (3, i as u64),
            Self::Device(i) => (4, i as u64),
            Self::Chroot => (5, 0),
            Self::DropCapability(cap) => (6, u64::from(cap)),
            Self::Exec => (7, 0),
        }
    }

    fn decode(tag: u32, detail: u64) -> Option<Self> {
        Some(match tag {
            1 => Self::Hostname,
            2 => Self::PrivateMounts,
            3 => Self::Mount(usize::try_from(detail).ok()?),
            4 => Self::Device(usize::try_from(detail).ok()?),
            5 => Self::Chroot,
            6 => Self::DropCapability(u8::try_from(detail).ok()?),
            7 => Self::Exec,
            _ => return None,
        })
    }
}

/// Failure report written by the child to the error pipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct InitFailure {
    pub(crate) step: InitStep,
    pub(crate) errno: Option<Errno>,
}

impl InitFailure {
    /// Size of the encoded record; well below `PIPE_BUF`, so it is written
    /// atomically.
    pub(crate) const SIZE: usize = 16;

    fn to_bytes(self) -> [u8; Self::SIZE] {
        let (tag, detail) = self.step.encode();
        let errno = self.errno.map_or(0, |e| e as i32);
        let mut buf = [0u8; Self::SIZE];
        buf[..4].copy_from_slice(&tag.to_ne_bytes());
        buf[4..12].copy_from_slice(&detail.to_ne_bytes());
        buf[12..].copy_from_slice(&errno.to_ne_bytes());
        buf
    }

    pub(crate) fn from_bytes(buf: &[u8; Self::SIZE]) -> Option<Self> {
        let tag = u32::from_ne_bytes(buf[..4].try_into().ok()?);
        let detail = u64::from_ne_bytes(buf[4..12].try_into().ok()?);
        let errno = i32::from_ne_bytes(buf[12..].try_into().ok()?);
        Some(Self {
            step: InitStep::decode(tag, detail)?,
            errno: (errno != 0).then(|| Errno::from_raw(errno)),
        })
    }
}

fn failed(step: InitStep) -> impl FnOnce(Errno) -> InitFailure {
    move |errno| InitFailure {
        step,
        errno: Some(errno),
    }
}

/// Prepared steps of the container init.
#[derive(Debug)]
pub(crate) struct InitPlan {
    hostname: String,
    rootfs: CString,
    mounts: Vec<(CString, MountSpec)>,
    devices: Vec<(CString, DeviceNode)>,
    drop_caps: Vec<caps::Capability>,
    candidates: Vec<CString>,
    argv: Vec<CString>,
    envp: Vec<CString>,
    /// NULL-terminated pointers into `argv`.
    argv_ptrs: Vec<*const libc::c_char>,
    /// NULL-terminated pointers into `envp`.
    envp_ptrs: Vec<*const libc::c_char>,
}

impl InitPlan {
    /// Resolves host paths, the capability drop list and the exec candidates.
    pub(crate) fn new(
        config: &IsolationConfig,
        process: &ContainerProcess,
        supported: &caps::CapsHashSet,
    ) -> Result<Self> {
        let argv = to_cstrings(process.args())?;
        let envp = to_cstrings(process.env())?;
        let program = process.args().first().ok_or_else(|| SceError::Start {
            message: "empty program".into(),
        })?;
        let candidates = to_cstrings(&exec_candidates(program, process.env()))?;

        let rootfs = &config.rootfs;
        let mounts = config
            .mounts
            .iter()
            .map(|m| to_cpath(&host_path(rootfs, &m.destination)).map(|p| (p, m.clone())))
            .collect::<Result<_>>()?;
        let devices = config
            .devices
            .iter()
            .map(|d| to_cpath(&host_path(rootfs, &d.path)).map(|p| (p, d.clone())))
            .collect::<Result<_>>()?;

        Ok(Self {
            hostname: config.hostname.clone(),
            rootfs: to_cpath(rootfs)?,
            mounts,
            devices,
            drop_caps: capabilities_to_drop(&config.capabilities, supported),
            candidates,
            argv_ptrs: exec_array(&argv),
            envp_ptrs: exec_array(&envp),
            argv,
            envp,
        })
    }

    /// Creates the mount points below the rootfs; runs in the parent.
    pub(crate) fn create_mount_points(&self) -> Result<()> {
        for (target, _) in &self.mounts {
            filesystem::mount::create_mount_point(as_path(target))?;
        }
        Ok(())
    }

    /// Runs in the child: waits for the parent's go, isolates, and execs.
    ///
    /// Only returns on failure, after writing an [`InitFailure`] to
    /// `error_pipe`.
    pub(crate) fn run(&self, sync_pipe: &File, error_pipe: &File, parent_fds: [RawFd; 2]) -> isize {
        for fd in parent_fds {
            // SAFETY: these are the child's copies of the parent's pipe ends;
            // nothing in the child uses them.
            #[allow(unsafe_code)]
            let _ = unsafe { libc::close(fd) };
        }

        let mut go = [0u8; 1];
        match (&*sync_pipe).read(&mut go) {
            Ok(1) => {}
            // The parent gave up before releasing us.
            _ => return SETUP_FAILED,
        }

        let failure = match self.isolate() {
            Ok(()) => self.exec(),
            Err(failure) => failure,
        };
        let _ = (&*error_pipe).write_all(&failure.to_bytes());
        if failure.step == InitStep::Exec {
            EXEC_FAILED
        } else {
            SETUP_FAILED
        }
    }

    fn isolate(&self) -> std::result::Result<(), InitFailure> {
        namespace::uts::set_hostname(&self.hostname).map_err(failed(InitStep::Hostname))?;
        namespace::mount::make_mounts_private().map_err(failed(InitStep::PrivateMounts))?;
        for (i, (target, spec)) in self.mounts.iter().enumerate() {
            filesystem::mount::mount_at(target.as_c_str(), spec)
                .map_err(failed(InitStep::Mount(i)))?;
        }
        for (i, (target, node)) in self.devices.iter().enumerate() {
            filesystem::nodes::create_device_node(target.as_c_str(), node)
                .map_err(failed(InitStep::Device(i)))?;
        }
        filesystem::chroot::chroot_into(self.rootfs.as_c_str()).map_err(failed(InitStep::Chroot))?;
        capability::drop_bounding_set(&self.drop_caps).map_err(|cap| InitFailure {
            step: InitStep::DropCapability(cap.index()),
            errno: None,
        })
    }

    fn exec(&self) -> InitFailure {
        let mut last = Errno::ENOENT;
        for candidate in &self.candidates {
            // SAFETY: both pointer arrays are NULL-terminated and point into
            // `argv` and `envp`, which live as long as `self`.
            #[allow(unsafe_code)]
            let _ = unsafe {
                libc::execve(
                    candidate.as_ptr(),
                    self.argv_ptrs.as_ptr(),
                    self.envp_ptrs.as_ptr(),
                )
            };
            last = Errno::last();
            if !matches!(last, Errno::ENOENT | Errno::ENOTDIR) {
                break;
            }
        }
        InitFailure {
            step: InitStep::Exec,
            errno: Some(last),
        }
    }

    /// Turns a failure reported by the child into a start error.
    pub(crate) fn describe(&self, failure: InitFailure) -> SceError {
        let what = match failure.step {
            InitStep::Hostname => format!("setting hostname {:?}", self.hostname),
            InitStep::PrivateMounts => "remounting / private".to_string(),
            InitStep::Mount(i) => self.mounts.get(i).map_or_else(
                || format!("mount #{i}"),
                |(target, spec)| {
                    format!("mounting {} on {}", spec.source, as_path(target).display())
                },
            ),
            InitStep::Device(i) => self.devices.get(i).map_or_else(
                || format!("device node #{i}"),
                |(target, _)| format!("creating device node {}", as_path(target).display()),
            ),
            InitStep::Chroot => format!("chroot {}", as_path(&self.rootfs).display()),
            InitStep::DropCapability(n) => {
                let cap = self
                    .drop_caps
                    .iter()
                    .find(|c| c.index() == n)
                    .map_or_else(|| format!("capability {n}"), ToString::to_string);
                format!("dropping {cap} from the bounding set")
            }
            InitStep::Exec => {
                let program = self.argv.first().map(|a| a.to_string_lossy());
                format!("exec {program:?}")
            }
        };
        let message = match failure.errno {
            Some(errno) => format!("{what} failed: {errno}"),
            None => format!("{what} failed"),
        };
        SceError::Start { message }
    }
}

fn as_path(c: &CStr) -> &Path {
    Path::new(OsStr::from_bytes(c.to_bytes()))
}

fn to_cpath(path: &Path) -> Result<CString> {
    CString::new(path.as_os_str().as_bytes()).map_err(|_| SceError::Start {
        message: format!("path contains a NUL byte: {}", path.display()),
    })
}

fn to_cstrings(items: &[String]) -> Result<Vec<CString>> {
    items
        .iter()
        .map(|s| {
            CString::new(s.as_bytes()).map_err(|_| SceError::Start {
                message: format!("argument contains a NUL byte: {s:?}"),
            })
        })
        .collect()
}

fn exec_array(items: &[CString]) -> Vec<*const libc::c_char> {
    items
        .iter()
        .map(|s| s.as_ptr())
        .chain(std::iter::once(std::ptr::null()))
        .collect()
}

/// Paths to try for `program`, looked up in the container's own `PATH`.
///
/// A program containing `/` is used as given.
fn exec_candidates(program: &str, env: &[String]) -> Vec<String> {
    if program.contains('/') {
        return vec![program.to_string()];
    }
    let path = env
        .iter()
        .find_map(|e| e.strip_prefix("PATH="))
        .unwrap_or_default();
    path.split(':')
        .filter(|dir| !dir.is_empty())
        .map(|dir| Path::new(dir).join(program).to_string_lossy().into_owned())
        .collect()
}
