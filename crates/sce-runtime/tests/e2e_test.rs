//! End-to-end tests for the sce runtime pipeline.
//!
//! These tests drive [`Engine`] with a recording factory and a static
//! interface table, so they run unprivileged:
//! 1. Bridge lookup and gateway selection
//! 2. Construction failures before any container exists
//! 3. Identity flowing into container and cgroup names
//! 4. Exit codes and exactly-once destruction
//!
//! Tests needing root and a real rootfs are `#[ignore]`d; run them with
//! `SCE_TEST_ROOTFS=/path/to/rootfs cargo test -- --ignored` as root.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use nix::sys::signal::Signal;
use tokio::sync::mpsc;

use sce_common::config::{Options, RawOptions};
use sce_common::error::{Result, SceError};
use sce_common::types::ContainerName;
use sce_core::network::bridge::{BridgeLookup, select_bridge_ipv4};
use sce_runtime::config::IsolationConfig;
use sce_runtime::engine::Engine;
use sce_runtime::factory::{ContainerHandle, RuntimeFactory};
use sce_runtime::process::{ContainerProcess, ExitStatus};

// ── Fakes ────────────────────────────────────────────────────────────

struct StaticInterfaces(Vec<(String, Option<std::net::IpAddr>)>);

impl BridgeLookup for StaticInterfaces {
    fn bridge_ipv4(&self, bridge: &str) -> Result<Ipv4Addr> {
        select_bridge_ipv4(bridge, self.0.clone())
    }
}

fn interfaces() -> Box<StaticInterfaces> {
    Box::new(StaticInterfaces(vec![
        ("lo".into(), Some(Ipv4Addr::LOCALHOST.into())),
        ("br0".into(), None),
        ("br0".into(), Some("fe80::1".parse().unwrap())),
        ("br0".into(), Some(Ipv4Addr::new(192, 168, 1, 1).into())),
        ("br0".into(), Some(Ipv4Addr::new(192, 168, 1, 2).into())),
        ("empty0".into(), Some("fe80::2".parse().unwrap())),
    ]))
}

#[derive(Default)]
struct Journal {
    created: Mutex<Vec<(ContainerName, IsolationConfig)>>,
    started: Mutex<Vec<Vec<String>>>,
    destroyed: AtomicUsize,
}

struct RecordingFactory {
    journal: Arc<Journal>,
    exit: ExitStatus,
    fail_start: bool,
}

impl RuntimeFactory for RecordingFactory {
    fn create(
        &self,
        name: &ContainerName,
        config: IsolationConfig,
    ) -> Result<Arc<dyn ContainerHandle>> {
        self.journal
            .created
            .lock()
            .unwrap()
            .push((name.clone(), config));
        Ok(Arc::new(RecordedContainer {
            name: name.clone(),
            journal: Arc::clone(&self.journal),
            exit: self.exit,
            fail_start: self.fail_start,
        }))
    }
}

struct RecordedContainer {
    name: ContainerName,
    journal: Arc<Journal>,
    exit: ExitStatus,
    fail_start: bool,
}

impl ContainerHandle for RecordedContainer {
    fn name(&self) -> &ContainerName {
        &self.name
    }

    fn start(&self, process: &ContainerProcess) -> Result<()> {
        if self.fail_start {
            return Err(SceError::Start {
                message: "no such file or directory".into(),
            });
        }
        self.journal
            .started
            .lock()
            .unwrap()
            .push(process.args().to_vec());
        process.set_pid(nix::unistd::Pid::from_raw(7))
    }

    fn signal(&self, _: &ContainerProcess, _: Signal) -> Result<()> {
        Ok(())
    }

    fn wait(&self, _: &ContainerProcess) -> Result<ExitStatus> {
        Ok(self.exit)
    }

    fn destroy(&self) -> Result<()> {
        let _ = self.journal.destroyed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn engine(exit: ExitStatus, fail_start: bool) -> (Engine, Arc<Journal>) {
    let journal = Arc::new(Journal::default());
    let factory = RecordingFactory {
        journal: Arc::clone(&journal),
        exit,
        fail_start,
    };
    (Engine::new(Box::new(factory), interfaces()), journal)
}

fn options(rootfs: &tempfile::TempDir, edit: impl FnOnce(&mut RawOptions)) -> Options {
    let mut raw = RawOptions {
        chroot: rootfs.path().to_string_lossy().into_owned(),
        bridge: "br0".into(),
        program: vec!["/bin/sh".into(), "-c".into(), "exit 3".into()],
        ..RawOptions::default()
    };
    edit(&mut raw);
    Options::validate(raw).unwrap()
}

fn signals() -> mpsc::Receiver<Signal> {
    mpsc::channel(1).1
}

// ── Bridge lookup ────────────────────────────────────────────────────

#[test]
fn pipeline_veth_gateway_is_first_bridge_ipv4() {
    let rootfs = tempfile::tempdir().unwrap();
    let (engine, journal) = engine(ExitStatus::Exited(0), false);
    let opts = options(&rootfs, |r| r.network_address = "192.168.1.50/24".into());

    let prepared = engine.prepare(&opts).unwrap();
    let veth = prepared.config.veth().unwrap();
    assert_eq!(veth.gateway, Ipv4Addr::new(192, 168, 1, 1));
    assert_eq!(veth.bridge, "br0");
    assert_eq!(veth.address.to_string(), "192.168.1.50/24");
    assert_eq!(journal.created.lock().unwrap().len(), 1);
}

#[test]
fn pipeline_bridge_without_ipv4_fails_before_create() {
    let rootfs = tempfile::tempdir().unwrap();
    let (engine, journal) = engine(ExitStatus::Exited(0), false);
    let opts = options(&rootfs, |r| r.bridge = "empty0".into());

    let err = engine.prepare(&opts).err().unwrap();
    assert!(matches!(err, SceError::Bridge { .. }));
    assert!(err.is_fatal());
    assert!(journal.created.lock().unwrap().is_empty());
}

#[test]
fn pipeline_bridge_is_checked_even_without_network() {
    let rootfs = tempfile::tempdir().unwrap();
    let (engine, journal) = engine(ExitStatus::Exited(0), false);
    let opts = options(&rootfs, |r| r.bridge = "missing0".into());
    assert!(!opts.network_enabled());

    assert!(engine.prepare(&opts).is_err());
    assert!(journal.created.lock().unwrap().is_empty());
}

// ── Construction ─────────────────────────────────────────────────────

#[test]
fn pipeline_empty_chroot_is_rejected_by_validation() {
    let err = Options::validate(RawOptions {
        bridge: "br0".into(),
        program: vec!["/bin/true".into()],
        ..RawOptions::default()
    })
    .unwrap_err();
    assert!(err.is_fatal());
}

#[test]
fn pipeline_identity_names_container_and_cgroup() {
    let rootfs = tempfile::tempdir().unwrap();
    let (engine, journal) = engine(ExitStatus::Exited(0), false);
    let opts = options(&rootfs, |r| {
        r.memory_limit = 128_000_000;
        r.cpu_core_ids = "0".into();
    });

    let prepared = engine.prepare(&opts).unwrap();
    let created = journal.created.lock().unwrap();
    let (name, config) = &created[0];
    assert_eq!(name, &prepared.identity.name);
    assert_eq!(config.cgroup.name, name.as_str());
    assert_eq!(config.hostname, name.as_str());
    assert_eq!(config.cgroup.memory, Some(128_000_000));
    assert_eq!(config.cgroup.cpuset_cpus.as_deref(), Some("0"));
    assert!(config.veth().is_none());
}

#[test]
fn pipeline_names_differ_between_runs() {
    let rootfs = tempfile::tempdir().unwrap();
    let (engine, journal) = engine(ExitStatus::Exited(0), false);
    let opts = options(&rootfs, |_| {});

    let _a = engine.prepare(&opts).unwrap();
    let _b = engine.prepare(&opts).unwrap();
    let created = journal.created.lock().unwrap();
    assert_ne!(created[0].0, created[1].0);
}

// ── Supervision ──────────────────────────────────────────────────────

#[tokio::test]
async fn pipeline_exit_code_and_single_destroy() {
    let rootfs = tempfile::tempdir().unwrap();
    let (engine, journal) = engine(ExitStatus::Exited(3), false);
    let opts = options(&rootfs, |_| {});

    assert_eq!(engine.run(&opts, signals()).await.unwrap(), 3);
    assert_eq!(journal.destroyed.load(Ordering::SeqCst), 1);
    assert_eq!(
        journal.started.lock().unwrap()[0],
        ["/bin/sh", "-c", "exit 3"]
    );
}

#[tokio::test]
async fn pipeline_signal_death_maps_to_shell_code() {
    let rootfs = tempfile::tempdir().unwrap();
    let (engine, journal) = engine(ExitStatus::Signaled(Signal::SIGKILL), false);
    let opts = options(&rootfs, |_| {});

    assert_eq!(engine.run(&opts, signals()).await.unwrap(), 137);
    assert_eq!(journal.destroyed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn pipeline_start_failure_destroys_container() {
    let rootfs = tempfile::tempdir().unwrap();
    let (engine, journal) = engine(ExitStatus::Exited(0), true);
    let opts = options(&rootfs, |_| {});

    let err = engine.run(&opts, signals()).await.unwrap_err();
    assert!(matches!(err, SceError::Start { .. }));
    assert_eq!(journal.destroyed.load(Ordering::SeqCst), 1);
}

// ── Native engine (root only) ────────────────────────────────────────

fn native_options(edit: impl FnOnce(&mut RawOptions)) -> Option<Options> {
    let rootfs = std::env::var("SCE_TEST_ROOTFS").ok()?;
    let mut raw = RawOptions {
        chroot: rootfs,
        bridge: std::env::var("SCE_TEST_BRIDGE").unwrap_or_else(|_| "docker0".into()),
        program: vec!["/bin/sh".into(), "-c".into(), "exit 3".into()],
        ..RawOptions::default()
    };
    edit(&mut raw);
    Some(Options::validate(raw).unwrap())
}

#[tokio::test]
#[ignore = "requires root, a bridge and SCE_TEST_ROOTFS"]
async fn native_exit_code_is_propagated() {
    let Some(opts) = native_options(|_| {}) else {
        return;
    };
    let state = tempfile::tempdir().unwrap();
    let engine = Engine::native(state.path()).unwrap();
    assert_eq!(engine.run(&opts, signals()).await.unwrap(), 3);
    assert_eq!(std::fs::read_dir(state.path()).unwrap().count(), 0);
}

#[tokio::test]
#[ignore = "requires root, a bridge and SCE_TEST_ROOTFS"]
async fn native_container_sees_its_own_hostname() {
    let Some(opts) = native_options(|r| {
        r.program = vec!["/bin/sh".into(), "-c".into(), "test \"$(hostname)\" != \"\"".into()];
    }) else {
        return;
    };
    let state = tempfile::tempdir().unwrap();
    let engine = Engine::native(state.path()).unwrap();
    assert_eq!(engine.run(&opts, signals()).await.unwrap(), 0);
}

#[tokio::test]
#[ignore = "requires root, a bridge and SCE_TEST_ROOTFS"]
async fn native_missing_program_is_a_start_error() {
    let Some(opts) = native_options(|r| r.program = vec!["/does/not/exist".into()]) else {
        return;
    };
    let state = tempfile::tempdir().unwrap();
    let engine = Engine::native(state.path()).unwrap();
    let err = engine.run(&opts, signals()).await.unwrap_err();
    assert!(err.to_string().contains("exec"));
}

