//! # sce-core
//!
//! Low-level Linux isolation primitives for the sce executor.
//!
//! This crate provides safe abstractions over:
//! - **Namespaces**: mount, UTS, IPC, PID and network clone flags, hostname.
//! - **Cgroups**: memory ceiling, cpuset and device rules on cgroupfs.
//! - **Filesystem**: pseudo-filesystem mounts, device nodes and `chroot`.
//! - **Capabilities**: bounding-set reduction to an allow-list.
//! - **Network**: bridge address lookup, loopback and veth setup.
//!
//! Helpers that run in the cloned container init, between `clone(2)` and
//! `execve(2)`, return bare [`nix::Result`]s and never allocate.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod capability;
pub mod cgroup;
pub mod device;
pub mod filesystem;
pub mod namespace;
pub mod network;
