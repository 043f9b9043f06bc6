//! Container assembly and supervision for the sce executor.
//!
//! [`engine::Engine`] ties the pieces together: it resolves the bridge
//! address, generates an [`identity`], builds the [`config`] for the
//! isolation engine in [`backend`], and hands the created container to the
//! [`supervisor`].

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod backend;
pub mod config;
pub mod engine;
pub mod factory;
pub mod identity;
pub mod process;
pub mod signals;
pub mod state;
pub mod supervisor;
