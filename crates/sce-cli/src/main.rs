//! # sce: simple container executor
//!
//! Runs one program inside a fresh set of namespaces, a cgroup and a chroot,
//! forwards `SIGINT`/`SIGTERM` to it, and exits with its status.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

mod cli;
mod size;

use anyhow::Context;
use clap::Parser;
use tokio::sync::mpsc;

use sce_common::config::Options;
use sce_common::constants::GENERIC_FAILURE_EXIT_CODE;
use sce_runtime::engine::Engine;
use sce_runtime::signals::{self, SIGNAL_CHANNEL_CAPACITY};

use crate::cli::Cli;

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            std::process::exit(cli::parse_exit_code(&e));
        }
    };
    init_tracing(cli.log_json);

    let code = match run(&cli) {
        Ok(code) => code,
        Err(e) => {
            report(&e);
            GENERIC_FAILURE_EXIT_CODE
        }
    };
    std::process::exit(code);
}

/// Logs go to stderr; stdout belongs to the contained program.
fn init_tracing(json: bool) {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[allow(clippy::print_stderr)]
fn report(error: &anyhow::Error) {
    eprintln!("Error: {error:#}");
}

fn run(cli: &Cli) -> anyhow::Result<i32> {
    let options = Options::validate(cli.raw_options())?;
    tracing::debug!(
        options = %serde_json::to_string(&options)?,
        memory = %size::format_bytes(options.memory_limit()),
        "validated options"
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    runtime.block_on(async {
        let (tx, rx) = mpsc::channel(SIGNAL_CHANNEL_CAPACITY);
        let listener = signals::listen(tx)?;
        let engine = Engine::native(&cli.state_root)?;
        let result = engine.run(&options, rx).await;
        listener.abort();
        Ok::<_, anyhow::Error>(result?)
    })
}
