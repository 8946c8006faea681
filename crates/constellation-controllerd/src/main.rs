// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Controller process entry point (spec.md §6, §4.7).
//!
//! Discovers a satellite group, logs group-state transitions as they are
//! observed, and otherwise just keeps the discovery/aggregation machinery
//! alive until interrupted. A concrete measurement driver is built by
//! depending on `constellation-controller` directly and calling
//! `MeasurementQueue::run` against the `Controller` this binary builds.

use anyhow::{Context, Result};
use clap::Parser;
use constellation_controller::Controller;
use constellation_discovery::resolve_interface;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "constellation-controllerd")]
#[command(author, version, about = "Constellation controller process", long_about = None)]
struct Cli {
    /// Identifies this controller instance in its own logs.
    #[arg(long, default_value = "main")]
    name: String,

    /// CHIRP discovery group.
    #[arg(long, env = "CNSTLN_GROUP", default_value = "constellation")]
    group: String,

    /// Network interface for CHIRP and listeners, as a CIDR or interface name.
    #[arg(long)]
    interface: Option<String>,

    /// Minimum log level surfaced on the console.
    #[arg(long, value_enum, default_value = "info")]
    level: LevelArg,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum LevelArg {
    Trace,
    Debug,
    Info,
    Warning,
    Status,
    Critical,
    Off,
}

impl LevelArg {
    fn filter_directive(self) -> &'static str {
        match self {
            LevelArg::Trace => "trace",
            LevelArg::Debug => "debug",
            LevelArg::Info => "info",
            LevelArg::Warning => "warn",
            LevelArg::Status => "info",
            LevelArg::Critical => "error",
            LevelArg::Off => "off",
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_log::LogTracer::init().context("failed to bridge the log facade into tracing")?;
    let filter = EnvFilter::try_new(cli.level.filter_directive()).context("invalid log level")?;
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).init();

    std::panic::set_hook(Box::new(|info| {
        tracing::error!("unhandled panic: {info}");
    }));

    match std::panic::catch_unwind(|| run(cli)) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => {
            tracing::error!("fatal error: {e:#}");
            std::process::exit(1);
        }
        Err(_) => std::process::exit(2),
    }
}

fn run(cli: Cli) -> Result<()> {
    let bind_addr = resolve_interface(cli.interface.as_deref()).context("failed to resolve --interface")?;

    let controller_name = cli.name.clone();
    let reached_name = controller_name.clone();
    let leaving_name = controller_name.clone();

    let controller = Controller::start(
        &cli.group,
        bind_addr,
        Box::new(move |state, is_global| {
            let scope = if is_global { "global" } else { "lowest" };
            tracing::info!(controller = %reached_name, scope, state = %state.name(), "group reached state");
        }),
        Box::new(move |state, is_global| {
            let scope = if is_global { "global" } else { "lowest" };
            tracing::info!(controller = %leaving_name, scope, state = %state.name(), "group left state");
        }),
    )
    .context("failed to start controller discovery")?;

    tracing::info!(name = %controller_name, group = %cli.group, "controller running");

    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_handler = shutdown.clone();
    ctrlc::set_handler(move || {
        tracing::info!("received Ctrl+C, shutting down");
        shutdown_handler.store(true, Ordering::Relaxed);
    })
    .context("failed to install Ctrl+C handler")?;

    while !shutdown.load(Ordering::Relaxed) {
        std::thread::sleep(Duration::from_millis(200));
    }

    tracing::info!(peers = ?controller.peer_names(), "shutting down");
    controller.shutdown();
    Ok(())
}
