// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Generic satellite process entry point (spec.md §6).
//!
//! Ships with an empty command registry; a concrete instrument satellite
//! is built by depending on `constellation-satellite` directly and
//! registering its own commands before calling `Satellite::start`, the way
//! this binary does for the reference "Generic" satellite type.

use anyhow::{Context, Result};
use clap::Parser;
use constellation_discovery::resolve_interface;
use constellation_fsm::{CommandRegistry, SatelliteHooks};
use constellation_satellite::Satellite;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const SATELLITE_TYPE: &str = "Generic";

#[derive(Parser, Debug)]
#[command(name = "constellation-satellited")]
#[command(author, version, about = "Constellation satellite process", long_about = None)]
struct Cli {
    /// Canonical name suffix; the satellite type is fixed per-binary.
    #[arg(long)]
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
    /// `STATUS` and `CRITICAL` have no native `tracing` level (spec.md §6);
    /// `STATUS` maps to INFO, `CRITICAL` to ERROR (DESIGN.md).
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

    let registry = CommandRegistry::new();
    let satellite = Satellite::new(SATELLITE_TYPE, &cli.name, env!("CARGO_PKG_VERSION"), SatelliteHooks::default(), registry)
        .context("invalid satellite name")?;

    tracing::info!(name = %satellite.canonical_name(), group = %cli.group, "starting satellite");
    satellite.start(&cli.group, bind_addr).context("failed to bind satellite sockets")?;

    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_handler = shutdown.clone();
    ctrlc::set_handler(move || {
        tracing::info!("received Ctrl+C, shutting down");
        shutdown_handler.store(true, Ordering::Relaxed);
    })
    .context("failed to install Ctrl+C handler")?;

    while !shutdown.load(Ordering::Relaxed) && !satellite.shutdown_requested() {
        std::thread::sleep(Duration::from_millis(200));
    }

    tracing::info!("shutting down");
    satellite.shutdown();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::LevelArg;

    #[test]
    fn status_and_critical_map_onto_the_nearest_tracing_level() {
        assert_eq!(LevelArg::Status.filter_directive(), "info");
        assert_eq!(LevelArg::Critical.filter_directive(), "error");
    }

    #[test]
    fn off_disables_the_filter() {
        assert_eq!(LevelArg::Off.filter_directive(), "off");
    }
}
