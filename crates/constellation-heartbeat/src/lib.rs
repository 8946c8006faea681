// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # constellation-heartbeat
//!
//! CHP heartbeat publisher and peer liveness watchdog.

pub mod sender;
pub mod watchdog;

pub use sender::{clamp_interval_ms, HeartbeatSender, DEFAULT_INTERVAL_MS, MAX_INTERVAL_MS, MIN_INTERVAL_MS};
pub use watchdog::{HeartbeatWatchdog, PeerEvent, WatchdogCallback, MIN_GRACE};
