// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # constellation-satellite
//!
//! The satellite runtime (spec.md §4.6): wires an FSM, a user-command
//! registry, a CSCP command responder, a CHP heartbeat sender and CHIRP
//! discovery advertisement into one process.

pub mod core;
pub mod dispatch;
pub mod metrics;
pub mod responder;

pub use core::{Satellite, SatelliteError};
pub use dispatch::handle_request;
pub use metrics::MetricsPublisher;
