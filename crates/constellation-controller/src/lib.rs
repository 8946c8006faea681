// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # constellation-controller
//!
//! The controller runtime (spec.md §4.7): tracks satellites discovered via
//! CHIRP, aggregates their FSM state, fans commands out to the group, and
//! runs the `initialize -> launch -> start -> stop` measurement queue.

pub mod aggregation;
pub mod controller;
pub mod measurement;
pub mod metrics;
pub mod peer;

pub use aggregation::{Aggregator, GlobalState};
pub use controller::{Controller, ControllerError};
pub use measurement::{
    AbortHandle, Comparator, MeasurementCondition, MeasurementError, MeasurementQueue, MetricCondition, PredicateCondition, RunIdGenerator,
    TimerCondition,
};
pub use metrics::MetricSubscriber;
pub use peer::{Peer, PeerError};
