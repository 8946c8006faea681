// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # constellation-fsm
//!
//! The 13-state lifecycle automaton, its transition worker and RUN
//! cancellation token, and the per-satellite user-command registry.

pub mod engine;
pub mod error;
pub mod hooks;
pub mod registry;
pub mod state;
pub mod token;

pub use engine::{Fsm, Payload, StateObserver};
pub use error::FsmError;
pub use hooks::{ConfigHook, FailureHook, InterruptingHook, PlainHook, ReconfigureHook, RunningHook, SatelliteHooks, StartingHook};
pub use registry::{Callable, CommandEntry, CommandRegistry, DispatchError, ParamType, RegistryError};
pub use state::{allowed, State, Transition};
pub use token::CancellationToken;
