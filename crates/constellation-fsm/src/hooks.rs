// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! User-supplied transition hooks (spec.md §4.6, §9 Design Notes (a)).
//!
//! Composition over inheritance: the FSM owns a table of boxed closures
//! supplied by the satellite author at construction instead of requiring a
//! base class with virtual methods to override, matching the `DiscoveryCallback`
//! type-alias idiom used for discovery/heartbeat callbacks.

use crate::state::State;
use crate::token::CancellationToken;
use constellation_value::Configuration;

pub type ConfigHook = Box<dyn FnMut(&mut Configuration) -> Result<(), String> + Send>;
pub type ReconfigureHook = Box<dyn FnMut(&Configuration) -> Result<(), String> + Send>;
pub type PlainHook = Box<dyn FnMut() -> Result<(), String> + Send>;
pub type StartingHook = Box<dyn FnMut(&str) -> Result<(), String> + Send>;
pub type RunningHook = Box<dyn FnMut(CancellationToken) -> Result<(), String> + Send>;
pub type InterruptingHook = Box<dyn FnMut(State, &str) -> Result<(), String> + Send>;
pub type FailureHook = Box<dyn FnMut(State, &str) + Send>;

fn noop_plain() -> Result<(), String> {
    Ok(())
}

/// Table of hooks a satellite author wires up before calling `Fsm::start`.
/// Every entry has a default no-op so a satellite only needs to override
/// the ones it cares about.
pub struct SatelliteHooks {
    pub initializing: ConfigHook,
    pub launching: PlainHook,
    pub landing: PlainHook,
    pub reconfiguring: ReconfigureHook,
    pub starting: StartingHook,
    pub stopping: PlainHook,
    pub running: RunningHook,
    pub interrupting: InterruptingHook,
    pub on_failure: Option<FailureHook>,
}

impl Default for SatelliteHooks {
    fn default() -> Self {
        Self {
            initializing: Box::new(|_cfg| Ok(())),
            launching: Box::new(noop_plain),
            landing: Box::new(noop_plain),
            reconfiguring: Box::new(|_cfg: &Configuration| Ok(())),
            starting: Box::new(|_run_id| Ok(())),
            running: Box::new(|_token| Ok(())),
            interrupting: Box::new(|_prev, _reason| Ok(())),
            on_failure: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_hooks_all_succeed() {
        let mut hooks = SatelliteHooks::default();
        let mut cfg = Configuration::empty();
        assert!((hooks.initializing)(&mut cfg).is_ok());
        assert!((hooks.launching)().is_ok());
        assert!((hooks.running)(CancellationToken::new()).is_ok());
        assert!(hooks.on_failure.is_none());
    }
}
