// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! State aggregation across the peer group (spec.md §4.7): `lowest_state`
//! and `global_state`, plus the background thread that invokes
//! `reached_state`/`leaving_state` callbacks on every change.

use constellation_fsm::State;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// `global_state(peers)`: the unique state iff every peer shares it, else
/// the "mixed" sentinel (spec.md §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlobalState {
    Unique(State),
    Mixed,
}

/// The state with the numerically smallest code across `peers`. `None` if
/// the group is empty.
pub fn lowest_state(peers: &[State]) -> Option<State> {
    peers.iter().copied().min_by_key(|s| s.code())
}

pub fn global_state(peers: &[State]) -> Option<GlobalState> {
    let mut iter = peers.iter().copied();
    let first = iter.next()?;
    if iter.all(|s| s == first) {
        Some(GlobalState::Unique(first))
    } else {
        Some(GlobalState::Mixed)
    }
}

pub type ReachedCallback = Box<dyn Fn(State, bool) + Send>;
pub type LeavingCallback = Box<dyn Fn(State, bool) + Send>;

struct Aggregate {
    lowest: Option<State>,
    global: Option<GlobalState>,
}

/// Polls the peer-state snapshot supplied by its owner and fires
/// `reached_state`/`leaving_state` on every observed change, matching the
/// tick-loop shape `HeartbeatWatchdog` uses for peer liveness.
pub struct Aggregator {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

const TICK_INTERVAL: Duration = Duration::from_millis(100);

impl Aggregator {
    pub fn start<F>(snapshot: F, reached: ReachedCallback, leaving: LeavingCallback) -> Self
    where
        F: Fn() -> Vec<State> + Send + 'static,
    {
        let running = Arc::new(AtomicBool::new(true));
        let running_clone = running.clone();
        let handle = thread::Builder::new()
            .name("constellation-aggregator".to_string())
            .spawn(move || Self::run(snapshot, reached, leaving, running_clone))
            .expect("failed to spawn state-aggregation thread");
        Self { running, handle: Some(handle) }
    }

    fn run<F>(snapshot: F, reached: ReachedCallback, leaving: LeavingCallback, running: Arc<AtomicBool>)
    where
        F: Fn() -> Vec<State>,
    {
        let mut previous = Aggregate { lowest: None, global: None };
        while running.load(Ordering::Relaxed) {
            thread::sleep(TICK_INTERVAL);
            let states = snapshot();
            let lowest = lowest_state(&states);
            let global = global_state(&states);

            if lowest != previous.lowest {
                if let Some(old) = previous.lowest {
                    leaving(old, false);
                }
                if let Some(new) = lowest {
                    reached(new, false);
                }
            }
            if global != previous.global {
                if let Some(GlobalState::Unique(old)) = previous.global {
                    leaving(old, true);
                }
                if let Some(GlobalState::Unique(new)) = global {
                    reached(new, true);
                }
            }

            previous = Aggregate { lowest, global };
        }
    }

    pub fn shutdown(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Aggregator {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn lowest_state_picks_smallest_code() {
        let peers = vec![State::Orbit, State::New, State::Run];
        assert_eq!(lowest_state(&peers), Some(State::New));
    }

    #[test]
    fn lowest_state_of_empty_group_is_none() {
        assert_eq!(lowest_state(&[]), None);
    }

    #[test]
    fn global_state_is_unique_when_all_peers_match() {
        let peers = vec![State::Orbit, State::Orbit];
        assert_eq!(global_state(&peers), Some(GlobalState::Unique(State::Orbit)));
    }

    #[test]
    fn global_state_is_mixed_otherwise() {
        let peers = vec![State::Orbit, State::Run];
        assert_eq!(global_state(&peers), Some(GlobalState::Mixed));
    }

    #[test]
    fn aggregator_fires_reached_then_leaving_on_group_transition() {
        use std::sync::atomic::AtomicUsize;
        let states: Arc<Mutex<Vec<State>>> = Arc::new(Mutex::new(vec![State::New]));
        let events: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let reached_count = Arc::new(AtomicUsize::new(0));

        let states_clone = states.clone();
        let events_reached = events.clone();
        let reached_count_clone = reached_count.clone();
        let events_leaving = events.clone();

        let mut agg = Aggregator::start(
            move || states_clone.lock().clone(),
            Box::new(move |s, is_global| {
                reached_count_clone.fetch_add(1, Ordering::SeqCst);
                events_reached.lock().push(format!("reached:{s}:{is_global}"));
            }),
            Box::new(move |s, is_global| {
                events_leaving.lock().push(format!("leaving:{s}:{is_global}"));
            }),
        );

        thread::sleep(Duration::from_millis(250));
        *states.lock() = vec![State::Orbit];
        thread::sleep(Duration::from_millis(250));
        agg.shutdown();

        let events = events.lock().clone();
        assert!(events.iter().any(|e| e.starts_with("leaving:New")));
        assert!(events.iter().any(|e| e.starts_with("reached:Orbit")));
    }
}
