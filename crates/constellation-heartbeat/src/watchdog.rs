// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! CHP receiver: per-peer liveness tracking and loss detection
//! (spec.md §4.2).
//!
//! One reader thread per subscribed peer decodes beacons off its TCP
//! stream; a single dedicated watchdog thread ticks over every tracked
//! peer's liveness, matching `LeaseTracker`'s one-thread-many-entries
//! shape (`core/discovery/multicast/lease.rs`) rather than one timer per
//! peer.

use constellation_proto::Beacon;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io::Read;
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const INITIAL_LIVES: u32 = 3;
const TICK_INTERVAL: Duration = Duration::from_millis(100);

/// An observation the watchdog reports to its owner.
#[derive(Debug, Clone)]
pub enum PeerEvent {
    /// A valid beacon refreshed this peer's liveness.
    Beat(Beacon),
    /// The peer exhausted its remaining lives.
    Lost { peer: String },
}

pub type WatchdogCallback = Arc<dyn Fn(PeerEvent) + Send + Sync>;

struct PeerLiveness {
    remaining_lives: u32,
    next_expected_beat: Instant,
    interval: Duration,
}

impl PeerLiveness {
    fn refresh(&mut self, interval: Duration, grace: Duration) {
        self.remaining_lives = INITIAL_LIVES;
        self.interval = interval;
        self.next_expected_beat = Instant::now() + interval + grace;
    }
}

struct Shared {
    peers: Mutex<HashMap<String, PeerLiveness>>,
    callback: WatchdogCallback,
}

/// Minimum grace period honored on top of a peer's reported interval
/// (spec.md §4.2: "grace ≥ 500 ms").
pub const MIN_GRACE: Duration = Duration::from_millis(500);

pub struct HeartbeatWatchdog {
    shared: Arc<Shared>,
    running: Arc<AtomicBool>,
    tick_handle: Option<JoinHandle<()>>,
    reader_handles: Vec<JoinHandle<()>>,
}

impl HeartbeatWatchdog {
    pub fn start(callback: WatchdogCallback) -> Self {
        let shared = Arc::new(Shared { peers: Mutex::new(HashMap::new()), callback });
        let running = Arc::new(AtomicBool::new(true));

        let shared_clone = shared.clone();
        let running_clone = running.clone();
        let tick_handle = thread::Builder::new()
            .name("constellation-chp-watchdog".to_string())
            .spawn(move || Self::tick_loop(shared_clone, running_clone))
            .expect("failed to spawn CHP watchdog thread");

        Self { shared, running, tick_handle: Some(tick_handle), reader_handles: Vec::new() }
    }

    /// Start reading beacons from a peer's CHP subscriber stream. The
    /// peer's canonical name is reported in every `Beacon`, but is passed
    /// explicitly here since it must be known before the first one
    /// arrives.
    pub fn track(&mut self, peer: String, mut stream: TcpStream) {
        self.shared.peers.lock().insert(
            peer.clone(),
            PeerLiveness { remaining_lives: INITIAL_LIVES, next_expected_beat: Instant::now() + Duration::from_secs(1) + MIN_GRACE, interval: Duration::from_secs(1) },
        );

        let shared = self.shared.clone();
        let running = self.running.clone();
        let handle = thread::Builder::new()
            .name("constellation-chp-reader".to_string())
            .spawn(move || {
                while running.load(Ordering::Relaxed) {
                    let mut len_buf = [0u8; 4];
                    if stream.read_exact(&mut len_buf).is_err() {
                        break;
                    }
                    let len = u32::from_le_bytes(len_buf) as usize;
                    let mut body = vec![0u8; len];
                    if stream.read_exact(&mut body).is_err() {
                        break;
                    }
                    let beacon = match Beacon::decode(&body) {
                        Ok(b) => b,
                        Err(e) => {
                            log::trace!("[constellation-chp-reader] dropping malformed beacon from {peer}: {e}");
                            continue;
                        }
                    };
                    let interval = Duration::from_millis(u64::from(beacon.interval_ms));
                    {
                        let mut peers = shared.peers.lock();
                        if let Some(liveness) = peers.get_mut(&peer) {
                            liveness.refresh(interval, MIN_GRACE);
                        }
                    }
                    (shared.callback)(PeerEvent::Beat(beacon));
                }
                // Stream closed or erroring: treat identically to a run of
                // missed beats, letting the tick loop declare loss once
                // remaining_lives reaches zero on its own schedule is too
                // slow for a clean disconnect, so declare it here directly.
                let mut peers = shared.peers.lock();
                if peers.remove(&peer).is_some() {
                    drop(peers);
                    (shared.callback)(PeerEvent::Lost { peer });
                }
            })
            .expect("failed to spawn CHP reader thread");
        self.reader_handles.push(handle);
    }

    /// Stop liveness tracking for `peer` without waiting for a missed
    /// beat, e.g. on a graceful CHIRP `DEPART` (spec.md §4.7). The reader
    /// thread for this peer exits on its own once the stream closes; this
    /// only removes the bookkeeping that would otherwise fire a spurious
    /// `Lost` once that happens.
    pub fn untrack(&mut self, peer: &str) {
        self.shared.peers.lock().remove(peer);
    }

    fn tick_loop(shared: Arc<Shared>, running: Arc<AtomicBool>) {
        while running.load(Ordering::Relaxed) {
            thread::sleep(TICK_INTERVAL);
            let now = Instant::now();
            let mut lost = Vec::new();
            {
                let mut peers = shared.peers.lock();
                for (name, liveness) in peers.iter_mut() {
                    if now > liveness.next_expected_beat {
                        liveness.remaining_lives = liveness.remaining_lives.saturating_sub(1);
                        liveness.next_expected_beat += liveness.interval;
                        if liveness.remaining_lives == 0 {
                            lost.push(name.clone());
                        }
                    }
                }
                for name in &lost {
                    peers.remove(name);
                }
            }
            for peer in lost {
                (shared.callback)(PeerEvent::Lost { peer });
            }
        }
    }

    pub fn shutdown(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.tick_handle.take() {
            let _ = handle.join();
        }
        for handle in self.reader_handles.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for HeartbeatWatchdog {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.tick_handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    fn make_liveness(interval: Duration) -> PeerLiveness {
        PeerLiveness { remaining_lives: INITIAL_LIVES, next_expected_beat: Instant::now() - Duration::from_millis(1), interval }
    }

    #[test]
    fn refresh_resets_lives_and_schedule() {
        let mut liveness = make_liveness(Duration::from_millis(500));
        liveness.remaining_lives = 1;
        liveness.refresh(Duration::from_millis(500), MIN_GRACE);
        assert_eq!(liveness.remaining_lives, INITIAL_LIVES);
        assert!(liveness.next_expected_beat > Instant::now());
    }

    #[test]
    fn watchdog_declares_loss_after_three_missed_ticks() {
        let events: Arc<StdMutex<Vec<PeerEvent>>> = Arc::new(StdMutex::new(Vec::new()));
        let events_clone = events.clone();
        let mut watchdog = HeartbeatWatchdog::start(Arc::new(move |e| events_clone.lock().unwrap().push(e)));

        {
            let mut peers = watchdog.shared.peers.lock();
            peers.insert(
                "Sensor.a".to_string(),
                PeerLiveness {
                    remaining_lives: INITIAL_LIVES,
                    next_expected_beat: Instant::now() - Duration::from_millis(1),
                    interval: Duration::from_millis(50),
                },
            );
        }

        thread::sleep(Duration::from_millis(600));
        watchdog.shutdown();

        let events = events.lock().unwrap();
        assert!(events.iter().any(|e| matches!(e, PeerEvent::Lost { peer } if peer == "Sensor.a")));
    }
}
