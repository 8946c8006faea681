// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! CHP sender: a PUB-style TCP fan-out of `Beacon`s (spec.md §4.2).
//!
//! Modelled on `hdds::admin::api::server`'s accept-loop/connection-handler
//! split, generalized from request/response to broadcast: every accepted
//! subscriber gets every beacon until its stream errors, at which point it
//! is dropped from the fan-out list.

use constellation_proto::Beacon;
use parking_lot::{Condvar, Mutex};
use std::io::Write;
use std::net::{IpAddr, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime};

pub const DEFAULT_INTERVAL_MS: u32 = 1000;
pub const MIN_INTERVAL_MS: u32 = 500;
pub const MAX_INTERVAL_MS: u32 = 10_000;

/// Clamp a requested interval into spec.md §4.2's allowed range.
pub fn clamp_interval_ms(requested: u32) -> u32 {
    requested.clamp(MIN_INTERVAL_MS, MAX_INTERVAL_MS)
}

struct Shared {
    sender_name: String,
    state_code: AtomicU32,
    reason: Mutex<Option<String>>,
    interval_ms: AtomicU32,
    subscribers: Mutex<Vec<TcpStream>>,
}

/// Publishes beacons at a configurable interval and immediately on state
/// change, to every subscriber connected via `bind()`.
pub struct HeartbeatSender {
    shared: Arc<Shared>,
    wake: Arc<(Mutex<bool>, Condvar)>,
    running: Arc<AtomicBool>,
    accept_handle: Option<JoinHandle<()>>,
    send_handle: Option<JoinHandle<()>>,
    local_addr: SocketAddr,
}

impl HeartbeatSender {
    /// Bind a TCP listener for subscribers and start the accept and send
    /// loops. `sender_name` is the canonical name reported in every
    /// beacon.
    pub fn bind(sender_name: &str, bind_addr: SocketAddr, initial_state_code: u8) -> std::io::Result<Self> {
        let listener = TcpListener::bind(bind_addr)?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        let shared = Arc::new(Shared {
            sender_name: sender_name.to_string(),
            state_code: AtomicU32::new(u32::from(initial_state_code)),
            reason: Mutex::new(None),
            interval_ms: AtomicU32::new(DEFAULT_INTERVAL_MS),
            subscribers: Mutex::new(Vec::new()),
        });
        let wake = Arc::new((Mutex::new(false), Condvar::new()));
        let running = Arc::new(AtomicBool::new(true));

        let accept_handle = {
            let shared = shared.clone();
            let running = running.clone();
            thread::Builder::new()
                .name("constellation-chp-accept".to_string())
                .spawn(move || Self::accept_loop(listener, shared, running))?
        };

        let send_handle = {
            let shared = shared.clone();
            let wake = wake.clone();
            let running = running.clone();
            thread::Builder::new().name("constellation-chp-send".to_string()).spawn(move || Self::send_loop(shared, wake, running))?
        };

        Ok(Self { shared, wake, running, accept_handle: Some(accept_handle), send_handle: Some(send_handle), local_addr })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Change the state reported in subsequent beacons and emit one
    /// immediately (spec.md §4.2 "Immediately emits an extraordinary
    /// beacon on every state change").
    pub fn announce_state(&self, state_code: u8, reason: Option<String>) {
        self.shared.state_code.store(u32::from(state_code), Ordering::Relaxed);
        *self.shared.reason.lock() = reason;
        self.wake_sender();
    }

    /// Adjust the beacon interval; takes effect from the next beacon
    /// (spec.md §4.2 "a change is announced by the next beacon").
    pub fn set_interval_ms(&self, interval_ms: u32) {
        self.shared.interval_ms.store(clamp_interval_ms(interval_ms), Ordering::Relaxed);
    }

    fn wake_sender(&self) {
        let (lock, cvar) = &*self.wake;
        *lock.lock() = true;
        cvar.notify_all();
    }

    fn accept_loop(listener: TcpListener, shared: Arc<Shared>, running: Arc<AtomicBool>) {
        while running.load(Ordering::Relaxed) {
            match listener.accept() {
                Ok((stream, _addr)) => {
                    let _ = stream.set_nodelay(true);
                    shared.subscribers.lock().push(stream);
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    thread::sleep(Duration::from_millis(50));
                }
                Err(e) => {
                    log::debug!("[constellation-chp-accept] accept error: {e}");
                    thread::sleep(Duration::from_millis(50));
                }
            }
        }
    }

    fn send_loop(shared: Arc<Shared>, wake: Arc<(Mutex<bool>, Condvar)>, running: Arc<AtomicBool>) {
        while running.load(Ordering::Relaxed) {
            let interval = Duration::from_millis(u64::from(shared.interval_ms.load(Ordering::Relaxed)));
            Self::broadcast_one(&shared);

            let (lock, cvar) = &*wake;
            let mut woken = lock.lock();
            if !*woken {
                let _ = cvar.wait_for(&mut woken, interval);
            }
            *woken = false;
        }
    }

    fn broadcast_one(shared: &Arc<Shared>) {
        let beacon = Beacon {
            sender: shared.sender_name.clone(),
            wall_clock: SystemTime::now(),
            state_code: shared.state_code.load(Ordering::Relaxed) as u8,
            interval_ms: shared.interval_ms.load(Ordering::Relaxed),
            reason: shared.reason.lock().clone(),
        };
        let bytes = beacon.encode();
        let len = bytes.len() as u32;

        let mut subs = shared.subscribers.lock();
        subs.retain_mut(|stream| {
            let write_ok = stream.write_all(&len.to_le_bytes()).and_then(|_| stream.write_all(&bytes));
            write_ok.is_ok()
        });
    }

    /// Stop both threads. Subscribers observe a closed connection, which
    /// their own watchdog interprets the same way as a string of missed
    /// beats.
    pub fn shutdown(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        self.wake_sender();
        if let Some(handle) = self.send_handle.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.accept_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for HeartbeatSender {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        self.wake_sender();
        if let Some(handle) = self.send_handle.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.accept_handle.take() {
            let _ = handle.join();
        }
    }
}
