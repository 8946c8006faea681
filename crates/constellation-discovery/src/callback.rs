// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Off-receive-path callback dispatch (spec.md §4.1: "Callbacks must be
//! non-blocking; implementations must dispatch them off the receive path").

use crate::registry::{ServiceEntry, Transition};
use crossbeam::channel::{bounded, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// A registrant's callback: invoked once per added/departed transition.
pub type DiscoveryCallback = Arc<dyn Fn(Transition, &ServiceEntry) + Send + Sync>;

struct DispatchItem {
    transition: Transition,
    entry: ServiceEntry,
    callback: DiscoveryCallback,
}

/// Runs registered callbacks on a dedicated thread, decoupled from the
/// CHIRP receive loop. Modelled on `hdds`'s `MulticastListener`, which
/// spawns a single named thread reading a bounded queue and never calls
/// user code from the socket-receive path.
pub struct Dispatcher {
    tx: Option<Sender<DispatchItem>>,
    handle: Option<JoinHandle<()>>,
}

/// A cheaply cloneable handle for queueing callback invocations from any
/// thread (e.g. the CHIRP receive loop), without owning the dispatch
/// thread's lifecycle.
#[derive(Clone)]
pub struct DispatcherHandle {
    tx: Sender<DispatchItem>,
}

impl DispatcherHandle {
    /// Queue one callback invocation. Never blocks the receive path for
    /// longer than it takes to push onto the bounded channel; if the
    /// dispatcher is behind, `send` applies mild backpressure rather than
    /// dropping, since discovery traffic is low-rate.
    pub fn dispatch(&self, callback: DiscoveryCallback, transition: Transition, entry: ServiceEntry) {
        let _ = self.tx.send(DispatchItem { transition, entry, callback });
    }
}

impl Dispatcher {
    pub fn start() -> Self {
        let (tx, rx): (Sender<DispatchItem>, Receiver<DispatchItem>) = bounded(256);
        let handle = thread::Builder::new()
            .name("constellation-chirp-dispatch".to_string())
            .spawn(move || Self::run(rx))
            .expect("failed to spawn CHIRP dispatch thread");
        Self { tx: Some(tx), handle: Some(handle) }
    }

    fn run(rx: Receiver<DispatchItem>) {
        while let Ok(item) = rx.recv() {
            (item.callback)(item.transition, &item.entry);
        }
    }

    /// Obtain a cloneable handle for use from other threads.
    pub fn handle(&self) -> DispatcherHandle {
        DispatcherHandle { tx: self.tx.clone().expect("dispatcher already shut down") }
    }

    /// Queue one callback invocation directly.
    pub fn dispatch(&self, callback: DiscoveryCallback, transition: Transition, entry: ServiceEntry) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(DispatchItem { transition, entry, callback });
        }
    }

    /// Drop the sender (unblocking the dispatch thread's `recv()`) and
    /// join it. Safe to call multiple times.
    pub fn shutdown(&mut self) {
        self.tx.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ServiceEntry;
    use constellation_proto::{Digest16, ServiceKind};
    use std::net::{IpAddr, Ipv4Addr};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, Instant};

    #[test]
    fn callback_runs_off_the_calling_thread() {
        let dispatcher = Dispatcher::start();
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();
        let callback: DiscoveryCallback = Arc::new(move |_t, _e| {
            counter_clone.fetch_add(1, Ordering::SeqCst);
        });
        let entry = ServiceEntry {
            host_hash: Digest16::of_canonical_name("Sensor.a"),
            address: IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)),
            port: 9000,
            kind: ServiceKind::Control,
            last_seen: Instant::now(),
        };
        dispatcher.dispatch(callback, Transition::Added, entry);
        thread::sleep(Duration::from_millis(50));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
