// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Cancellation token for the RUN worker (spec.md §4.4, §5 "Cancellation").
//!
//! An `Arc<AtomicBool>` flag plus a `Condvar` so `stop`/`interrupt` can wake
//! a RUN routine blocked in a cooperative wait rather than only polling,
//! mirroring the stop-flag-plus-join pattern in the heartbeat watchdog.

use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
    wake: Arc<(Mutex<bool>, Condvar)>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self { cancelled: Arc::new(AtomicBool::new(false)), wake: Arc::new((Mutex::new(false), Condvar::new())) }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Set the flag and wake any waiter. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        let (lock, cvar) = &*self.wake;
        *lock.lock() = true;
        cvar.notify_all();
    }

    /// Sleep up to `timeout`, returning early if cancelled. User RUN code
    /// uses this instead of `thread::sleep` to stay responsive to `stop`/
    /// `interrupt`.
    pub fn wait_timeout(&self, timeout: Duration) {
        if self.is_cancelled() {
            return;
        }
        let (lock, cvar) = &*self.wake;
        let mut woken = lock.lock();
        if !*woken {
            let _ = cvar.wait_for(&mut woken, timeout);
        }
        *woken = false;
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}
