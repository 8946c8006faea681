// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Telemetry push for metric-based measurement gating (spec.md §1, §4.7).
//!
//! Push-on-publish rather than periodic, unlike `HeartbeatSender`: a
//! metric is only interesting when it changes, and the controller-side
//! `MetricCondition` just waits for the next matching sample rather than
//! polling a snapshot.

use constellation_proto::StatMessage;
use constellation_value::Value;
use parking_lot::Mutex;
use std::io::Write;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime};

struct Shared {
    sender_name: String,
    subscribers: Mutex<Vec<TcpStream>>,
}

/// Accepts CMDP subscribers and fans out `publish` calls to all of them.
pub struct MetricsPublisher {
    shared: Arc<Shared>,
    running: Arc<AtomicBool>,
    accept_handle: Option<JoinHandle<()>>,
    local_addr: SocketAddr,
}

impl MetricsPublisher {
    pub fn bind(sender_name: &str, bind_addr: SocketAddr) -> std::io::Result<Self> {
        let listener = TcpListener::bind(bind_addr)?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        let shared = Arc::new(Shared { sender_name: sender_name.to_string(), subscribers: Mutex::new(Vec::new()) });
        let running = Arc::new(AtomicBool::new(true));

        let accept_handle = {
            let shared = shared.clone();
            let running = running.clone();
            thread::Builder::new().name("constellation-cmdp-accept".to_string()).spawn(move || Self::accept_loop(listener, shared, running))?
        };

        Ok(Self { shared, running, accept_handle: Some(accept_handle), local_addr })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Push one metric sample to every currently connected subscriber.
    pub fn publish(&self, metric: &str, value: Value) {
        let message = StatMessage { sender: self.shared.sender_name.clone(), wall_clock: SystemTime::now(), metric: metric.to_string(), value };
        let bytes = message.encode();
        let len = bytes.len() as u32;

        let mut subs = self.shared.subscribers.lock();
        subs.retain_mut(|stream| {
            let write_ok = stream.write_all(&len.to_le_bytes()).and_then(|_| stream.write_all(&bytes));
            write_ok.is_ok()
        });
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
                    log::debug!("[constellation-cmdp-accept] accept error: {e}");
                    thread::sleep(Duration::from_millis(50));
                }
            }
        }
    }

    pub fn shutdown(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.accept_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for MetricsPublisher {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.accept_handle.take() {
            let _ = handle.join();
        }
    }
}
