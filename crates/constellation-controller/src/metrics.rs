// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Metric subscription for measurement gating (spec.md §1, §4.7): a
//! reader thread per subscribed satellite decoding CMDP `StatMessage`
//! frames, caching the latest value seen for each metric name, matching
//! `HeartbeatWatchdog`'s one-reader-thread-per-peer shape.

use constellation_proto::StatMessage;
use constellation_value::Value;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io::Read;
use std::net::{SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

struct Shared {
    latest: Mutex<HashMap<String, Value>>,
}

/// One open CMDP connection to a satellite, caching the latest value of
/// every metric it has published since subscribing.
pub struct MetricSubscriber {
    shared: Arc<Shared>,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl MetricSubscriber {
    pub fn connect(addr: SocketAddr) -> std::io::Result<Self> {
        let mut stream = TcpStream::connect(addr)?;
        stream.set_nodelay(true)?;
        stream.set_read_timeout(Some(Duration::from_millis(200)))?;

        let shared = Arc::new(Shared { latest: Mutex::new(HashMap::new()) });
        let running = Arc::new(AtomicBool::new(true));

        let reader_shared = shared.clone();
        let reader_running = running.clone();
        let handle = thread::Builder::new()
            .name("constellation-cmdp-reader".to_string())
            .spawn(move || Self::read_loop(stream_take(&mut stream), reader_shared, reader_running))
            .expect("failed to spawn CMDP reader thread");

        Ok(Self { shared, running, handle: Some(handle) })
    }

    /// Latest value received for `metric`, if any sample has arrived yet.
    pub fn latest(&self, metric: &str) -> Option<Value> {
        self.shared.latest.lock().get(metric).cloned()
    }

    fn read_loop(mut stream: TcpStream, shared: Arc<Shared>, running: Arc<AtomicBool>) {
        while running.load(Ordering::Relaxed) {
            let mut len_buf = [0u8; 4];
            match stream.read_exact(&mut len_buf) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock || e.kind() == std::io::ErrorKind::TimedOut => continue,
                Err(_) => break,
            }
            let len = u32::from_le_bytes(len_buf) as usize;
            let mut body = vec![0u8; len];
            if stream.read_exact(&mut body).is_err() {
                break;
            }
            match StatMessage::decode(&body) {
                Ok(stat) => {
                    shared.latest.lock().insert(stat.metric, stat.value);
                }
                Err(e) => log::trace!("[constellation-cmdp-reader] dropping malformed stat message: {e}"),
            }
        }
    }

    pub fn shutdown(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for MetricSubscriber {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn stream_take(stream: &mut TcpStream) -> TcpStream {
    stream.try_clone().expect("failed to clone CMDP subscriber stream")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::net::{IpAddr, Ipv4Addr, TcpListener};

    #[test]
    fn subscriber_caches_latest_value_per_metric() {
        let listener = TcpListener::bind(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0)).unwrap();
        let addr = listener.local_addr().unwrap();

        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let stat = StatMessage {
                sender: "Sensor.a".into(),
                wall_clock: std::time::SystemTime::now(),
                metric: "TEMPERATURE".into(),
                value: Value::Double(21.5),
            };
            let bytes = stat.encode();
            stream.write_all(&(bytes.len() as u32).to_le_bytes()).unwrap();
            stream.write_all(&bytes).unwrap();
            thread::sleep(Duration::from_millis(300));
        });

        let mut subscriber = MetricSubscriber::connect(addr).unwrap();
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while subscriber.latest("TEMPERATURE").is_none() && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(20));
        }
        assert_eq!(subscriber.latest("TEMPERATURE"), Some(Value::Double(21.5)));

        subscriber.shutdown();
        server.join().unwrap();
    }
}
