// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Command responder: accepts CSCP connections and dispatches one request
//! at a time per connection (spec.md §4.3, §6 "one request in flight per
//! socket"). Modelled on `AdminApi`'s accept-loop/per-connection-thread
//! split, generalized from a fixed JSON command set to verb dispatch.

use crate::core::Satellite;
use crate::dispatch::handle_request;
use constellation_proto::Message;
use socket2::{Domain, Protocol, Socket, Type};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

const POLL_TIMEOUT: Duration = Duration::from_millis(200);

pub struct CommandResponder {
    local_addr: SocketAddr,
    running: Arc<AtomicBool>,
    accept_handle: Option<JoinHandle<()>>,
}

impl CommandResponder {
    pub fn bind(satellite: Arc<Satellite>, bind_addr: SocketAddr) -> std::io::Result<Self> {
        let domain = if bind_addr.is_ipv4() { Domain::IPV4 } else { Domain::IPV6 };
        let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;
        socket.set_reuse_address(true)?;
        socket.bind(&bind_addr.into())?;
        socket.listen(128)?;
        let listener: TcpListener = socket.into();
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        let running = Arc::new(AtomicBool::new(true));
        let running_clone = running.clone();
        let accept_handle = thread::Builder::new()
            .name("constellation-cscp-accept".to_string())
            .spawn(move || accept_loop(listener, satellite, running_clone))?;

        Ok(Self { local_addr, running, accept_handle: Some(accept_handle) })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn shutdown(mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.accept_handle.take() {
            let _ = handle.join();
        }
    }
}

fn accept_loop(listener: TcpListener, satellite: Arc<Satellite>, running: Arc<AtomicBool>) {
    while running.load(Ordering::Relaxed) {
        match listener.accept() {
            Ok((stream, _addr)) => {
                let _ = stream.set_nonblocking(false);
                let _ = stream.set_nodelay(true);
                let satellite = satellite.clone();
                let running = running.clone();
                thread::spawn(move || handle_connection(stream, satellite, running));
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                thread::sleep(POLL_TIMEOUT);
            }
            Err(e) => {
                log::debug!("[constellation-cscp-accept] accept error: {e}");
                thread::sleep(POLL_TIMEOUT);
            }
        }
    }
}

fn handle_connection(mut stream: TcpStream, satellite: Arc<Satellite>, running: Arc<AtomicBool>) {
    while running.load(Ordering::Relaxed) {
        let request = match Message::read_from(&mut stream) {
            Ok(msg) => msg,
            Err(e) => {
                log::trace!("[constellation-cscp] dropping connection: {e}");
                break;
            }
        };
        let response = handle_request(&satellite, request);
        if response.write_to(&mut stream).is_err() {
            break;
        }
    }
}
