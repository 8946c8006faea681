// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! CHIRP service: ties the broadcast socket, the registry, and off-path
//! callback dispatch together (spec.md §4.1).

use crate::callback::{Dispatcher, DispatcherHandle, DiscoveryCallback};
use crate::registry::{ServiceEntry, ServiceRegistry};
use crate::socket::{bind_broadcast, broadcast_target, CHIRP_PORT};
use constellation_proto::{ChirpMessage, Digest16, MsgType, ServiceKind, CHIRP_DATAGRAM_LEN};
use parking_lot::{Mutex, RwLock};
use std::io::ErrorKind;
use std::net::{IpAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Poll interval for the receive loop's stop-flag check, via socket read
/// timeout. Short enough that `shutdown()` returns promptly.
const POLL_TIMEOUT: Duration = Duration::from_millis(200);

struct Registrant {
    kind: ServiceKind,
    callback: DiscoveryCallback,
}

/// CHIRP discovery service for one local process: advertises its own
/// services, tracks remote ones, and dispatches transition callbacks.
pub struct ChirpService {
    socket: Arc<UdpSocket>,
    group_hash: Digest16,
    own_host_hash: Digest16,
    advertised: Arc<RwLock<Vec<(ServiceKind, u16)>>>,
    registry: Arc<Mutex<ServiceRegistry>>,
    registrants: Arc<RwLock<Vec<Registrant>>>,
    dispatcher: Dispatcher,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl ChirpService {
    /// Bind and start the receive loop. `canonical_name` and `group` seed
    /// the host- and group-hashes used to filter traffic (spec.md §6).
    pub fn start(canonical_name: &str, group: &str, bind_addr: IpAddr) -> std::io::Result<Self> {
        let socket = bind_broadcast(bind_addr, CHIRP_PORT)?;
        socket.set_read_timeout(Some(POLL_TIMEOUT))?;
        let socket = Arc::new(socket);

        let group_hash = Digest16::of_group(group);
        let own_host_hash = Digest16::of_canonical_name(canonical_name);
        let registry = Arc::new(Mutex::new(ServiceRegistry::new()));
        let registrants: Arc<RwLock<Vec<Registrant>>> = Arc::new(RwLock::new(Vec::new()));
        let advertised: Arc<RwLock<Vec<(ServiceKind, u16)>>> = Arc::new(RwLock::new(Vec::new()));
        let dispatcher = Dispatcher::start();
        let running = Arc::new(AtomicBool::new(true));

        let socket_clone = socket.clone();
        let registry_clone = registry.clone();
        let registrants_clone = registrants.clone();
        let advertised_clone = advertised.clone();
        let running_clone = running.clone();
        let dispatcher_handle = dispatcher.handle();

        let handle = thread::Builder::new()
            .name("constellation-chirp-rx".to_string())
            .spawn(move || {
                Self::run_loop(
                    socket_clone,
                    group_hash,
                    own_host_hash,
                    registry_clone,
                    registrants_clone,
                    dispatcher_handle,
                    advertised_clone,
                    running_clone,
                );
            })?;

        Ok(Self {
            socket,
            group_hash,
            own_host_hash,
            advertised,
            registry,
            registrants,
            dispatcher,
            running,
            handle: Some(handle),
        })
    }

    /// Advertise a locally offered service and immediately announce it
    /// (one OFFER, spec.md §4.1 "On start it emits one OFFER per
    /// advertised service").
    pub fn advertise(&self, kind: ServiceKind, port: u16) -> std::io::Result<()> {
        self.advertised.write().push((kind, port));
        self.send(MsgType::Offer, kind, port)
    }

    /// Broadcast a REQUEST for the group (spec.md §4.1 "and one REQUEST").
    pub fn send_request(&self) -> std::io::Result<()> {
        self.send(MsgType::Request, ServiceKind::Control, 0)
    }

    /// Register interest in a service kind; `callback` fires (off the
    /// receive path) on every add/depart transition for that kind.
    pub fn register_interest(&self, kind: ServiceKind, callback: DiscoveryCallback) {
        self.registrants.write().push(Registrant { kind, callback });
    }

    /// Current remote services of a given kind.
    pub fn services_of_kind(&self, kind: ServiceKind) -> Vec<ServiceEntry> {
        self.registry.lock().services_of_kind(kind)
    }

    fn send(&self, msg_type: MsgType, kind: ServiceKind, port: u16) -> std::io::Result<()> {
        let msg = ChirpMessage { msg_type, group_hash: self.group_hash, host_hash: self.own_host_hash, service_kind: kind, port };
        let target = broadcast_target(CHIRP_PORT);
        self.socket.send_to(&msg.encode(), target)?;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn run_loop(
        socket: Arc<UdpSocket>,
        group_hash: Digest16,
        own_host_hash: Digest16,
        registry: Arc<Mutex<ServiceRegistry>>,
        registrants: Arc<RwLock<Vec<Registrant>>>,
        dispatcher: DispatcherHandle,
        advertised: Arc<RwLock<Vec<(ServiceKind, u16)>>>,
        running: Arc<AtomicBool>,
    ) {
        let mut buf = [0u8; CHIRP_DATAGRAM_LEN];
        while running.load(Ordering::Relaxed) {
            let (len, _src) = match socket.recv_from(&mut buf) {
                Ok(result) => result,
                Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => continue,
                Err(e) => {
                    log::debug!("[constellation-chirp-rx] recv_from error: {e}");
                    continue;
                }
            };

            let msg = match ChirpMessage::decode(&buf[..len]) {
                Ok(msg) => msg,
                Err(e) => {
                    log::trace!("[constellation-chirp-rx] dropping malformed datagram: {e}");
                    continue;
                }
            };

            if msg.group_hash != group_hash {
                continue;
            }
            if msg.host_hash == own_host_hash {
                continue;
            }

            match msg.msg_type {
                MsgType::Request => {
                    // Reply with one OFFER per locally advertised service
                    // (spec.md §4.1 "On receiving a REQUEST matching its
                    // group, it replies with one OFFER per service").
                    for (kind, port) in advertised.read().iter() {
                        let reply =
                            ChirpMessage { msg_type: MsgType::Offer, group_hash, host_hash: own_host_hash, service_kind: *kind, port: *port };
                        if let Err(e) = socket.send_to(&reply.encode(), broadcast_target(CHIRP_PORT)) {
                            log::debug!("[constellation-chirp-rx] failed to reply to REQUEST: {e}");
                        }
                    }
                }
                MsgType::Offer => {
                    let transition = registry.lock().offer(msg.host_hash, _src.ip(), msg.port, msg.service_kind);
                    if let Some(transition) = transition {
                        let entry = ServiceEntry {
                            host_hash: msg.host_hash,
                            address: _src.ip(),
                            port: msg.port,
                            kind: msg.service_kind,
                            last_seen: std::time::Instant::now(),
                        };
                        Self::dispatch_transition(&registrants, &dispatcher, msg.service_kind, transition, entry);
                    }
                }
                MsgType::Depart => {
                    if let Some(transition) = registry.lock().depart(msg.host_hash, msg.service_kind) {
                        let entry = ServiceEntry {
                            host_hash: msg.host_hash,
                            address: _src.ip(),
                            port: msg.port,
                            kind: msg.service_kind,
                            last_seen: std::time::Instant::now(),
                        };
                        Self::dispatch_transition(&registrants, &dispatcher, msg.service_kind, transition, entry);
                    }
                }
            }
        }
    }

    fn dispatch_transition(
        registrants: &Arc<RwLock<Vec<Registrant>>>,
        dispatcher: &DispatcherHandle,
        kind: ServiceKind,
        transition: crate::registry::Transition,
        entry: ServiceEntry,
    ) {
        for reg in registrants.read().iter().filter(|r| r.kind == kind) {
            dispatcher.dispatch(reg.callback.clone(), transition, entry.clone());
        }
    }

    /// Announce DEPART for every locally advertised service, then stop
    /// the receive loop and dispatcher.
    pub fn shutdown(&mut self) {
        for (kind, port) in self.advertised.read().iter() {
            let _ = self.send(MsgType::Depart, *kind, *port);
        }
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        self.dispatcher.shutdown();
    }
}

impl Drop for ChirpService {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
