// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The controller runtime (spec.md §4.7): discovers satellites over CHIRP,
//! opens a command connection and a heartbeat subscription to each, keeps a
//! canonical-name-keyed peer map, and aggregates group state.
//!
//! `CONTROL` and `HEARTBEAT` offers for the same satellite carry the same
//! host-hash but arrive independently and in either order, and the
//! canonical name is only learned once the command connection is primed.
//! `pending` correlates the two by host-hash until both are known.

use crate::aggregation::{global_state, lowest_state, Aggregator, GlobalState, LeavingCallback, ReachedCallback};
use crate::metrics::MetricSubscriber;
use crate::peer::{Peer, PeerError};
use constellation_discovery::{ChirpService, Transition as DiscoveryTransition};
use constellation_fsm::State;
use constellation_heartbeat::{HeartbeatWatchdog, PeerEvent, WatchdogCallback};
use constellation_proto::{Digest16, Message, ServiceKind};
use constellation_value::{Dictionary, Value};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr, TcpStream};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("no known peer named '{0}'")]
    UnknownPeer(String),
    #[error("peer '{0}' has not advertised a monitoring endpoint yet")]
    NoMonitoringEndpoint(String),
}

#[derive(Default)]
struct Pending {
    heartbeat_addr: Option<SocketAddr>,
    monitoring_addr: Option<SocketAddr>,
    peer: Option<Arc<Peer>>,
}

struct Shared {
    peers: Arc<RwLock<HashMap<String, Arc<Peer>>>>,
    pending: Mutex<HashMap<Digest16, Pending>>,
    watchdog: Mutex<HeartbeatWatchdog>,
}

impl Shared {
    /// Subscribe a primed peer's heartbeat stream if we already know its
    /// address; otherwise this is a no-op until the `HEARTBEAT` offer
    /// arrives.
    fn try_subscribe(&self, host_hash: Digest16, peer: &Arc<Peer>) {
        let addr = self.pending.lock().get(&host_hash).and_then(|p| p.heartbeat_addr);
        let Some(addr) = addr else { return };
        if let Ok(stream) = TcpStream::connect(addr) {
            let _ = stream.set_nodelay(true);
            peer.set_heartbeat_addr(addr);
            self.watchdog.lock().track(peer.name.clone(), stream);
        }
    }

    /// Record a primed peer's monitoring address if we already know it;
    /// otherwise this is a no-op until the `MONITORING` offer arrives.
    /// Unlike `try_subscribe`, nothing connects eagerly here: a CMDP
    /// connection is only opened once something asks for a metric
    /// (`Controller::subscribe_metric`).
    fn try_attach_monitoring(&self, host_hash: Digest16, peer: &Arc<Peer>) {
        let addr = self.pending.lock().get(&host_hash).and_then(|p| p.monitoring_addr);
        if let Some(addr) = addr {
            peer.set_monitoring_addr(addr);
        }
    }

    /// A CHIRP `DEPART` for either of a satellite's services removes its
    /// peer immediately rather than waiting out the heartbeat watchdog's
    /// missed-beat grace period (spec.md §4.7: "DEPART or heartbeat-lost
    /// removes the Peer and closes its socket").
    fn handle_departed(&self, host_hash: Digest16) {
        let peer = self.pending.lock().remove(&host_hash).and_then(|p| p.peer);
        let Some(peer) = peer else { return };
        self.peers.write().remove(&peer.name);
        self.watchdog.lock().untrack(&peer.name);
        peer.close();
    }
}

/// Owns the discovered-peer map, state aggregation and the
/// discovery/heartbeat plumbing that keeps it current.
pub struct Controller {
    group: String,
    shared: Arc<Shared>,
    discovery: ChirpService,
    aggregator: Aggregator,
}

impl Controller {
    /// Start CHIRP discovery for `group` and register interest in
    /// `CONTROL`/`HEARTBEAT` services. `reached`/`leaving` are the group's
    /// state-aggregation callbacks (spec.md §4.7 `reached_state`/
    /// `leaving_state`), invoked once for the lowest-state aggregate and
    /// once for the all-peers-unique aggregate.
    pub fn start(group: &str, bind_addr: IpAddr, reached: ReachedCallback, leaving: LeavingCallback) -> Result<Self, ControllerError> {
        let peers: Arc<RwLock<HashMap<String, Arc<Peer>>>> = Arc::new(RwLock::new(HashMap::new()));

        let watchdog_peers = peers.clone();
        let watchdog_callback: WatchdogCallback = Arc::new(move |event| match event {
            PeerEvent::Beat(beacon) => {
                if let Some(state) = State::from_code(beacon.state_code) {
                    if let Some(peer) = watchdog_peers.read().get(&beacon.sender) {
                        peer.set_state(state);
                    }
                }
            }
            PeerEvent::Lost { peer } => {
                watchdog_peers.write().remove(&peer);
            }
        });

        let shared = Arc::new(Shared {
            peers,
            pending: Mutex::new(HashMap::new()),
            watchdog: Mutex::new(HeartbeatWatchdog::start(watchdog_callback)),
        });

        let discovery = ChirpService::start("Controller", group, bind_addr)?;

        let control_shared = shared.clone();
        discovery.register_interest(
            ServiceKind::Control,
            Arc::new(move |transition, entry| {
                if transition == DiscoveryTransition::Departed {
                    control_shared.handle_departed(entry.host_hash);
                    return;
                }
                let command_addr = SocketAddr::new(entry.address, entry.port);
                match Peer::connect(command_addr) {
                    Ok(peer) => {
                        let peer = Arc::new(peer);
                        let name = peer.name.clone();
                        {
                            let mut peers = control_shared.peers.write();
                            if peers.contains_key(&name) {
                                log::warn!("[constellation-controller] duplicate canonical name '{name}', ignoring new peer");
                                return;
                            }
                            peers.insert(name, peer.clone());
                        }
                        control_shared.pending.lock().entry(entry.host_hash).or_default().peer = Some(peer.clone());
                        control_shared.try_subscribe(entry.host_hash, &peer);
                        control_shared.try_attach_monitoring(entry.host_hash, &peer);
                    }
                    Err(e) => log::warn!("[constellation-controller] failed to connect to newly offered peer at {command_addr}: {e}"),
                }
            }),
        );

        let heartbeat_shared = shared.clone();
        discovery.register_interest(
            ServiceKind::Heartbeat,
            Arc::new(move |transition, entry| {
                if transition == DiscoveryTransition::Departed {
                    heartbeat_shared.handle_departed(entry.host_hash);
                    return;
                }
                let addr = SocketAddr::new(entry.address, entry.port);
                let existing_peer = {
                    let mut pending = heartbeat_shared.pending.lock();
                    let slot = pending.entry(entry.host_hash).or_default();
                    slot.heartbeat_addr = Some(addr);
                    slot.peer.clone()
                };
                if let Some(peer) = existing_peer {
                    heartbeat_shared.try_subscribe(entry.host_hash, &peer);
                }
            }),
        );

        let monitoring_shared = shared.clone();
        discovery.register_interest(
            ServiceKind::Monitoring,
            Arc::new(move |transition, entry| {
                if transition == DiscoveryTransition::Departed {
                    monitoring_shared.handle_departed(entry.host_hash);
                    return;
                }
                let addr = SocketAddr::new(entry.address, entry.port);
                let existing_peer = {
                    let mut pending = monitoring_shared.pending.lock();
                    let slot = pending.entry(entry.host_hash).or_default();
                    slot.monitoring_addr = Some(addr);
                    slot.peer.clone()
                };
                if let Some(peer) = existing_peer {
                    peer.set_monitoring_addr(addr);
                }
            }),
        );

        discovery.send_request()?;

        let agg_shared = shared.clone();
        let aggregator = Aggregator::start(
            move || agg_shared.peers.read().values().map(|p| p.state()).collect(),
            reached,
            leaving,
        );

        Ok(Self { group: group.to_string(), shared, discovery, aggregator })
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn peer_names(&self) -> Vec<String> {
        self.shared.peers.read().keys().cloned().collect()
    }

    pub fn lowest_state(&self) -> Option<State> {
        lowest_state(&self.shared.peers.read().values().map(|p| p.state()).collect::<Vec<_>>())
    }

    pub fn global_state(&self) -> Option<GlobalState> {
        global_state(&self.shared.peers.read().values().map(|p| p.state()).collect::<Vec<_>>())
    }

    /// Send the same command to every currently known peer, returning each
    /// peer's name paired with its reply (or the connection error).
    pub fn broadcast(&self, verb: &str, payload: Value) -> Vec<(String, Result<Message, PeerError>)> {
        self.shared.peers.read().iter().map(|(name, peer)| (name.clone(), peer.send_command(verb, payload.clone()))).collect()
    }

    /// Send a command to one named peer.
    pub fn send_to(&self, name: &str, verb: &str, payload: Value) -> Option<Result<Message, PeerError>> {
        self.shared.peers.read().get(name).map(|peer| peer.send_command(verb, payload))
    }

    /// `broadcast`'s dictionary-payload counterpart, for `initialize`/
    /// `reconfigure`.
    pub fn broadcast_dict(&self, verb: &str, payload: &Dictionary) -> Vec<(String, Result<Message, PeerError>)> {
        self.shared.peers.read().iter().map(|(name, peer)| (name.clone(), peer.send_dict_command(verb, payload))).collect()
    }

    /// Open a CMDP connection to a named peer's advertised monitoring
    /// endpoint, for metric-based measurement gating (spec.md §1, §4.7).
    /// Each call opens a fresh connection; callers that poll a metric
    /// repeatedly (e.g. `MetricCondition`) should hold onto the returned
    /// subscriber rather than calling this per check.
    pub fn subscribe_metric(&self, remote: &str) -> Result<MetricSubscriber, ControllerError> {
        let peer = self.shared.peers.read().get(remote).cloned().ok_or_else(|| ControllerError::UnknownPeer(remote.to_string()))?;
        let addr = peer.monitoring_addr().ok_or_else(|| ControllerError::NoMonitoringEndpoint(remote.to_string()))?;
        Ok(MetricSubscriber::connect(addr)?)
    }

    pub fn shutdown(mut self) {
        self.discovery.shutdown();
        self.shared.watchdog.lock().shutdown();
        self.aggregator.shutdown();
    }
}
