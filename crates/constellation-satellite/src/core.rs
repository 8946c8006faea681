// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The satellite runtime (spec.md §4.6): owns the FSM, command registry,
//! heartbeat sender, discovery advertisement and command responder for one
//! satellite process.

use crate::metrics::MetricsPublisher;
use crate::responder::CommandResponder;
use constellation_discovery::ChirpService;
use constellation_fsm::{CommandRegistry, Fsm, SatelliteHooks};
use constellation_heartbeat::HeartbeatSender;
use constellation_proto::ServiceKind;
use constellation_value::{CanonicalName, Configuration, KeyFilter, NameError, Value};
use parking_lot::Mutex;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SatelliteError {
    #[error("invalid canonical name: {0}")]
    Name(#[from] NameError),
    #[error("bind/connect failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Everything a satellite process owns, shared between the command
/// responder thread, the heartbeat sender, and discovery.
pub struct Satellite {
    pub(crate) name: CanonicalName,
    pub(crate) version: String,
    pub(crate) fsm: Arc<Fsm>,
    pub(crate) registry: Mutex<CommandRegistry>,
    pub(crate) status: Mutex<String>,
    pub(crate) shutdown_requested: AtomicBool,
    heartbeat: Mutex<Option<HeartbeatSender>>,
    discovery: Mutex<Option<ChirpService>>,
    responder: Mutex<Option<CommandResponder>>,
    metrics: Mutex<Option<MetricsPublisher>>,
}

impl Satellite {
    /// Build a satellite in `NEW`, with hooks and a (possibly empty)
    /// command registry wired up. Nothing is bound yet; call `start`.
    pub fn new(
        satellite_type: &str,
        satellite_name: &str,
        version: impl Into<String>,
        hooks: SatelliteHooks,
        registry: CommandRegistry,
    ) -> Result<Arc<Self>, SatelliteError> {
        let name = CanonicalName::new(satellite_type, satellite_name)?;
        let fsm = Fsm::new(hooks);
        Ok(Arc::new(Self {
            name,
            version: version.into(),
            fsm,
            registry: Mutex::new(registry),
            status: Mutex::new(String::new()),
            shutdown_requested: AtomicBool::new(false),
            heartbeat: Mutex::new(None),
            discovery: Mutex::new(None),
            responder: Mutex::new(None),
            metrics: Mutex::new(None),
        }))
    }

    pub fn canonical_name(&self) -> String {
        self.name.to_string()
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn fsm(&self) -> &Arc<Fsm> {
        &self.fsm
    }

    /// No-argument hook for subclasses to set human-readable progress,
    /// surfaced via `get_status` (spec.md §4.6).
    pub fn submit_status(&self, status: impl Into<String>) {
        *self.status.lock() = status.into();
    }

    pub fn status(&self) -> String {
        self.status.lock().clone()
    }

    /// Merged effective configuration at the last successful
    /// `initialize`/`reconfigure`, filtered per `filter`.
    pub fn config_filtered(&self, filter: KeyFilter) -> String {
        self.fsm.config().to_string_filtered(filter)
    }

    pub fn config(&self) -> Configuration {
        self.fsm.config()
    }

    /// Opt in to the `reconfigure` verb (spec.md §4.6 `support_reconfigure`).
    pub fn support_reconfigure(&self, supported: bool) {
        self.fsm.set_reconfigure_supported(supported);
    }

    /// Bind the command responder, heartbeat sender, and advertise
    /// `CONTROL`/`HEARTBEAT` (plus `MONITORING`/`DATA` if the caller has
    /// already bound sockets for them elsewhere) over CHIRP.
    pub fn start(self: &Arc<Self>, group: &str, bind_addr: IpAddr) -> Result<(), SatelliteError> {
        let responder = CommandResponder::bind(self.clone(), SocketAddr::new(bind_addr, 0))?;
        let command_port = responder.local_addr().port();
        *self.responder.lock() = Some(responder);

        let heartbeat = HeartbeatSender::bind(&self.canonical_name(), SocketAddr::new(bind_addr, 0), self.fsm.state().code())?;
        let heartbeat_port = heartbeat.local_addr().port();
        *self.heartbeat.lock() = Some(heartbeat);

        let this = self.clone();
        self.fsm.add_observer(Box::new(move |_prev, new| {
            if let Some(hb) = this.heartbeat.lock().as_ref() {
                hb.announce_state(new.code(), this.last_failure_reason_if_error(new));
            }
        }));

        let metrics = MetricsPublisher::bind(&self.canonical_name(), SocketAddr::new(bind_addr, 0))?;
        let metrics_port = metrics.local_addr().port();
        *self.metrics.lock() = Some(metrics);

        let discovery = ChirpService::start(&self.canonical_name(), group, bind_addr)?;
        discovery.advertise(ServiceKind::Control, command_port)?;
        discovery.advertise(ServiceKind::Heartbeat, heartbeat_port)?;
        discovery.advertise(ServiceKind::Monitoring, metrics_port)?;
        *self.discovery.lock() = Some(discovery);

        Ok(())
    }

    /// Push one metric sample to every subscribed controller (spec.md §1:
    /// "metric-based measurement gating"). A no-op before `start` has
    /// bound the metrics publisher.
    pub fn publish_metric(&self, metric: &str, value: Value) {
        if let Some(publisher) = self.metrics.lock().as_ref() {
            publisher.publish(metric, value);
        }
    }

    fn last_failure_reason_if_error(&self, new: constellation_fsm::State) -> Option<String> {
        if new == constellation_fsm::State::Error {
            self.fsm.last_failure_reason()
        } else {
            None
        }
    }

    /// Tear down all background threads; `shutdown()` on the command
    /// responder is never called from within a request it is itself
    /// serving (the responder signals `shutdown_requested` and returns,
    /// the driving binary calls this afterwards).
    pub fn shutdown(&self) {
        if let Some(mut discovery) = self.discovery.lock().take() {
            discovery.shutdown();
        }
        if let Some(mut heartbeat) = self.heartbeat.lock().take() {
            heartbeat.shutdown();
        }
        if let Some(responder) = self.responder.lock().take() {
            responder.shutdown();
        }
        if let Some(mut metrics) = self.metrics.lock().take() {
            metrics.shutdown();
        }
        self.fsm.shutdown();
    }

    pub fn shutdown_requested(&self) -> bool {
        self.shutdown_requested.load(Ordering::Relaxed)
    }
}
