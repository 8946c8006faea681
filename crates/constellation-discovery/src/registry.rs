// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Tracked state for remote services discovered via CHIRP (spec.md §4.1
//! "State tracked per remote service").

use constellation_proto::{Digest16, ServiceKind};
use std::net::IpAddr;
use std::time::Instant;

/// One remote service announcement.
#[derive(Debug, Clone)]
pub struct ServiceEntry {
    pub host_hash: Digest16,
    pub address: IpAddr,
    pub port: u16,
    pub kind: ServiceKind,
    pub last_seen: Instant,
}

/// A transition a registrant is notified of.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Added,
    Departed,
}

/// In-memory table of remote services, keyed by `(host-hash, kind)`.
///
/// OFFER inserts/refreshes; DEPART removes; absence of traffic is *not* a
/// removal condition (spec.md §4.1: "liveness is Heartbeat's job").
#[derive(Debug, Default)]
pub struct ServiceRegistry {
    entries: Vec<ServiceEntry>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn find(&self, host_hash: Digest16, kind: ServiceKind) -> Option<usize> {
        self.entries.iter().position(|e| e.host_hash == host_hash && e.kind == kind)
    }

    /// Insert or refresh an entry. Returns `Some(Transition::Added)` if
    /// this is a newly observed service, `None` if it was a refresh of an
    /// already-known one.
    pub fn offer(&mut self, host_hash: Digest16, address: IpAddr, port: u16, kind: ServiceKind) -> Option<Transition> {
        match self.find(host_hash, kind) {
            Some(idx) => {
                self.entries[idx].address = address;
                self.entries[idx].port = port;
                self.entries[idx].last_seen = Instant::now();
                None
            }
            None => {
                self.entries.push(ServiceEntry { host_hash, address, port, kind, last_seen: Instant::now() });
                Some(Transition::Added)
            }
        }
    }

    /// Remove an entry on DEPART. Returns `Some(Transition::Departed)` if
    /// something was actually removed.
    pub fn depart(&mut self, host_hash: Digest16, kind: ServiceKind) -> Option<Transition> {
        self.find(host_hash, kind).map(|idx| {
            self.entries.remove(idx);
            Transition::Departed
        })
    }

    pub fn services_of_kind(&self, kind: ServiceKind) -> Vec<ServiceEntry> {
        self.entries.iter().filter(|e| e.kind == kind).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn addr() -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
    }

    #[test]
    fn offer_of_new_service_reports_added() {
        let mut reg = ServiceRegistry::new();
        let hash = Digest16::of_canonical_name("Sensor.a");
        let transition = reg.offer(hash, addr(), 9000, ServiceKind::Control);
        assert_eq!(transition, Some(Transition::Added));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn offer_refresh_does_not_report_added_again() {
        let mut reg = ServiceRegistry::new();
        let hash = Digest16::of_canonical_name("Sensor.a");
        reg.offer(hash, addr(), 9000, ServiceKind::Control);
        let transition = reg.offer(hash, addr(), 9001, ServiceKind::Control);
        assert_eq!(transition, None);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn depart_removes_entry() {
        let mut reg = ServiceRegistry::new();
        let hash = Digest16::of_canonical_name("Sensor.a");
        reg.offer(hash, addr(), 9000, ServiceKind::Control);
        let transition = reg.depart(hash, ServiceKind::Control);
        assert_eq!(transition, Some(Transition::Departed));
        assert!(reg.is_empty());
    }

    #[test]
    fn depart_of_unknown_service_is_a_no_op() {
        let mut reg = ServiceRegistry::new();
        let hash = Digest16::of_canonical_name("Sensor.a");
        assert_eq!(reg.depart(hash, ServiceKind::Control), None);
    }
}
