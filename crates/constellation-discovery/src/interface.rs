// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Resolving `--interface <cidr-or-name>` (spec.md §6) to a concrete local
//! bind address. Modelled on `hdds::transport::filter::Ipv4Network`'s
//! hand-rolled CIDR parsing, extended with by-name lookup via
//! `local_ip_address`.

use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InterfaceError {
    #[error("invalid CIDR format (expected x.x.x.x/y): {0}")]
    InvalidFormat(String),
    #[error("invalid IP address in CIDR: {0}")]
    InvalidAddress(String),
    #[error("invalid CIDR prefix length (must be 0-32): {0}")]
    InvalidPrefix(String),
    #[error("no local interface matches \"{0}\"")]
    NoMatch(String),
    #[error("failed to enumerate local network interfaces: {0}")]
    Enumeration(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Ipv4Cidr {
    network: Ipv4Addr,
    mask: u32,
}

impl Ipv4Cidr {
    fn contains(&self, ip: Ipv4Addr) -> bool {
        (u32::from(ip) & self.mask) == (u32::from(self.network) & self.mask)
    }
}

impl FromStr for Ipv4Cidr {
    type Err = InterfaceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr_part, prefix_part) = s.split_once('/').ok_or_else(|| InterfaceError::InvalidFormat(s.to_string()))?;
        let addr: Ipv4Addr = addr_part.parse().map_err(|_| InterfaceError::InvalidAddress(addr_part.to_string()))?;
        let prefix_len: u8 = prefix_part.parse().map_err(|_| InterfaceError::InvalidPrefix(prefix_part.to_string()))?;
        if prefix_len > 32 {
            return Err(InterfaceError::InvalidPrefix(prefix_part.to_string()));
        }
        let mask = if prefix_len == 0 { 0 } else { !0u32 << (32 - prefix_len) };
        Ok(Self { network: Ipv4Addr::from(u32::from(addr) & mask), mask })
    }
}

/// Resolve `--interface` to a bind address. `None` (flag unset) means "all
/// interfaces", i.e. `0.0.0.0`. A value containing `/` is parsed as a CIDR
/// and matched against the host's local interface addresses; anything else
/// is treated as an interface name.
pub fn resolve(interface: Option<&str>) -> Result<IpAddr, InterfaceError> {
    let Some(spec) = interface else {
        return Ok(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
    };

    if spec.contains('/') {
        let cidr: Ipv4Cidr = spec.parse()?;
        let interfaces = local_interfaces()?;
        return interfaces
            .into_iter()
            .find(|(_, ip)| matches!(ip, IpAddr::V4(v4) if cidr.contains(*v4)))
            .map(|(_, ip)| ip)
            .ok_or_else(|| InterfaceError::NoMatch(spec.to_string()));
    }

    let interfaces = local_interfaces()?;
    interfaces.into_iter().find(|(name, _)| name == spec).map(|(_, ip)| ip).ok_or_else(|| InterfaceError::NoMatch(spec.to_string()))
}

fn local_interfaces() -> Result<Vec<(String, IpAddr)>, InterfaceError> {
    local_ip_address::list_afinet_netifas().map_err(|e| InterfaceError::Enumeration(e.to_string()))
}
