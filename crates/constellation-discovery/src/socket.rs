// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! UDP broadcast socket setup for CHIRP (spec.md §4.1, §6).

use socket2::{Domain, Protocol, Socket, Type};
use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};

/// Well-known CHIRP port. Not fixed by the wire format itself (spec.md §6
/// only fixes the datagram layout); chosen once here and shared by every
/// sender/listener.
pub const CHIRP_PORT: u16 = 7123;

/// Bind a UDP socket for CHIRP broadcast: `SO_REUSEADDR` so multiple local
/// processes (e.g. a controller and satellites on the same host during
/// development) can share the port, and `SO_BROADCAST` so sends to the
/// subnet broadcast address are permitted. Modelled on
/// `hdds::admin::api::server::create_tcp_listener`'s `socket2`-based
/// construction, adapted from `Type::STREAM`/`listen` to `Type::DGRAM`.
pub fn bind_broadcast(bind_addr: IpAddr, port: u16) -> std::io::Result<UdpSocket> {
    let domain = match bind_addr {
        IpAddr::V4(_) => Domain::IPV4,
        IpAddr::V6(_) => Domain::IPV6,
    };
    let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket.set_broadcast(true)?;
    socket.set_nonblocking(false)?;
    let addr: SocketAddr = SocketAddr::new(bind_addr, port);
    socket.bind(&addr.into())?;
    Ok(socket.into())
}

/// Resolve the broadcast address for sends: `255.255.255.255` unless a
/// specific interface address was requested, in which case the host part
/// is set to all-ones (a conservative approximation of the subnet
/// broadcast address; `--interface` users on non-`/24`-ish networks should
/// rely on discovery still working via the limited broadcast address).
pub fn broadcast_target(port: u16) -> SocketAddr {
    SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::BROADCAST, port))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_any_interface_succeeds() {
        let socket = bind_broadcast(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0);
        assert!(socket.is_ok());
    }

    #[test]
    fn broadcast_target_uses_requested_port() {
        let target = broadcast_target(7123);
        assert_eq!(target.port(), 7123);
    }
}
