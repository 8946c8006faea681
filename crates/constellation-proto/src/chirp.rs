// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! CHIRP: the fixed 42-byte UDP discovery datagram (spec.md §4.1, §6).

use crate::cursor::{Cursor, CursorMut, SerError, SerResult};
use md5::{Digest, Md5};

/// Wire size of a CHIRP datagram.
pub const CHIRP_DATAGRAM_LEN: usize = 42;
const MAGIC: &[u8; 5] = b"CHIRP";
const VERSION: u8 = 1;

/// 16-byte MD5 digest of a group name or lower-cased canonical name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Digest16(pub [u8; 16]);

impl Digest16 {
    /// Group hashes are case-sensitive MD5 of the group name (spec.md §6).
    pub fn of_group(group: &str) -> Self {
        let mut hasher = Md5::new();
        hasher.update(group.as_bytes());
        Self(hasher.finalize().into())
    }

    /// Host hashes are MD5 of the canonical satellite name, lower-cased
    /// (spec.md §6).
    pub fn of_canonical_name(name: &str) -> Self {
        let mut hasher = Md5::new();
        hasher.update(name.to_ascii_lowercase().as_bytes());
        Self(hasher.finalize().into())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MsgType {
    Request,
    Offer,
    Depart,
}

impl MsgType {
    fn to_u8(self) -> u8 {
        match self {
            MsgType::Request => 1,
            MsgType::Offer => 2,
            MsgType::Depart => 3,
        }
    }
    fn from_u8(v: u8) -> Option<Self> {
        match v {
            1 => Some(MsgType::Request),
            2 => Some(MsgType::Offer),
            3 => Some(MsgType::Depart),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceKind {
    Control,
    Heartbeat,
    Monitoring,
    Data,
}

impl ServiceKind {
    fn to_u8(self) -> u8 {
        match self {
            ServiceKind::Control => 1,
            ServiceKind::Heartbeat => 2,
            ServiceKind::Monitoring => 3,
            ServiceKind::Data => 4,
        }
    }
    fn from_u8(v: u8) -> Option<Self> {
        match v {
            1 => Some(ServiceKind::Control),
            2 => Some(ServiceKind::Heartbeat),
            3 => Some(ServiceKind::Monitoring),
            4 => Some(ServiceKind::Data),
            _ => None,
        }
    }
}

/// A decoded CHIRP datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChirpMessage {
    pub msg_type: MsgType,
    pub group_hash: Digest16,
    pub host_hash: Digest16,
    pub service_kind: ServiceKind,
    pub port: u16,
}

impl ChirpMessage {
    pub fn encode(&self) -> [u8; CHIRP_DATAGRAM_LEN] {
        let mut buf = [0u8; CHIRP_DATAGRAM_LEN];
        let mut cursor = CursorMut::new(&mut buf);
        cursor.write_bytes(MAGIC).expect("fixed-size buffer");
        cursor.write_u8(VERSION).expect("fixed-size buffer");
        cursor.write_u8(self.msg_type.to_u8()).expect("fixed-size buffer");
        cursor.write_bytes(&self.group_hash.0).expect("fixed-size buffer");
        cursor.write_bytes(&self.host_hash.0).expect("fixed-size buffer");
        cursor.write_u8(self.service_kind.to_u8()).expect("fixed-size buffer");
        cursor.write_u16_be(self.port).expect("fixed-size buffer");
        buf
    }

    /// Decode a datagram. Malformed inputs (wrong length, bad magic,
    /// unsupported version, unknown enum byte, or `port == 0` in an
    /// `OFFER`) are errors, never a different valid value (spec.md §8
    /// round-trip property, §4.1 "Port=0 in an OFFER is a protocol
    /// error").
    pub fn decode(bytes: &[u8]) -> SerResult<Self> {
        if bytes.len() != CHIRP_DATAGRAM_LEN {
            return Err(SerError::InvalidData { reason: format!("expected {CHIRP_DATAGRAM_LEN} bytes, got {}", bytes.len()) });
        }
        let mut cursor = Cursor::new(bytes);
        let magic = cursor.read_bytes(5)?;
        if magic != MAGIC {
            return Err(SerError::InvalidData { reason: "bad CHIRP magic".into() });
        }
        let version = cursor.read_u8()?;
        if version != VERSION {
            return Err(SerError::InvalidData { reason: format!("unsupported CHIRP version {version}") });
        }
        let msg_type = MsgType::from_u8(cursor.read_u8()?)
            .ok_or_else(|| SerError::InvalidData { reason: "unknown CHIRP msg-type".into() })?;
        let mut group = [0u8; 16];
        group.copy_from_slice(cursor.read_bytes(16)?);
        let mut host = [0u8; 16];
        host.copy_from_slice(cursor.read_bytes(16)?);
        let service_kind = ServiceKind::from_u8(cursor.read_u8()?)
            .ok_or_else(|| SerError::InvalidData { reason: "unknown CHIRP service-kind".into() })?;
        let port = cursor.read_u16_be()?;

        if matches!(msg_type, MsgType::Offer) && port == 0 {
            return Err(SerError::InvalidData { reason: "OFFER with port 0".into() });
        }

        Ok(Self { msg_type, group_hash: Digest16(group), host_hash: Digest16(host), service_kind, port })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ChirpMessage {
        ChirpMessage {
            msg_type: MsgType::Offer,
            group_hash: Digest16::of_group("constellation"),
            host_hash: Digest16::of_canonical_name("Sensor.temp01"),
            service_kind: ServiceKind::Control,
            port: 50_000,
        }
    }

    #[test]
    fn datagram_is_exactly_42_bytes() {
        assert_eq!(sample().encode().len(), CHIRP_DATAGRAM_LEN);
    }

    #[test]
    fn round_trip_is_identity() {
        let msg = sample();
        let encoded = msg.encode();
        let decoded = ChirpMessage::decode(&encoded).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn host_hash_is_case_insensitive() {
        let a = Digest16::of_canonical_name("Sensor.Temp01");
        let b = Digest16::of_canonical_name("sensor.temp01");
        assert_eq!(a, b);
    }

    #[test]
    fn group_hash_is_case_sensitive() {
        let a = Digest16::of_group("Group");
        let b = Digest16::of_group("group");
        assert_ne!(a, b);
    }

    #[test]
    fn wrong_length_is_an_error_not_a_different_value() {
        let short = [0u8; 10];
        assert!(ChirpMessage::decode(&short).is_err());
    }

    #[test]
    fn bad_magic_is_rejected() {
        let mut encoded = sample().encode();
        encoded[0] = b'X';
        assert!(ChirpMessage::decode(&encoded).is_err());
    }

    #[test]
    fn offer_with_zero_port_is_a_protocol_error() {
        let mut msg = sample();
        msg.port = 0;
        let encoded = msg.encode();
        assert!(ChirpMessage::decode(&encoded).is_err());
    }

    #[test]
    fn depart_with_zero_port_is_accepted() {
        let mut msg = sample();
        msg.msg_type = MsgType::Depart;
        msg.port = 0;
        let encoded = msg.encode();
        assert!(ChirpMessage::decode(&encoded).is_ok());
    }
}
