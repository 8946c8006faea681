// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Protocol identifiers: the ASCII protocol name concatenated with a single
//! binary version byte (spec.md §4.8, §6).

use crate::cursor::{Reader, SerError, SerResult, Writer};

/// A protocol identifier, e.g. `"CSCP"` version `1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolId {
    pub name: &'static str,
    pub version: u8,
}

pub const CSCP1: ProtocolId = ProtocolId { name: "CSCP", version: 1 };
pub const CMDP1: ProtocolId = ProtocolId { name: "CMDP", version: 1 };
pub const CDTP1: ProtocolId = ProtocolId { name: "CDTP", version: 1 };
pub const CDTP2: ProtocolId = ProtocolId { name: "CDTP", version: 2 };
pub const CHP1: ProtocolId = ProtocolId { name: "CHP", version: 1 };

/// Raised when a decoded protocol identifier doesn't match what the reader
/// expected; echoes the identifier actually received (spec.md §6: "A
/// mismatch is reported with the received identifier echoed").
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
#[error("protocol mismatch: expected {expected}, received {received}")]
pub struct ProtocolMismatch {
    pub expected: String,
    pub received: String,
}

impl ProtocolId {
    pub fn write(&self, w: &mut Writer) {
        w.write_bytes(self.name.as_bytes());
        w.write_u8(self.version);
    }

    pub fn read_and_expect(r: &mut Reader, expected: ProtocolId) -> SerResult<()> {
        let name_bytes = r.read_bytes(expected.name.len())?;
        let version = r.read_u8()?;
        let received_name = String::from_utf8_lossy(name_bytes).to_string();
        if name_bytes != expected.name.as_bytes() || version != expected.version {
            return Err(SerError::InvalidData {
                reason: format!(
                    "protocol mismatch: expected {}{}, received {}{}",
                    expected.name, expected.version, received_name, version
                ),
            });
        }
        Ok(())
    }

    pub fn render(&self) -> String {
        format!("{}{}", self.name, self.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifier_round_trips() {
        let mut w = Writer::new();
        CSCP1.write(&mut w);
        let bytes = w.into_bytes();
        let mut r = Reader::new(&bytes);
        assert!(ProtocolId::read_and_expect(&mut r, CSCP1).is_ok());
    }

    #[test]
    fn mismatched_identifier_is_rejected() {
        let mut w = Writer::new();
        CHP1.write(&mut w);
        let bytes = w.into_bytes();
        let mut r = Reader::new(&bytes);
        assert!(ProtocolId::read_and_expect(&mut r, CSCP1).is_err());
    }
}
