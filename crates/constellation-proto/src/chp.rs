// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! CHP: the single-frame heartbeat beacon (spec.md §4.2, §6).

use crate::cursor::{Reader, SerError, SerResult, Writer};
use crate::ident::{ProtocolId, CHP1};
use std::time::SystemTime;

/// One heartbeat beacon: `{sender, wall-clock, state-code,
/// interval-milliseconds, optional-reason}`.
#[derive(Debug, Clone, PartialEq)]
pub struct Beacon {
    pub sender: String,
    pub wall_clock: SystemTime,
    pub state_code: u8,
    pub interval_ms: u32,
    pub reason: Option<String>,
}

impl Beacon {
    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::new();
        CHP1.write(&mut w);
        w.write_string(&self.sender);
        let dur = self.wall_clock.duration_since(SystemTime::UNIX_EPOCH).unwrap_or_default();
        w.write_i64_le(dur.as_secs() as i64);
        w.write_u32_le(dur.subsec_nanos());
        w.write_u8(self.state_code);
        w.write_u32_le(self.interval_ms);
        match &self.reason {
            Some(reason) => {
                w.write_u8(1);
                w.write_string(reason);
            }
            None => w.write_u8(0),
        }
        w.into_bytes()
    }

    pub fn decode(bytes: &[u8]) -> SerResult<Self> {
        let mut r = Reader::new(bytes);
        ProtocolId::read_and_expect(&mut r, CHP1)?;
        let sender = r.read_string()?;
        let secs = r.read_i64_le()?;
        let nanos = r.read_u32_le()?;
        if secs < 0 {
            return Err(SerError::InvalidData { reason: "negative wall-clock".into() });
        }
        let wall_clock = SystemTime::UNIX_EPOCH + std::time::Duration::new(secs as u64, nanos);
        let state_code = r.read_u8()?;
        let interval_ms = r.read_u32_le()?;
        let has_reason = r.read_u8()?;
        let reason = match has_reason {
            0 => None,
            1 => Some(r.read_string()?),
            other => return Err(SerError::InvalidData { reason: format!("invalid reason-presence byte {other}") }),
        };
        Ok(Self { sender, wall_clock, state_code, interval_ms, reason })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn beacon_round_trips_with_reason() {
        let beacon = Beacon {
            sender: "Sensor.temp01".into(),
            wall_clock: SystemTime::now(),
            state_code: 4,
            interval_ms: 1000,
            reason: Some("peer lost".into()),
        };
        let bytes = beacon.encode();
        let decoded = Beacon::decode(&bytes).unwrap();
        assert_eq!(decoded.sender, beacon.sender);
        assert_eq!(decoded.state_code, beacon.state_code);
        assert_eq!(decoded.interval_ms, beacon.interval_ms);
        assert_eq!(decoded.reason, beacon.reason);
    }

    #[test]
    fn beacon_round_trips_without_reason() {
        let beacon = Beacon {
            sender: "Sensor.temp01".into(),
            wall_clock: SystemTime::now(),
            state_code: 4,
            interval_ms: 1000,
            reason: None,
        };
        let decoded = Beacon::decode(&beacon.encode()).unwrap();
        assert_eq!(decoded.reason, None);
    }

    #[test]
    fn wrong_protocol_id_is_rejected() {
        let mut w = Writer::new();
        crate::ident::CSCP1.write(&mut w);
        assert!(Beacon::decode(&w.into_bytes()).is_err());
    }
}
