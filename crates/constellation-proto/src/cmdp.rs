// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! CMDP: the single-frame telemetry push (spec.md §1, §6). Only the slice
//! the control plane needs for metric-based measurement gating is modeled
//! here — one metric name paired with its latest `Value`, pushed from a
//! satellite to a subscribed controller. Log multiplexing and the rest of
//! CMDP's topic space are out of scope.

use crate::cursor::{Reader, SerResult, Writer};
use crate::dict_codec::{decode_value, encode_value};
use crate::ident::{ProtocolId, CMDP1};
use constellation_value::Value;
use std::time::SystemTime;

/// One telemetry sample: `{sender, wall-clock, metric name, value}`.
#[derive(Debug, Clone, PartialEq)]
pub struct StatMessage {
    pub sender: String,
    pub wall_clock: SystemTime,
    pub metric: String,
    pub value: Value,
}

impl StatMessage {
    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::new();
        CMDP1.write(&mut w);
        w.write_string(&self.sender);
        let dur = self.wall_clock.duration_since(SystemTime::UNIX_EPOCH).unwrap_or_default();
        w.write_i64_le(dur.as_secs() as i64);
        w.write_u32_le(dur.subsec_nanos());
        w.write_string(&self.metric);
        encode_value(&mut w, &self.value);
        w.into_bytes()
    }

    pub fn decode(bytes: &[u8]) -> SerResult<Self> {
        let mut r = Reader::new(bytes);
        ProtocolId::read_and_expect(&mut r, CMDP1)?;
        let sender = r.read_string()?;
        let secs = r.read_i64_le()?;
        let nanos = r.read_u32_le()?;
        let wall_clock = SystemTime::UNIX_EPOCH + std::time::Duration::new(secs.max(0) as u64, nanos);
        let metric = r.read_string()?;
        let value = decode_value(&mut r)?;
        Ok(Self { sender, wall_clock, metric, value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stat_message_round_trips() {
        let msg = StatMessage {
            sender: "Sensor.temp01".into(),
            wall_clock: SystemTime::now(),
            metric: "TEMPERATURE".into(),
            value: Value::Double(21.5),
        };
        let decoded = StatMessage::decode(&msg.encode()).unwrap();
        assert_eq!(decoded.sender, msg.sender);
        assert_eq!(decoded.metric, msg.metric);
        assert_eq!(decoded.value, msg.value);
    }

    #[test]
    fn wrong_protocol_id_is_rejected() {
        let mut w = Writer::new();
        crate::ident::CSCP1.write(&mut w);
        assert!(StatMessage::decode(&w.into_bytes()).is_err());
    }
}
