// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! CSCP: the three-frame command request/reply protocol (spec.md §4.3,
//! §6). Each message is three length-prefixed (u32 LE) frames: header,
//! body, optional payload.

use crate::cursor::{Reader, SerError, SerResult, Writer};
use crate::dict_codec::{decode_dict, encode_dict};
use crate::ident::{ProtocolId, CSCP1};
use constellation_value::Dictionary;
use std::io::{self, Read, Write};
use std::time::SystemTime;

/// Maximum single-frame size accepted off the wire — guards against a
/// malicious or corrupt length prefix causing an unbounded allocation.
pub const MAX_FRAME_LEN: u32 = 64 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum VerbType {
    Request = 1,
    Success = 2,
    NotImplemented = 3,
    Incomplete = 4,
    Invalid = 5,
    Unknown = 6,
    Error = 7,
}

impl VerbType {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            1 => Some(VerbType::Request),
            2 => Some(VerbType::Success),
            3 => Some(VerbType::NotImplemented),
            4 => Some(VerbType::Incomplete),
            5 => Some(VerbType::Invalid),
            6 => Some(VerbType::Unknown),
            7 => Some(VerbType::Error),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Header {
    pub sender: String,
    pub wall_clock: SystemTime,
    pub tags: Dictionary,
}

impl Header {
    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::new();
        CSCP1.write(&mut w);
        w.write_string(&self.sender);
        let dur = self.wall_clock.duration_since(SystemTime::UNIX_EPOCH).unwrap_or_default();
        w.write_i64_le(dur.as_secs() as i64);
        w.write_u32_le(dur.subsec_nanos());
        encode_dict(&mut w, &self.tags);
        w.into_bytes()
    }

    pub fn decode(bytes: &[u8]) -> SerResult<Self> {
        let mut r = Reader::new(bytes);
        ProtocolId::read_and_expect(&mut r, CSCP1)?;
        let sender = r.read_string()?;
        let secs = r.read_i64_le()?;
        let nanos = r.read_u32_le()?;
        if secs < 0 {
            return Err(SerError::InvalidData { reason: "negative wall-clock".into() });
        }
        let wall_clock = SystemTime::UNIX_EPOCH + std::time::Duration::new(secs as u64, nanos);
        let tags = decode_dict(&mut r)?;
        Ok(Self { sender, wall_clock, tags })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Body {
    pub verb_type: VerbType,
    pub verb_name: String,
}

impl Body {
    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::new();
        w.write_u8(self.verb_type as u8);
        w.write_string(&self.verb_name);
        w.into_bytes()
    }

    pub fn decode(bytes: &[u8]) -> SerResult<Self> {
        let mut r = Reader::new(bytes);
        let verb_byte = r.read_u8()?;
        let verb_type =
            VerbType::from_u8(verb_byte).ok_or_else(|| SerError::InvalidData { reason: format!("unknown verb-type byte {verb_byte}") })?;
        let verb_name = r.read_string()?;
        Ok(Self { verb_type, verb_name })
    }
}

/// A fully decoded CSCP message: header, body, and an opaque payload frame
/// (its interpretation depends on the verb).
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub header: Header,
    pub body: Body,
    pub payload: Vec<u8>,
}

fn write_frame<W: Write>(stream: &mut W, frame: &[u8]) -> io::Result<()> {
    let len = u32::try_from(frame.len()).map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "frame too large"))?;
    stream.write_all(&len.to_le_bytes())?;
    stream.write_all(frame)
}

fn read_frame<R: Read>(stream: &mut R) -> io::Result<Vec<u8>> {
    let mut len_bytes = [0u8; 4];
    stream.read_exact(&mut len_bytes)?;
    let len = u32::from_le_bytes(len_bytes);
    if len > MAX_FRAME_LEN {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "frame exceeds maximum length"));
    }
    let mut buf = vec![0u8; len as usize];
    stream.read_exact(&mut buf)?;
    Ok(buf)
}

impl Message {
    pub fn write_to<W: Write>(&self, stream: &mut W) -> io::Result<()> {
        write_frame(stream, &self.header.encode())?;
        write_frame(stream, &self.body.encode())?;
        write_frame(stream, &self.payload)
    }

    /// Read and decode one message. Protocol-level errors (wrong frame
    /// count is impossible by construction here; wrong protocol id or
    /// undecodable frames) surface as an `io::Error` so the caller can
    /// reply with CSCP `ERROR` without entering verb dispatch (spec.md
    /// §4.3 "Protocol-level errors ... yield ERROR without entering the
    /// verb-dispatch path").
    pub fn read_from<R: Read>(stream: &mut R) -> io::Result<Self> {
        let header_bytes = read_frame(stream)?;
        let body_bytes = read_frame(stream)?;
        let payload = read_frame(stream)?;
        let header = Header::decode(&header_bytes).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
        let body = Body::decode(&body_bytes).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
        Ok(Self { header, body, payload })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_header() -> Header {
        Header { sender: "Controller.main".into(), wall_clock: SystemTime::now(), tags: Dictionary::new() }
    }

    #[test]
    fn header_round_trips() {
        let h = sample_header();
        let decoded = Header::decode(&h.encode()).unwrap();
        assert_eq!(decoded.sender, h.sender);
    }

    #[test]
    fn body_round_trips() {
        let b = Body { verb_type: VerbType::Request, verb_name: "initialize".into() };
        let decoded = Body::decode(&b.encode()).unwrap();
        assert_eq!(decoded, b);
    }

    #[test]
    fn message_round_trips_over_an_in_memory_stream() {
        let msg = Message {
            header: sample_header(),
            body: Body { verb_type: VerbType::Success, verb_name: "get_state".into() },
            payload: b"payload-bytes".to_vec(),
        };
        let mut buf = Vec::new();
        msg.write_to(&mut buf).unwrap();
        let decoded = Message::read_from(&mut buf.as_slice()).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn oversized_frame_length_is_rejected_before_allocating() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&(MAX_FRAME_LEN + 1).to_le_bytes());
        let mut slice = buf.as_slice();
        assert!(read_frame(&mut slice).is_err());
    }

    #[test]
    fn undecodable_header_is_an_io_error() {
        let mut buf = Vec::new();
        write_frame(&mut buf, b"not a real header").unwrap();
        write_frame(&mut buf, &Body { verb_type: VerbType::Request, verb_name: "x".into() }.encode()).unwrap();
        write_frame(&mut buf, &[]).unwrap();
        assert!(Message::read_from(&mut buf.as_slice()).is_err());
    }
}
