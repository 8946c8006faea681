// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Self-describing binary encoding for [`Value`] and [`Dictionary`]
//! (spec.md §4.8). Preserves array homogeneity, distinguishes nil from an
//! empty array, and encodes time points as an extension type with
//! nanosecond resolution. Integer widths are normalised to signed 64-bit
//! on the wire.

use crate::cursor::{Reader, SerError, SerResult, Writer};
use constellation_value::{Dictionary, Entry, Value, ValueArray};
use std::time::{Duration, SystemTime};

const TAG_NOTHING: u8 = 0;
const TAG_BOOL: u8 = 1;
const TAG_INT: u8 = 2;
const TAG_DOUBLE: u8 = 3;
const TAG_STRING: u8 = 4;
const TAG_TIME: u8 = 5;
const TAG_ARRAY: u8 = 6;

const ELEM_BOOL: u8 = 1;
const ELEM_INT: u8 = 2;
const ELEM_DOUBLE: u8 = 3;
const ELEM_STRING: u8 = 4;
const ELEM_TIME: u8 = 5;

const ENTRY_VALUE: u8 = 0;
const ENTRY_DICT: u8 = 1;

fn write_time(w: &mut Writer, t: SystemTime) {
    let dur = t.duration_since(SystemTime::UNIX_EPOCH).unwrap_or_default();
    w.write_i64_le(dur.as_secs() as i64);
    w.write_u32_le(dur.subsec_nanos());
}

fn read_time(r: &mut Reader) -> SerResult<SystemTime> {
    let secs = r.read_i64_le()?;
    let nanos = r.read_u32_le()?;
    if secs < 0 {
        return Err(SerError::InvalidData { reason: "negative time point".into() });
    }
    Ok(SystemTime::UNIX_EPOCH + Duration::new(secs as u64, nanos))
}

/// Encode a single [`Value`] (tag byte followed by its payload).
pub fn encode_value(w: &mut Writer, v: &Value) {
    match v {
        Value::Nothing => w.write_u8(TAG_NOTHING),
        Value::Bool(b) => {
            w.write_u8(TAG_BOOL);
            w.write_u8(u8::from(*b));
        }
        Value::Int(i) => {
            w.write_u8(TAG_INT);
            w.write_i64_le(*i);
        }
        Value::Double(d) => {
            w.write_u8(TAG_DOUBLE);
            w.write_f64_le(*d);
        }
        Value::String(s) => {
            w.write_u8(TAG_STRING);
            w.write_string(s);
        }
        Value::Time(t) => {
            w.write_u8(TAG_TIME);
            write_time(w, *t);
        }
        Value::Array(arr) => {
            w.write_u8(TAG_ARRAY);
            match arr {
                ValueArray::Bool(items) => {
                    w.write_u8(ELEM_BOOL);
                    w.write_u32_le(items.len() as u32);
                    for b in items {
                        w.write_u8(u8::from(*b));
                    }
                }
                ValueArray::Int(items) => {
                    w.write_u8(ELEM_INT);
                    w.write_u32_le(items.len() as u32);
                    for i in items {
                        w.write_i64_le(*i);
                    }
                }
                ValueArray::Double(items) => {
                    w.write_u8(ELEM_DOUBLE);
                    w.write_u32_le(items.len() as u32);
                    for d in items {
                        w.write_f64_le(*d);
                    }
                }
                ValueArray::String(items) => {
                    w.write_u8(ELEM_STRING);
                    w.write_u32_le(items.len() as u32);
                    for s in items {
                        w.write_string(s);
                    }
                }
                ValueArray::Time(items) => {
                    w.write_u8(ELEM_TIME);
                    w.write_u32_le(items.len() as u32);
                    for t in items {
                        write_time(w, *t);
                    }
                }
            }
        }
    }
}

/// Decode a single [`Value`].
pub fn decode_value(r: &mut Reader) -> SerResult<Value> {
    let tag = r.read_u8()?;
    match tag {
        TAG_NOTHING => Ok(Value::Nothing),
        TAG_BOOL => Ok(Value::Bool(r.read_u8()? != 0)),
        TAG_INT => Ok(Value::Int(r.read_i64_le()?)),
        TAG_DOUBLE => Ok(Value::Double(r.read_f64_le()?)),
        TAG_STRING => Ok(Value::String(r.read_string()?)),
        TAG_TIME => Ok(Value::Time(read_time(r)?)),
        TAG_ARRAY => {
            let elem_tag = r.read_u8()?;
            let len = r.read_u32_le()? as usize;
            let arr = match elem_tag {
                ELEM_BOOL => {
                    let mut v = Vec::with_capacity(len);
                    for _ in 0..len {
                        v.push(r.read_u8()? != 0);
                    }
                    ValueArray::Bool(v)
                }
                ELEM_INT => {
                    let mut v = Vec::with_capacity(len);
                    for _ in 0..len {
                        v.push(r.read_i64_le()?);
                    }
                    ValueArray::Int(v)
                }
                ELEM_DOUBLE => {
                    let mut v = Vec::with_capacity(len);
                    for _ in 0..len {
                        v.push(r.read_f64_le()?);
                    }
                    ValueArray::Double(v)
                }
                ELEM_STRING => {
                    let mut v = Vec::with_capacity(len);
                    for _ in 0..len {
                        v.push(r.read_string()?);
                    }
                    ValueArray::String(v)
                }
                ELEM_TIME => {
                    let mut v = Vec::with_capacity(len);
                    for _ in 0..len {
                        v.push(read_time(r)?);
                    }
                    ValueArray::Time(v)
                }
                other => return Err(SerError::InvalidData { reason: format!("unknown array element tag {other}") }),
            };
            Ok(Value::Array(arr))
        }
        other => Err(SerError::InvalidData { reason: format!("unknown value tag {other}") }),
    }
}

/// Encode a [`Dictionary`], preserving key order and nested structure.
pub fn encode_dict(w: &mut Writer, dict: &Dictionary) {
    w.write_u32_le(dict.len() as u32);
    for (key, entry) in dict.iter() {
        w.write_string(key);
        match entry {
            Entry::Value(v) => {
                w.write_u8(ENTRY_VALUE);
                encode_value(w, v);
            }
            Entry::Dict(d) => {
                w.write_u8(ENTRY_DICT);
                encode_dict(w, d);
            }
        }
    }
}

/// Decode a [`Dictionary`]. Duplicate keys differing only in case are
/// preserved as a decode error rather than silently merged, matching
/// [`Dictionary::insert`]'s own rule.
pub fn decode_dict(r: &mut Reader) -> SerResult<Dictionary> {
    let count = r.read_u32_le()? as usize;
    let mut dict = Dictionary::new();
    for _ in 0..count {
        let key = r.read_string()?;
        let kind = r.read_u8()?;
        let entry: Entry = match kind {
            ENTRY_VALUE => decode_value(r)?.into(),
            ENTRY_DICT => decode_dict(r)?.into(),
            other => return Err(SerError::InvalidData { reason: format!("unknown entry tag {other}") }),
        };
        dict.insert(key, entry).map_err(|e| SerError::InvalidData { reason: e.to_string() })?;
    }
    Ok(dict)
}

/// Encode a dictionary to a standalone byte vector.
pub fn encode_dict_bytes(dict: &Dictionary) -> Vec<u8> {
    let mut w = Writer::new();
    encode_dict(&mut w, dict);
    w.into_bytes()
}

/// Decode a dictionary from a standalone byte slice.
pub fn decode_dict_bytes(bytes: &[u8]) -> SerResult<Dictionary> {
    let mut r = Reader::new(bytes);
    decode_dict(&mut r)
}
