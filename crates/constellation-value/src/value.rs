// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The [`Value`] tagged union: the self-describing scalar carrier used for
//! tags, configuration entries, metrics, and command payloads throughout the
//! control plane.

use std::fmt;
use std::time::SystemTime;

/// A homogeneous array of scalar values.
///
/// All elements share a variant; mixed-kind arrays cannot be constructed
/// through the public API.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueArray {
    Bool(Vec<bool>),
    Int(Vec<i64>),
    Double(Vec<f64>),
    String(Vec<String>),
    Time(Vec<SystemTime>),
}

/// A tagged union over the scalar kinds Constellation ships on the wire.
///
/// `Value` never nests another `Value` or a `Dictionary`; nested structure
/// is the job of [`crate::Dictionary`], which holds a map of `Value` leaves
/// and/or further dictionaries.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Nothing,
    Bool(bool),
    Int(i64),
    Double(f64),
    String(String),
    Time(SystemTime),
    Array(ValueArray),
}

/// Error raised when a `Value` cannot be constructed from, or narrowed to,
/// a requested host type.
#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum ValueError {
    #[error("value out of range for requested type: {0}")]
    OutOfRange(String),
    #[error("value kind mismatch: expected {expected}, found {found}")]
    KindMismatch { expected: &'static str, found: &'static str },
    #[error("unknown enumerator name: {0}")]
    UnknownEnumerator(String),
}

impl Value {
    /// Name of the variant, used in diagnostics and the verb-error taxonomy.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Nothing => "nothing",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Double(_) => "double",
            Value::String(_) => "string",
            Value::Time(_) => "time",
            Value::Array(_) => "array",
        }
    }

    /// Construct from any integer type that fits in 64 bits — `i8` through
    /// `i64`, and unsigned variants up to `u63`'s worth of magnitude are
    /// accepted as long as they fit; wider unsigned values are rejected.
    pub fn from_narrow_int<T>(v: T) -> Result<Self, ValueError>
    where
        T: TryInto<i64> + fmt::Display + Copy,
    {
        v.try_into()
            .map(Value::Int)
            .map_err(|_| ValueError::OutOfRange(format!("{v} does not fit in i64")))
    }

    /// Construct from an enumeration by its variant name.
    pub fn from_enum_name(name: impl Into<String>) -> Self {
        Value::String(name.into())
    }

    /// Range-checked narrowing getter, e.g. `get_narrow::<i32>()`.
    pub fn get_narrow<T>(&self) -> Result<T, ValueError>
    where
        T: TryFrom<i64>,
    {
        match self {
            Value::Int(i) => T::try_from(*i)
                .map_err(|_| ValueError::OutOfRange(format!("{i} does not fit requested width"))),
            other => Err(ValueError::KindMismatch {
                expected: "int",
                found: other.kind_name(),
            }),
        }
    }

    pub fn as_bool(&self) -> Result<bool, ValueError> {
        match self {
            Value::Bool(b) => Ok(*b),
            other => Err(ValueError::KindMismatch { expected: "bool", found: other.kind_name() }),
        }
    }

    pub fn as_int(&self) -> Result<i64, ValueError> {
        match self {
            Value::Int(i) => Ok(*i),
            other => Err(ValueError::KindMismatch { expected: "int", found: other.kind_name() }),
        }
    }

    pub fn as_double(&self) -> Result<f64, ValueError> {
        match self {
            Value::Double(d) => Ok(*d),
            Value::Int(i) => Ok(*i as f64),
            other => Err(ValueError::KindMismatch { expected: "double", found: other.kind_name() }),
        }
    }

    pub fn as_str(&self) -> Result<&str, ValueError> {
        match self {
            Value::String(s) => Ok(s.as_str()),
            other => Err(ValueError::KindMismatch { expected: "string", found: other.kind_name() }),
        }
    }

    pub fn as_time(&self) -> Result<SystemTime, ValueError> {
        match self {
            Value::Time(t) => Ok(*t),
            other => Err(ValueError::KindMismatch { expected: "time", found: other.kind_name() }),
        }
    }

    /// Decode an enum-name string into a `T` via the supplied variant table.
    pub fn as_enum<T: Clone>(&self, variants: &[(&str, T)]) -> Result<T, ValueError> {
        let name = self.as_str()?;
        variants
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.clone())
            .ok_or_else(|| ValueError::UnknownEnumerator(name.to_string()))
    }
}

/// Renders time the way spec.md mandates: `YYYY-MM-DD HH:MM:SS.ffffff`.
pub fn format_system_time(t: SystemTime) -> String {
    let dt: chrono::DateTime<chrono::Utc> = t.into();
    dt.format("%Y-%m-%d %H:%M:%S%.6f").to_string()
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nothing => write!(f, "nothing"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Double(d) => write!(f, "{d}"),
            Value::String(s) => write!(f, "{s}"),
            Value::Time(t) => write!(f, "{}", format_system_time(*t)),
            Value::Array(a) => match a {
                ValueArray::Bool(v) => write!(f, "{v:?}"),
                ValueArray::Int(v) => write!(f, "{v:?}"),
                ValueArray::Double(v) => write!(f, "{v:?}"),
                ValueArray::String(v) => write!(f, "{v:?}"),
                ValueArray::Time(v) => {
                    let rendered: Vec<String> = v.iter().map(|t| format_system_time(*t)).collect();
                    write!(f, "{rendered:?}")
                }
            },
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}
impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}
impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}
impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}
impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}
impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}
impl From<SystemTime> for Value {
    fn from(v: SystemTime) -> Self {
        Value::Time(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn narrow_int_roundtrips_when_in_range() {
        let v = Value::from_narrow_int(42i32).unwrap();
        assert_eq!(v, Value::Int(42));
    }

    #[test]
    fn narrow_getter_rejects_out_of_range() {
        let v = Value::Int(i64::from(i32::MAX) + 1);
        let narrowed: Result<i32, _> = v.get_narrow();
        assert!(matches!(narrowed, Err(ValueError::OutOfRange(_))));
    }

    #[test]
    fn kind_mismatch_reports_both_kinds() {
        let v = Value::String("x".into());
        let err = v.as_int().unwrap_err();
        assert_eq!(
            err,
            ValueError::KindMismatch { expected: "int", found: "string" }
        );
    }

    #[test]
    fn time_renders_with_microsecond_precision() {
        let t = SystemTime::UNIX_EPOCH + Duration::new(1_700_000_000, 123_456_000);
        let rendered = format_system_time(t);
        assert!(rendered.ends_with(".123456"));
        assert_eq!(rendered.len(), "YYYY-MM-DD HH:MM:SS.ffffff".len());
    }

    #[test]
    fn enum_decode_is_case_insensitive() {
        #[derive(Clone, Debug, PartialEq)]
        enum Kind {
            Control,
            Heartbeat,
        }
        let variants = [("control", Kind::Control), ("heartbeat", Kind::Heartbeat)];
        let v = Value::String("HEARTBEAT".into());
        assert_eq!(v.as_enum(&variants).unwrap(), Kind::Heartbeat);
    }

    #[test]
    fn unknown_enumerator_is_an_error() {
        let variants: [(&str, ()); 1] = [("control", ())];
        let v = Value::String("bogus".into());
        assert!(matches!(v.as_enum(&variants), Err(ValueError::UnknownEnumerator(_))));
    }
}
