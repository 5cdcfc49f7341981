//! Runtime values bound as statement arguments and scanned out of rows.

use std::fmt;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValueError;
use crate::types::FieldType;

/// A runtime value that can be bound as an argument or scanned from a row.
///
/// Integers are kept in a canonical form: anything that fits in `i64` is an
/// `Int64`, only unsigned values above `i64::MAX` use `UInt64`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// SQL NULL.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Signed 64-bit integer.
    Int64(i64),
    /// Unsigned integer that does not fit in `i64`.
    UInt64(u64),
    /// 64-bit floating point.
    Float64(f64),
    /// UTF-8 string.
    String(String),
    /// Binary data.
    Bytes(Vec<u8>),
    /// Point in time, always UTC.
    Time(DateTime<Utc>),
    /// JSON document.
    Json(serde_json::Value),
}

impl Value {
    /// Build the canonical integer value for `n`, if it is representable.
    pub fn from_i128(n: i128) -> Option<Value> {
        if let Ok(v) = i64::try_from(n) {
            Some(Value::Int64(v))
        } else if let Ok(v) = u64::try_from(n) {
            Some(Value::UInt64(v))
        } else {
            None
        }
    }

    /// Name of the value kind, used in error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int64(_) => "int64",
            Value::UInt64(_) => "uint64",
            Value::Float64(_) => "float64",
            Value::String(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::Time(_) => "time",
            Value::Json(_) => "json",
        }
    }

    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Try to get as bool.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Try to get as i64.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int64(n) => Some(*n),
            Value::UInt64(n) => i64::try_from(*n).ok(),
            _ => None,
        }
    }

    /// Try to get as u64.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::Int64(n) => u64::try_from(*n).ok(),
            Value::UInt64(n) => Some(*n),
            _ => None,
        }
    }

    /// Try to get as f64, widening integers.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float64(f) => Some(*f),
            Value::Int64(n) => Some(*n as f64),
            Value::UInt64(n) => Some(*n as f64),
            _ => None,
        }
    }

    /// Try to get as string slice.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get as bytes.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Try to get as a timestamp.
    pub fn as_time(&self) -> Option<&DateTime<Utc>> {
        match self {
            Value::Time(t) => Some(t),
            _ => None,
        }
    }

    /// Try to get as a JSON document.
    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Value::Json(j) => Some(j),
            _ => None,
        }
    }

    /// The hashable correlation key of this value.
    ///
    /// Only integers, strings and bytes can identify a node; everything else
    /// returns `None`.
    pub fn key(&self) -> Option<Key> {
        match self {
            Value::Int64(n) => Some(Key::Int(*n)),
            Value::UInt64(n) => Some(match i64::try_from(*n) {
                Ok(n) => Key::Int(n),
                Err(_) => Key::UInt(*n),
            }),
            Value::String(s) => Some(Key::Str(s.clone())),
            Value::Bytes(b) => Some(Key::Bytes(b.clone())),
            _ => None,
        }
    }

    /// Add two numeric values, used to merge pending increments.
    ///
    /// Returns `None` when either side is not numeric or the integer sum
    /// overflows.
    pub fn checked_add(&self, other: &Value) -> Option<Value> {
        match (self, other) {
            (Value::Float64(_), _) | (_, Value::Float64(_)) => {
                Some(Value::Float64(self.as_f64()? + other.as_f64()?))
            }
            _ => Value::from_i128(self.as_i128()?.checked_add(other.as_i128()?)?),
        }
    }

    fn as_i128(&self) -> Option<i128> {
        match self {
            Value::Int64(n) => Some(*n as i128),
            Value::UInt64(n) => Some(*n as i128),
            _ => None,
        }
    }

    /// Coerce a raw driver cell into the canonical value for `ty`.
    ///
    /// Drivers report whatever their wire protocol carries (SQLite has no
    /// boolean, MySQL returns JSON as text). This normalizes those cells and
    /// range-checks sized integers.
    pub fn coerce(self, ty: FieldType) -> Result<Value, ValueError> {
        if self.is_null() {
            return Ok(Value::Null);
        }
        match ty {
            FieldType::Bool => match self {
                Value::Bool(_) => Ok(self),
                Value::Int64(n) => Ok(Value::Bool(n != 0)),
                Value::UInt64(n) => Ok(Value::Bool(n != 0)),
                Value::String(s) => match s.as_str() {
                    "true" | "t" | "1" => Ok(Value::Bool(true)),
                    "false" | "f" | "0" => Ok(Value::Bool(false)),
                    _ => Err(parse_error(s, ty, "not a boolean")),
                },
                other => Err(ValueError::conversion(other.kind_name(), ty.name())),
            },
            _ if ty.int_bounds().is_some() => {
                let n: i128 = match self {
                    Value::Int64(n) => n as i128,
                    Value::UInt64(n) => n as i128,
                    Value::Bool(b) => b as i128,
                    Value::Float64(f) if f.fract() == 0.0 => f as i128,
                    Value::String(s) => s
                        .trim()
                        .parse::<i128>()
                        .map_err(|e| parse_error(s.clone(), ty, e.to_string()))?,
                    other => return Err(ValueError::conversion(other.kind_name(), ty.name())),
                };
                check_bounds(n, ty)
            }
            FieldType::Float32 | FieldType::Float64 => match self {
                Value::Float64(_) => Ok(self),
                Value::Int64(n) => Ok(Value::Float64(n as f64)),
                Value::UInt64(n) => Ok(Value::Float64(n as f64)),
                Value::String(s) => s
                    .trim()
                    .parse::<f64>()
                    .map(Value::Float64)
                    .map_err(|e| parse_error(s.clone(), ty, e.to_string())),
                other => Err(ValueError::conversion(other.kind_name(), ty.name())),
            },
            FieldType::String | FieldType::Enum | FieldType::Uuid => match self {
                Value::String(_) => Ok(self),
                Value::Bytes(b) => String::from_utf8(b)
                    .map(Value::String)
                    .map_err(|_| ValueError::conversion("bytes", ty.name())),
                other => Err(ValueError::conversion(other.kind_name(), ty.name())),
            },
            FieldType::Bytes => match self {
                Value::Bytes(_) => Ok(self),
                Value::String(s) => Ok(Value::Bytes(s.into_bytes())),
                other => Err(ValueError::conversion(other.kind_name(), ty.name())),
            },
            FieldType::Time => match self {
                Value::Time(_) => Ok(self),
                Value::String(s) => parse_time(&s)
                    .map(Value::Time)
                    .ok_or_else(|| parse_error(s, ty, "unrecognized timestamp format")),
                Value::Int64(secs) => Utc
                    .timestamp_opt(secs, 0)
                    .single()
                    .map(Value::Time)
                    .ok_or(ValueError::OutOfRange {
                        value: secs.to_string(),
                        to: ty,
                    }),
                other => Err(ValueError::conversion(other.kind_name(), ty.name())),
            },
            FieldType::Json => match self {
                Value::Json(_) => Ok(self),
                Value::String(s) => serde_json::from_str(&s)
                    .map(Value::Json)
                    .map_err(|e| parse_error(s, ty, e.to_string())),
                Value::Bytes(b) => serde_json::from_slice(&b)
                    .map(Value::Json)
                    .map_err(|e| parse_error(String::from_utf8_lossy(&b), ty, e.to_string())),
                Value::Bool(b) => Ok(Value::Json(b.into())),
                Value::Int64(n) => Ok(Value::Json(n.into())),
                Value::UInt64(n) => Ok(Value::Json(n.into())),
                Value::Float64(f) => Ok(Value::Json(f.into())),
                other => Err(ValueError::conversion(other.kind_name(), ty.name())),
            },
            _ => Ok(self),
        }
    }
}

fn parse_error(input: impl Into<String>, to: FieldType, message: impl Into<String>) -> ValueError {
    ValueError::Parse {
        input: input.into(),
        to,
        message: message.into(),
    }
}

fn check_bounds(n: i128, ty: FieldType) -> Result<Value, ValueError> {
    let out_of_range = || ValueError::OutOfRange {
        value: n.to_string(),
        to: ty,
    };
    let (lo, hi) = ty.int_bounds().ok_or_else(out_of_range)?;
    if n < lo || n > hi {
        return Err(out_of_range());
    }
    Value::from_i128(n).ok_or_else(out_of_range)
}

fn parse_time(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Some(t.with_timezone(&Utc));
    }
    if let Ok(t) = DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f%:z") {
        return Some(t.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|naive| naive.and_utc())
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int64(n) => write!(f, "{n}"),
            Value::UInt64(n) => write!(f, "{n}"),
            Value::Float64(x) => write!(f, "{x}"),
            Value::String(s) => f.write_str(s),
            Value::Bytes(b) => write!(f, "0x{}", hex::encode(b)),
            Value::Time(t) => f.write_str(&t.to_rfc3339()),
            Value::Json(j) => write!(f, "{j}"),
        }
    }
}

/// A hashable node identity, used to build correlation maps.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Key {
    Int(i64),
    UInt(u64),
    Str(String),
    Bytes(Vec<u8>),
}

impl From<Key> for Value {
    fn from(key: Key) -> Self {
        match key {
            Key::Int(n) => Value::Int64(n),
            Key::UInt(n) => Value::UInt64(n),
            Key::Str(s) => Value::String(s),
            Key::Bytes(b) => Value::Bytes(b),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Int(n) => write!(f, "{n}"),
            Key::UInt(n) => write!(f, "{n}"),
            Key::Str(s) => f.write_str(s),
            Key::Bytes(b) => write!(f, "0x{}", hex::encode(b)),
        }
    }
}

// Conversions into values.

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

macro_rules! from_signed {
    ($($t:ty),*) => {
        $(impl From<$t> for Value {
            fn from(v: $t) -> Self {
                Value::Int64(v as i64)
            }
        })*
    };
}

from_signed!(i8, i16, i32, i64, u8, u16, u32);

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        match i64::try_from(v) {
            Ok(n) => Value::Int64(n),
            Err(_) => Value::UInt64(v),
        }
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float64(v as f64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float64(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::Bytes(v.to_vec())
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Time(v)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        Value::Json(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// Conversion out of a scanned value into a host type.
///
/// Entity implementations use this in `assign_values` to move each column
/// into its field.
pub trait FromValue: Sized {
    fn from_value(value: Value) -> Result<Self, ValueError>;
}

impl FromValue for Value {
    fn from_value(value: Value) -> Result<Self, ValueError> {
        Ok(value)
    }
}

impl FromValue for bool {
    fn from_value(value: Value) -> Result<Self, ValueError> {
        match value {
            Value::Bool(b) => Ok(b),
            Value::Int64(n) => Ok(n != 0),
            other => Err(ValueError::conversion(other.kind_name(), "bool")),
        }
    }
}

macro_rules! int_from_value {
    ($($t:ty => $ft:expr),*) => {
        $(impl FromValue for $t {
            fn from_value(value: Value) -> Result<Self, ValueError> {
                let n: i128 = match value {
                    Value::Int64(n) => n as i128,
                    Value::UInt64(n) => n as i128,
                    Value::Bool(b) => b as i128,
                    other => {
                        return Err(ValueError::conversion(other.kind_name(), stringify!($t)))
                    }
                };
                <$t>::try_from(n).map_err(|_| ValueError::OutOfRange {
                    value: n.to_string(),
                    to: $ft,
                })
            }
        })*
    };
}

int_from_value!(
    i8 => FieldType::Int8,
    i16 => FieldType::Int16,
    i32 => FieldType::Int32,
    i64 => FieldType::Int64,
    u8 => FieldType::Uint8,
    u16 => FieldType::Uint16,
    u32 => FieldType::Uint32,
    u64 => FieldType::Uint64
);

impl FromValue for f64 {
    fn from_value(value: Value) -> Result<Self, ValueError> {
        value
            .as_f64()
            .ok_or_else(|| ValueError::conversion(value.kind_name(), "f64"))
    }
}

impl FromValue for f32 {
    fn from_value(value: Value) -> Result<Self, ValueError> {
        f64::from_value(value).map(|f| f as f32)
    }
}

impl FromValue for String {
    fn from_value(value: Value) -> Result<Self, ValueError> {
        match value {
            Value::String(s) => Ok(s),
            other => Err(ValueError::conversion(other.kind_name(), "String")),
        }
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: Value) -> Result<Self, ValueError> {
        match value {
            Value::Bytes(b) => Ok(b),
            Value::String(s) => Ok(s.into_bytes()),
            other => Err(ValueError::conversion(other.kind_name(), "Vec<u8>")),
        }
    }
}

impl FromValue for DateTime<Utc> {
    fn from_value(value: Value) -> Result<Self, ValueError> {
        match value.coerce(FieldType::Time)? {
            Value::Time(t) => Ok(t),
            other => Err(ValueError::conversion(other.kind_name(), "DateTime<Utc>")),
        }
    }
}

impl FromValue for serde_json::Value {
    fn from_value(value: Value) -> Result<Self, ValueError> {
        match value.coerce(FieldType::Json)? {
            Value::Json(j) => Ok(j),
            Value::Null => Ok(serde_json::Value::Null),
            other => Err(ValueError::conversion(other.kind_name(), "serde_json::Value")),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value) -> Result<Self, ValueError> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}
