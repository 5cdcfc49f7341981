//! Storage kinds of node columns.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The semantic storage kind of a column.
///
/// The kind decides how raw driver cells are coerced when rows are scanned
/// and which validators make sense for a field. `Int` and `Uint` are the
/// platform-width integers (64 bits here); the sized variants keep their
/// declared width and are range-checked on scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    Int,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Uint,
    Float32,
    Float64,
    String,
    Bytes,
    Time,
    Json,
    Enum,
    Uuid,
    /// A custom type with a caller-supplied schema type.
    Other,
}

impl FieldType {
    /// Returns true for signed integer kinds.
    pub fn is_signed_int(&self) -> bool {
        matches!(
            self,
            FieldType::Int8 | FieldType::Int16 | FieldType::Int32 | FieldType::Int64 | FieldType::Int
        )
    }

    /// Returns true for unsigned integer kinds.
    pub fn is_unsigned_int(&self) -> bool {
        matches!(
            self,
            FieldType::Uint8
                | FieldType::Uint16
                | FieldType::Uint32
                | FieldType::Uint64
                | FieldType::Uint
        )
    }

    /// Returns true for floating point kinds.
    pub fn is_float(&self) -> bool {
        matches!(self, FieldType::Float32 | FieldType::Float64)
    }

    /// Returns true for any kind that supports arithmetic increments.
    pub fn is_numeric(&self) -> bool {
        self.is_signed_int() || self.is_unsigned_int() || self.is_float()
    }

    /// Inclusive integer bounds of the kind, if it is an integer.
    pub fn int_bounds(&self) -> Option<(i128, i128)> {
        let bounds = match self {
            FieldType::Int8 => (i8::MIN as i128, i8::MAX as i128),
            FieldType::Int16 => (i16::MIN as i128, i16::MAX as i128),
            FieldType::Int32 => (i32::MIN as i128, i32::MAX as i128),
            FieldType::Int64 | FieldType::Int => (i64::MIN as i128, i64::MAX as i128),
            FieldType::Uint8 => (0, u8::MAX as i128),
            FieldType::Uint16 => (0, u16::MAX as i128),
            FieldType::Uint32 => (0, u32::MAX as i128),
            FieldType::Uint64 | FieldType::Uint => (0, u64::MAX as i128),
            _ => return None,
        };
        Some(bounds)
    }

    /// The Rust type a generated entity uses for this kind.
    pub fn rust_type(&self) -> &'static str {
        match self {
            FieldType::Bool => "bool",
            FieldType::Int8 => "i8",
            FieldType::Int16 => "i16",
            FieldType::Int32 => "i32",
            FieldType::Int64 | FieldType::Int => "i64",
            FieldType::Uint8 => "u8",
            FieldType::Uint16 => "u16",
            FieldType::Uint32 => "u32",
            FieldType::Uint64 | FieldType::Uint => "u64",
            FieldType::Float32 => "f32",
            FieldType::Float64 => "f64",
            FieldType::String | FieldType::Enum | FieldType::Uuid => "String",
            FieldType::Bytes => "Vec<u8>",
            FieldType::Time => "chrono::DateTime<chrono::Utc>",
            FieldType::Json => "serde_json::Value",
            FieldType::Other => "nodegraph_sql::Value",
        }
    }

    /// Lowercase name of the kind.
    pub fn name(&self) -> &'static str {
        match self {
            FieldType::Bool => "bool",
            FieldType::Int8 => "int8",
            FieldType::Int16 => "int16",
            FieldType::Int32 => "int32",
            FieldType::Int64 => "int64",
            FieldType::Int => "int",
            FieldType::Uint8 => "uint8",
            FieldType::Uint16 => "uint16",
            FieldType::Uint32 => "uint32",
            FieldType::Uint64 => "uint64",
            FieldType::Uint => "uint",
            FieldType::Float32 => "float32",
            FieldType::Float64 => "float64",
            FieldType::String => "string",
            FieldType::Bytes => "bytes",
            FieldType::Time => "time",
            FieldType::Json => "json",
            FieldType::Enum => "enum",
            FieldType::Uuid => "uuid",
            FieldType::Other => "other",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_classification() {
        assert!(FieldType::Int8.is_signed_int());
        assert!(FieldType::Uint.is_unsigned_int());
        assert!(FieldType::Float32.is_numeric());
        assert!(!FieldType::String.is_numeric());
        assert!(!FieldType::Bool.is_numeric());
    }

    #[test]
    fn test_int_bounds() {
        assert_eq!(FieldType::Int8.int_bounds(), Some((-128, 127)));
        assert_eq!(FieldType::Uint16.int_bounds(), Some((0, 65535)));
        assert_eq!(FieldType::Float64.int_bounds(), None);
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&FieldType::Uint32).unwrap();
        assert_eq!(json, "\"uint32\"");
        let back: FieldType = serde_json::from_str("\"json\"").unwrap();
        assert_eq!(back, FieldType::Json);
    }
}
