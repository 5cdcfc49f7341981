//! Conversions between nodegraph values and SQLite storage classes.

use chrono::SecondsFormat;
use nodegraph_sql::Value;
use rusqlite::types::{ToSql, ToSqlOutput, Value as SqlValue, ValueRef};

/// A value bound as a statement parameter.
///
/// SQLite has no boolean or timestamp class: booleans bind as 0/1 and
/// timestamps as RFC 3339 text in UTC, which sorts chronologically.
pub(crate) struct Arg<'a>(pub(crate) &'a Value);

impl ToSql for Arg<'_> {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self.0 {
            Value::Null => ToSqlOutput::Owned(SqlValue::Null),
            Value::Bool(b) => ToSqlOutput::Owned(SqlValue::Integer(i64::from(*b))),
            Value::Int64(n) => ToSqlOutput::Owned(SqlValue::Integer(*n)),
            Value::UInt64(n) => {
                let n = i64::try_from(*n).map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
                ToSqlOutput::Owned(SqlValue::Integer(n))
            }
            Value::Float64(f) => ToSqlOutput::Owned(SqlValue::Real(*f)),
            Value::String(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Value::Bytes(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b)),
            Value::Time(t) => ToSqlOutput::Owned(SqlValue::Text(t.to_rfc3339_opts(SecondsFormat::Micros, true))),
            Value::Json(j) => ToSqlOutput::Owned(SqlValue::Text(j.to_string())),
        })
    }
}

/// Read a column as the closest nodegraph value. The executor coerces it
/// to the field type afterwards.
pub(crate) fn from_sql(v: ValueRef<'_>) -> Result<Value, String> {
    Ok(match v {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(n) => Value::Int64(n),
        ValueRef::Real(f) => Value::Float64(f),
        ValueRef::Text(t) => Value::String(
            std::str::from_utf8(t)
                .map_err(|e| format!("invalid UTF-8 in text column: {e}"))?
                .to_string(),
        ),
        ValueRef::Blob(b) => Value::Bytes(b.to_vec()),
    })
}
