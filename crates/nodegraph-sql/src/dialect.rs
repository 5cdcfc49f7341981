//! SQL dialects.
//!
//! Every syntax difference between the supported engines lives in this
//! file. The rest of the workspace asks the dialect how to quote, bind,
//! paginate or test JSON and never matches on it.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::builder::Builder;
use crate::expr::{Column, JsonOp};
use crate::value::Value;

/// A target SQL engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    Sqlite,
    Postgres,
    #[serde(rename = "mysql")]
    MySql,
}

/// How a dialect reports the ids of freshly inserted rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertIds {
    /// `INSERT ... RETURNING id` yields one row per inserted node.
    Returning,
    /// The last-insert id is the id of the first row of a batch.
    FirstOfBatch,
    /// The last-insert id is the id of the last row of a batch.
    LastOfBatch,
}

impl Dialect {
    /// Dialect name as used by driver registries.
    pub fn name(&self) -> &'static str {
        match self {
            Dialect::Sqlite => "sqlite3",
            Dialect::Postgres => "postgres",
            Dialect::MySql => "mysql",
        }
    }

    /// Append a quoted identifier to `buf`.
    pub fn quote_into(&self, buf: &mut String, ident: &str) {
        let q = match self {
            Dialect::MySql => '`',
            Dialect::Sqlite | Dialect::Postgres => '"',
        };
        buf.push(q);
        for c in ident.chars() {
            if c == q {
                buf.push(q);
            }
            buf.push(c);
        }
        buf.push(q);
    }

    /// Quote a single identifier.
    pub fn quote(&self, ident: &str) -> String {
        let mut buf = String::with_capacity(ident.len() + 2);
        self.quote_into(&mut buf, ident);
        buf
    }

    /// Append the placeholder for the `index`th argument (1-based).
    pub fn placeholder_into(&self, buf: &mut String, index: usize) {
        match self {
            Dialect::Postgres => {
                buf.push('$');
                buf.push_str(&index.to_string());
            }
            Dialect::Sqlite | Dialect::MySql => buf.push('?'),
        }
    }

    /// The row count to emit when a query has an offset but no limit.
    ///
    /// `None` means the dialect accepts a bare `OFFSET`.
    pub fn no_limit(&self) -> Option<&'static str> {
        match self {
            Dialect::Postgres => None,
            Dialect::Sqlite => Some("-1"),
            Dialect::MySql => Some("18446744073709551615"),
        }
    }

    /// How inserted ids are reported back.
    pub fn insert_ids(&self) -> InsertIds {
        match self {
            Dialect::Postgres => InsertIds::Returning,
            Dialect::MySql => InsertIds::FirstOfBatch,
            Dialect::Sqlite => InsertIds::LastOfBatch,
        }
    }

    /// Whether an `IN (subquery)` carrying a LIMIT must be wrapped in a
    /// derived table. MySQL rejects LIMIT directly inside IN.
    pub fn wraps_limited_in_select(&self) -> bool {
        matches!(self, Dialect::MySql)
    }

    /// Tail of an INSERT that provides no column values.
    pub fn default_values(&self) -> &'static str {
        match self {
            Dialect::MySql => "() VALUES ()",
            Dialect::Sqlite | Dialect::Postgres => "DEFAULT VALUES",
        }
    }

    /// ESCAPE clause that makes `\` the LIKE escape character.
    pub fn like_escape(&self) -> &'static str {
        match self {
            Dialect::MySql => " ESCAPE '\\\\'",
            Dialect::Sqlite | Dialect::Postgres => " ESCAPE '\\'",
        }
    }

    /// Returns true if `message` reports a uniqueness violation.
    pub fn is_unique_violation(&self, message: &str) -> bool {
        match self {
            Dialect::Sqlite => message.contains("UNIQUE constraint failed"),
            Dialect::Postgres => message.contains("violates unique constraint"),
            Dialect::MySql => message.contains("Error 1062") || message.contains("Duplicate entry"),
        }
    }

    /// Returns true if `message` reports a foreign-key violation.
    pub fn is_foreign_key_violation(&self, message: &str) -> bool {
        match self {
            Dialect::Sqlite => message.contains("FOREIGN KEY constraint failed"),
            Dialect::Postgres => message.contains("violates foreign key constraint"),
            Dialect::MySql => {
                message.contains("Error 1451")
                    || message.contains("Error 1452")
                    || message.contains("foreign key constraint fails")
            }
        }
    }

    /// Returns true if `message` reports a CHECK constraint violation.
    pub fn is_check_violation(&self, message: &str) -> bool {
        match self {
            Dialect::Sqlite => message.contains("CHECK constraint failed"),
            Dialect::Postgres => message.contains("violates check constraint"),
            Dialect::MySql => message.contains("Error 3819"),
        }
    }

    /// Returns true if `message` reports any constraint violation.
    pub fn is_constraint_violation(&self, message: &str) -> bool {
        self.is_unique_violation(message)
            || self.is_foreign_key_violation(message)
            || self.is_check_violation(message)
    }

    /// Render a JSON predicate on `column` at `path`.
    pub(crate) fn render_json(&self, b: &mut Builder, column: &Column, path: &[String], op: &JsonOp) {
        match self {
            Dialect::Postgres => postgres_json(b, column, path, op),
            Dialect::MySql => mysql_json(b, column, path, op),
            Dialect::Sqlite => sqlite_json(b, column, path, op),
        }
    }
}

fn postgres_json(b: &mut Builder, column: &Column, path: &[String], op: &JsonOp) {
    match op {
        JsonOp::Compare(cmp, value) => {
            let (parents, last) = match path.split_last() {
                Some((last, parents)) => (parents, Some(last)),
                None => (path, None),
            };
            let cast = match value {
                Value::Int64(_) | Value::UInt64(_) | Value::Float64(_) => Some("numeric"),
                Value::Bool(_) => Some("boolean"),
                _ => None,
            };
            let as_text = cast.is_some() || matches!(value, Value::String(_));
            match last {
                Some(last) if as_text => {
                    if cast.is_some() {
                        b.push("(");
                    }
                    b.column(column);
                    for seg in parents {
                        b.push("->");
                        pg_segment(b, seg);
                    }
                    b.push("->>");
                    pg_segment(b, last);
                    if let Some(cast) = cast {
                        b.push(")::").push(cast);
                    }
                    b.push(" ").push(cmp.as_str()).push(" ");
                    b.arg(value.clone());
                }
                _ => {
                    b.column(column);
                    for seg in path {
                        b.push("->");
                        pg_segment(b, seg);
                    }
                    b.push(" ").push(cmp.as_str()).push(" ");
                    b.arg(Value::String(json_text(value)));
                    b.push("::jsonb");
                }
            }
        }
        JsonOp::HasKey => {
            b.push("(");
            b.column(column);
            b.push(" #> ");
            pg_path_literal(b, path);
            b.push(") IS NOT NULL");
        }
        JsonOp::Contains(value) => {
            b.push("(");
            b.column(column);
            if !path.is_empty() {
                b.push(" #> ");
                pg_path_literal(b, path);
            }
            b.push(") @> ");
            b.arg(Value::String(format!("[{}]", json_text(value))));
            b.push("::jsonb");
        }
    }
}

fn pg_segment(b: &mut Builder, seg: &str) {
    if seg.parse::<usize>().is_ok() {
        b.push(seg);
    } else {
        string_literal(b, seg);
    }
}

fn pg_path_literal(b: &mut Builder, path: &[String]) {
    let inner = path
        .iter()
        .map(|s| {
            if s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                s.clone()
            } else {
                format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
            }
        })
        .collect::<Vec<_>>()
        .join(",");
    string_literal(b, &format!("{{{inner}}}"));
}

fn mysql_json(b: &mut Builder, column: &Column, path: &[String], op: &JsonOp) {
    match op {
        JsonOp::Compare(cmp, value) => {
            let unquote = matches!(value, Value::String(_));
            if unquote {
                b.push("JSON_UNQUOTE(");
            }
            b.push("JSON_EXTRACT(");
            b.column(column);
            b.push(", ");
            json_path_literal(b, path);
            b.push(")");
            if unquote {
                b.push(")");
            }
            b.push(" ").push(cmp.as_str()).push(" ");
            match value {
                Value::Json(_) | Value::Null => {
                    b.push("CAST(");
                    b.arg(Value::String(json_text(value)));
                    b.push(" AS JSON)");
                }
                _ => {
                    b.arg(value.clone());
                }
            }
        }
        JsonOp::HasKey => {
            b.push("JSON_CONTAINS_PATH(");
            b.column(column);
            b.push(", 'one', ");
            json_path_literal(b, path);
            b.push(")");
        }
        JsonOp::Contains(value) => {
            b.push("JSON_CONTAINS(");
            b.column(column);
            b.push(", ");
            b.arg(Value::String(json_text(value)));
            b.push(", ");
            json_path_literal(b, path);
            b.push(")");
        }
    }
}

fn sqlite_json(b: &mut Builder, column: &Column, path: &[String], op: &JsonOp) {
    match op {
        JsonOp::Compare(cmp, value) => {
            b.push("json_extract(");
            b.column(column);
            b.push(", ");
            json_path_literal(b, path);
            b.push(") ").push(cmp.as_str()).push(" ");
            match value {
                Value::Json(_) => {
                    b.push("json(");
                    b.arg(Value::String(json_text(value)));
                    b.push(")");
                }
                Value::Bool(v) => {
                    b.arg(Value::Int64(*v as i64));
                }
                _ => {
                    b.arg(value.clone());
                }
            }
        }
        JsonOp::HasKey => {
            b.push("json_type(");
            b.column(column);
            b.push(", ");
            json_path_literal(b, path);
            b.push(") IS NOT NULL");
        }
        JsonOp::Contains(value) => {
            b.push("EXISTS (SELECT 1 FROM json_each(");
            b.column(column);
            b.push(", ");
            json_path_literal(b, path);
            b.push(") WHERE json_each.value = ");
            match value {
                Value::Bool(v) => b.arg(Value::Int64(*v as i64)),
                other => b.arg(other.clone()),
            };
            b.push(")");
        }
    }
}

/// `$.a[0]."b c"` style path used by MySQL and SQLite.
fn json_path_literal(b: &mut Builder, path: &[String]) {
    let mut p = String::from("$");
    for seg in path {
        if seg.parse::<usize>().is_ok() {
            p.push('[');
            p.push_str(seg);
            p.push(']');
        } else if seg.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            p.push('.');
            p.push_str(seg);
        } else {
            p.push_str(".\"");
            p.push_str(&seg.replace('"', "\\\""));
            p.push('"');
        }
    }
    string_literal(b, &p);
}

fn string_literal(b: &mut Builder, s: &str) {
    b.push("'").push(&s.replace('\'', "''")).push("'");
}

fn json_text(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(v) => v.to_string(),
        Value::Int64(n) => n.to_string(),
        Value::UInt64(n) => n.to_string(),
        Value::Float64(f) => serde_json::Value::from(*f).to_string(),
        Value::String(s) => serde_json::Value::String(s.clone()).to_string(),
        Value::Json(j) => j.to_string(),
        Value::Bytes(b) => serde_json::Value::String(hex::encode(b)).to_string(),
        Value::Time(t) => serde_json::Value::String(t.to_rfc3339()).to_string(),
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Dialect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sqlite" | "sqlite3" => Ok(Dialect::Sqlite),
            "postgres" | "postgresql" | "pgx" => Ok(Dialect::Postgres),
            "mysql" => Ok(Dialect::MySql),
            other => Err(format!("unsupported dialect {other:?}")),
        }
    }
}
