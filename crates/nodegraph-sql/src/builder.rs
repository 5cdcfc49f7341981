//! SQL text accumulator.

use crate::dialect::Dialect;
use crate::expr::{Column, Expr};
use crate::select::Selector;
use crate::value::Value;

/// Accumulates SQL text and its positional arguments.
///
/// Nested selectors render into the same builder so placeholder numbering
/// stays continuous across subqueries.
#[derive(Debug)]
pub struct Builder {
    dialect: Dialect,
    sql: String,
    args: Vec<Value>,
}

impl Builder {
    /// Create an empty builder for `dialect`.
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            sql: String::new(),
            args: Vec::new(),
        }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Append raw SQL text.
    pub fn push(&mut self, s: &str) -> &mut Self {
        self.sql.push_str(s);
        self
    }

    /// Append a quoted identifier.
    pub fn ident(&mut self, name: &str) -> &mut Self {
        self.dialect.quote_into(&mut self.sql, name);
        self
    }

    /// Append a comma-separated list of quoted identifiers.
    pub fn idents(&mut self, names: &[String]) -> &mut Self {
        for (i, name) in names.iter().enumerate() {
            if i > 0 {
                self.sql.push_str(", ");
            }
            self.ident(name);
        }
        self
    }

    /// Append a possibly qualified column.
    pub fn column(&mut self, column: &Column) -> &mut Self {
        if let Some(table) = &column.table {
            self.ident(table);
            self.sql.push('.');
        }
        self.ident(&column.name)
    }

    /// Bind one argument and append its placeholder.
    pub fn arg(&mut self, value: Value) -> &mut Self {
        self.args.push(value);
        let index = self.args.len();
        self.dialect.placeholder_into(&mut self.sql, index);
        self
    }

    /// Bind a comma-separated argument list.
    pub fn args(&mut self, values: &[Value]) -> &mut Self {
        for (i, v) in values.iter().enumerate() {
            if i > 0 {
                self.sql.push_str(", ");
            }
            self.arg(v.clone());
        }
        self
    }

    /// Append a condition.
    pub fn expr(&mut self, e: &Expr) -> &mut Self {
        e.render(self);
        self
    }

    /// Append a parenthesized subquery.
    pub fn nested(&mut self, select: &Selector) -> &mut Self {
        self.sql.push('(');
        select.render(self);
        self.sql.push(')');
        self
    }

    /// Consume the builder, returning the SQL text and its arguments.
    pub fn finish(self) -> (String, Vec<Value>) {
        (self.sql, self.args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_postgres_numbering_continues() {
        let mut b = Builder::new(Dialect::Postgres);
        b.push("a = ").arg(1.into()).push(" AND b IN (");
        b.args(&[2.into(), 3.into()]).push(")");
        let (sql, args) = b.finish();
        assert_eq!(sql, "a = $1 AND b IN ($2, $3)");
        assert_eq!(args, vec![Value::Int64(1), Value::Int64(2), Value::Int64(3)]);
    }

    #[test]
    fn test_qualified_column() {
        let mut b = Builder::new(Dialect::MySql);
        b.column(&Column::qualified("t1", "owner_id"));
        assert_eq!(b.finish().0, "`t1`.`owner_id`");
    }
}
