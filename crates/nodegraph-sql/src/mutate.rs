//! INSERT, UPDATE and DELETE statement builders.

use crate::builder::Builder;
use crate::dialect::Dialect;
use crate::expr::Expr;
use crate::value::Value;

/// The right-hand side of one `SET` assignment.
#[derive(Debug, Clone, PartialEq)]
pub enum SetValue {
    /// `col = ?`
    Value(Value),
    /// `col = COALESCE(col, 0) + ?`
    Add(Value),
    /// `col = NULL`
    Null,
}

/// An UPDATE statement under construction.
///
/// Each column appears at most once; setting a column again replaces the
/// earlier assignment while keeping its position.
#[derive(Debug, Clone)]
pub struct UpdateBuilder {
    dialect: Dialect,
    table: String,
    sets: Vec<(String, SetValue)>,
    filter: Option<Expr>,
}

impl UpdateBuilder {
    pub fn new(dialect: Dialect, table: impl Into<String>) -> Self {
        Self {
            dialect,
            table: table.into(),
            sets: Vec::new(),
            filter: None,
        }
    }

    fn put(&mut self, column: &str, value: SetValue) -> &mut Self {
        match self.sets.iter_mut().find(|(c, _)| c == column) {
            Some((_, existing)) => *existing = value,
            None => self.sets.push((column.to_string(), value)),
        }
        self
    }

    pub fn set(&mut self, column: &str, value: Value) -> &mut Self {
        self.put(column, SetValue::Value(value))
    }

    pub fn add(&mut self, column: &str, delta: Value) -> &mut Self {
        self.put(column, SetValue::Add(delta))
    }

    pub fn set_null(&mut self, column: &str) -> &mut Self {
        self.put(column, SetValue::Null)
    }

    pub fn filter(&mut self, e: Option<Expr>) -> &mut Self {
        self.filter = e;
        self
    }

    /// True when there is nothing to assign.
    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    pub fn query(&self) -> (String, Vec<Value>) {
        let mut b = Builder::new(self.dialect);
        b.push("UPDATE ").ident(&self.table).push(" SET ");
        for (i, (column, value)) in self.sets.iter().enumerate() {
            if i > 0 {
                b.push(", ");
            }
            b.ident(column).push(" = ");
            match value {
                SetValue::Value(v) => {
                    b.arg(v.clone());
                }
                SetValue::Add(delta) => {
                    b.push("COALESCE(").ident(column).push(", 0) + ");
                    b.arg(delta.clone());
                }
                SetValue::Null => {
                    b.push("NULL");
                }
            }
        }
        if let Some(filter) = &self.filter {
            b.push(" WHERE ").expr(filter);
        }
        b.finish()
    }
}

/// An INSERT statement with one or more rows.
#[derive(Debug, Clone)]
pub struct InsertBuilder {
    dialect: Dialect,
    table: String,
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
    returning: Option<String>,
}

impl InsertBuilder {
    pub fn new(dialect: Dialect, table: impl Into<String>) -> Self {
        Self {
            dialect,
            table: table.into(),
            columns: Vec::new(),
            rows: Vec::new(),
            returning: None,
        }
    }

    pub fn columns(&mut self, columns: Vec<String>) -> &mut Self {
        self.columns = columns;
        self
    }

    /// Append a row; its length must match the column list.
    pub fn values(&mut self, row: Vec<Value>) -> &mut Self {
        self.rows.push(row);
        self
    }

    pub fn returning(&mut self, column: impl Into<String>) -> &mut Self {
        self.returning = Some(column.into());
        self
    }

    pub fn query(&self) -> (String, Vec<Value>) {
        let mut b = Builder::new(self.dialect);
        b.push("INSERT INTO ").ident(&self.table).push(" ");
        if self.columns.is_empty() {
            b.push(self.dialect.default_values());
        } else {
            b.push("(").idents(&self.columns).push(") VALUES ");
            for (i, row) in self.rows.iter().enumerate() {
                if i > 0 {
                    b.push(", ");
                }
                b.push("(").args(row).push(")");
            }
        }
        if let Some(column) = &self.returning {
            b.push(" RETURNING ").ident(column);
        }
        b.finish()
    }
}

/// A DELETE statement.
#[derive(Debug, Clone)]
pub struct DeleteBuilder {
    dialect: Dialect,
    table: String,
    filter: Option<Expr>,
}

impl DeleteBuilder {
    pub fn new(dialect: Dialect, table: impl Into<String>) -> Self {
        Self {
            dialect,
            table: table.into(),
            filter: None,
        }
    }

    pub fn filter(&mut self, e: Option<Expr>) -> &mut Self {
        self.filter = e;
        self
    }

    pub fn query(&self) -> (String, Vec<Value>) {
        let mut b = Builder::new(self.dialect);
        b.push("DELETE FROM ").ident(&self.table);
        if let Some(filter) = &self.filter {
            b.push(" WHERE ").expr(filter);
        }
        b.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Column;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_update_assignments() {
        let mut u = UpdateBuilder::new(Dialect::Postgres, "users");
        u.set("name", "a".into())
            .add("age", 2.into())
            .set_null("nickname")
            .filter(Some(Expr::eq(Column::qualified("users", "id"), 7)));
        let (sql, args) = u.query();
        assert_eq!(
            sql,
            "UPDATE \"users\" SET \"name\" = $1, \"age\" = COALESCE(\"age\", 0) + $2, \"nickname\" = NULL WHERE \"users\".\"id\" = $3"
        );
        assert_eq!(args, vec![Value::from("a"), Value::from(2), Value::from(7)]);
    }

    #[test]
    fn test_update_last_assignment_wins() {
        let mut u = UpdateBuilder::new(Dialect::Sqlite, "users");
        u.set_null("nickname").set("nickname", "x".into());
        assert_eq!(u.query().0, "UPDATE \"users\" SET \"nickname\" = ?");
        u.set_null("nickname");
        assert_eq!(u.query().0, "UPDATE \"users\" SET \"nickname\" = NULL");
    }

    #[test]
    fn test_multi_row_insert() {
        let mut i = InsertBuilder::new(Dialect::Postgres, "users");
        i.columns(vec!["name".into(), "age".into()])
            .values(vec!["a".into(), 1.into()])
            .values(vec!["b".into(), 2.into()])
            .returning("id");
        assert_eq!(
            i.query().0,
            "INSERT INTO \"users\" (\"name\", \"age\") VALUES ($1, $2), ($3, $4) RETURNING \"id\""
        );
    }

    #[test]
    fn test_insert_default_values() {
        let i = InsertBuilder::new(Dialect::MySql, "users");
        assert_eq!(i.query().0, "INSERT INTO `users` () VALUES ()");
        let i = InsertBuilder::new(Dialect::Sqlite, "users");
        assert_eq!(i.query().0, "INSERT INTO \"users\" DEFAULT VALUES");
    }

    #[test]
    fn test_delete() {
        let mut d = DeleteBuilder::new(Dialect::Sqlite, "users");
        d.filter(Some(Expr::in_values(
            Column::qualified("users", "id"),
            vec![1.into(), 2.into()],
        )));
        assert_eq!(
            d.query().0,
            "DELETE FROM \"users\" WHERE \"users\".\"id\" IN (?, ?)"
        );
    }
}
