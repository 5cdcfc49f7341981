//! The SELECT statement builder.

use crate::builder::Builder;
use crate::dialect::Dialect;
use crate::expr::{Column, Expr};
use crate::value::Value;

/// What a selector reads from.
#[derive(Debug, Clone, PartialEq)]
pub enum Source {
    Table { name: String, alias: Option<String> },
    Select { select: Box<Selector>, alias: String },
}

/// Aggregate functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFunc {
    Count,
    Sum,
    Min,
    Max,
    Mean,
}

impl AggregateFunc {
    fn sql(&self) -> &'static str {
        match self {
            AggregateFunc::Count => "COUNT",
            AggregateFunc::Sum => "SUM",
            AggregateFunc::Min => "MIN",
            AggregateFunc::Max => "MAX",
            AggregateFunc::Mean => "AVG",
        }
    }

    /// Default result column name.
    pub fn name(&self) -> &'static str {
        match self {
            AggregateFunc::Count => "count",
            AggregateFunc::Sum => "sum",
            AggregateFunc::Min => "min",
            AggregateFunc::Max => "max",
            AggregateFunc::Mean => "mean",
        }
    }
}

/// One item of the select list.
#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    Column(Column),
    /// `FUNC(column) AS alias`; a count without column is `COUNT(*)`.
    Aggregate {
        func: AggregateFunc,
        column: Option<Column>,
        alias: Option<String>,
    },
    /// The literal `1`, used by existence checks.
    One,
}

/// An inner join.
#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub table: String,
    pub alias: Option<String>,
    pub on: Expr,
}

/// One ORDER BY term.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderTerm {
    pub column: Column,
    pub desc: bool,
}

/// A SELECT statement under construction.
///
/// Columns created with [`Selector::c`] are qualified by the table alias (or
/// name) so that selectors nest safely inside each other. Correlated
/// subqueries take fresh `tN` aliases from [`Selector::sub_select`].
#[derive(Debug, Clone, PartialEq)]
pub struct Selector {
    dialect: Dialect,
    from: Source,
    projection: Vec<Projection>,
    distinct: bool,
    joins: Vec<Join>,
    filter: Option<Expr>,
    group_by: Vec<Column>,
    order: Vec<OrderTerm>,
    limit: Option<u64>,
    offset: Option<u64>,
    depth: usize,
}

impl Selector {
    /// A selector reading from `table`.
    pub fn table(dialect: Dialect, table: impl Into<String>) -> Self {
        Self::from_source(
            dialect,
            Source::Table {
                name: table.into(),
                alias: None,
            },
            0,
        )
    }

    /// A selector reading from the derived table `select AS alias`.
    pub fn from_select(select: Selector, alias: impl Into<String>) -> Self {
        let dialect = select.dialect;
        let depth = select.depth;
        Self::from_source(
            dialect,
            Source::Select {
                select: Box::new(select),
                alias: alias.into(),
            },
            depth,
        )
    }

    fn from_source(dialect: Dialect, from: Source, depth: usize) -> Self {
        Self {
            dialect,
            from,
            projection: Vec::new(),
            distinct: false,
            joins: Vec::new(),
            filter: None,
            group_by: Vec::new(),
            order: Vec::new(),
            limit: None,
            offset: None,
            depth,
        }
    }

    /// Alias the source table.
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        match &mut self.from {
            Source::Table { alias: a, .. } => *a = Some(alias.into()),
            Source::Select { alias: a, .. } => *a = alias.into(),
        }
        self
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// The name columns of this selector are qualified with.
    pub fn table_ref(&self) -> &str {
        match &self.from {
            Source::Table {
                alias: Some(alias), ..
            } => alias,
            Source::Table { name, .. } => name,
            Source::Select { alias, .. } => alias,
        }
    }

    /// A column of the source, qualified.
    pub fn c(&self, name: &str) -> Column {
        Column::qualified(self.table_ref(), name)
    }

    /// Replace the select list with the given columns.
    pub fn select(&mut self, columns: Vec<Column>) -> &mut Self {
        self.projection = columns.into_iter().map(Projection::Column).collect();
        self
    }

    /// Replace the select list.
    pub fn set_projection(&mut self, projection: Vec<Projection>) -> &mut Self {
        self.projection = projection;
        self
    }

    /// Insert columns at the front of the select list.
    pub fn prepend_columns(&mut self, columns: Vec<Column>) -> &mut Self {
        let rest = std::mem::take(&mut self.projection);
        self.projection = columns.into_iter().map(Projection::Column).collect();
        self.projection.extend(rest);
        self
    }

    pub fn projection(&self) -> &[Projection] {
        &self.projection
    }

    pub fn set_distinct(&mut self, distinct: bool) -> &mut Self {
        self.distinct = distinct;
        self
    }

    pub fn is_distinct(&self) -> bool {
        self.distinct
    }

    /// AND a condition into the WHERE clause.
    pub fn where_(&mut self, e: Expr) -> &mut Self {
        self.filter = Some(match self.filter.take() {
            Some(existing) => Expr::and(vec![existing, e]),
            None => e,
        });
        self
    }

    pub fn filter(&self) -> Option<&Expr> {
        self.filter.as_ref()
    }

    /// Remove and return the WHERE clause.
    pub fn take_filter(&mut self) -> Option<Expr> {
        self.filter.take()
    }

    /// Add an inner join.
    pub fn join(&mut self, table: impl Into<String>, alias: Option<String>, on: Expr) -> &mut Self {
        self.joins.push(Join {
            table: table.into(),
            alias,
            on,
        });
        self
    }

    pub fn group_by(&mut self, columns: Vec<Column>) -> &mut Self {
        self.group_by = columns;
        self
    }

    pub fn order_by(&mut self, column: Column, desc: bool) -> &mut Self {
        self.order.push(OrderTerm { column, desc });
        self
    }

    pub fn order(&self) -> &[OrderTerm] {
        &self.order
    }

    pub fn clear_order(&mut self) -> &mut Self {
        self.order.clear();
        self
    }

    pub fn set_limit(&mut self, limit: Option<u64>) -> &mut Self {
        self.limit = limit;
        self
    }

    pub fn set_offset(&mut self, offset: Option<u64>) -> &mut Self {
        self.offset = offset;
        self
    }

    pub fn limit(&self) -> Option<u64> {
        self.limit
    }

    pub fn offset(&self) -> Option<u64> {
        self.offset
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// A bare selector over the same source, used to render a predicate in
    /// isolation before merging its condition elsewhere.
    pub fn scratch(&self) -> Selector {
        Self::from_source(self.dialect, self.from.clone(), self.depth)
    }

    /// A selector over `table` one nesting level deeper, aliased `tN`.
    pub fn sub_select(&self, table: impl Into<String>) -> Selector {
        let depth = self.depth + 1;
        Self::from_source(
            self.dialect,
            Source::Table {
                name: table.into(),
                alias: Some(format!("t{depth}")),
            },
            depth,
        )
    }

    /// Render the statement.
    pub fn query(&self) -> (String, Vec<Value>) {
        let mut b = Builder::new(self.dialect);
        self.render(&mut b);
        b.finish()
    }

    pub(crate) fn render(&self, b: &mut Builder) {
        b.push("SELECT ");
        if self.distinct {
            b.push("DISTINCT ");
        }
        if self.projection.is_empty() {
            b.push("*");
        }
        for (i, p) in self.projection.iter().enumerate() {
            if i > 0 {
                b.push(", ");
            }
            match p {
                Projection::Column(c) => {
                    b.column(c);
                }
                Projection::Aggregate {
                    func,
                    column,
                    alias,
                } => {
                    b.push(func.sql()).push("(");
                    match column {
                        Some(c) => b.column(c),
                        None => b.push("*"),
                    };
                    b.push(")");
                    if let Some(alias) = alias {
                        b.push(" AS ").ident(alias);
                    }
                }
                Projection::One => {
                    b.push("1");
                }
            }
        }
        b.push(" FROM ");
        match &self.from {
            Source::Table { name, alias } => {
                b.ident(name);
                if let Some(alias) = alias {
                    b.push(" AS ").ident(alias);
                }
            }
            Source::Select { select, alias } => {
                b.nested(select).push(" AS ").ident(alias);
            }
        }
        for join in &self.joins {
            b.push(" JOIN ").ident(&join.table);
            if let Some(alias) = &join.alias {
                b.push(" AS ").ident(alias);
            }
            b.push(" ON ").expr(&join.on);
        }
        if let Some(filter) = &self.filter {
            b.push(" WHERE ").expr(filter);
        }
        if !self.group_by.is_empty() {
            b.push(" GROUP BY ");
            for (i, c) in self.group_by.iter().enumerate() {
                if i > 0 {
                    b.push(", ");
                }
                b.column(c);
            }
        }
        if !self.order.is_empty() {
            b.push(" ORDER BY ");
            for (i, term) in self.order.iter().enumerate() {
                if i > 0 {
                    b.push(", ");
                }
                b.column(&term.column);
                if term.desc {
                    b.push(" DESC");
                }
            }
        }
        match (self.limit, self.offset) {
            (Some(limit), _) => {
                b.push(" LIMIT ").push(&limit.to_string());
            }
            (None, Some(_)) => {
                if let Some(all) = self.dialect.no_limit() {
                    b.push(" LIMIT ").push(all);
                }
            }
            (None, None) => {}
        }
        if let Some(offset) = self.offset {
            b.push(" OFFSET ").push(&offset.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn users(dialect: Dialect) -> Selector {
        let mut s = Selector::table(dialect, "users");
        let cols = vec![s.c("id"), s.c("name")];
        s.select(cols);
        s
    }

    #[test]
    fn test_basic_select() {
        let mut s = users(Dialect::Sqlite);
        let name = s.c("name");
        s.where_(Expr::eq(name.clone(), "a"))
            .order_by(name, true)
            .set_limit(Some(10));
        let (sql, args) = s.query();
        assert_eq!(
            sql,
            "SELECT \"users\".\"id\", \"users\".\"name\" FROM \"users\" WHERE \"users\".\"name\" = ? ORDER BY \"users\".\"name\" DESC LIMIT 10"
        );
        assert_eq!(args, vec![Value::from("a")]);
    }

    #[test]
    fn test_offset_without_limit() {
        let mut s = Selector::table(Dialect::Sqlite, "users");
        s.set_offset(Some(5));
        assert_eq!(s.query().0, "SELECT * FROM \"users\" LIMIT -1 OFFSET 5");

        let mut s = Selector::table(Dialect::Postgres, "users");
        s.set_offset(Some(5));
        assert_eq!(s.query().0, "SELECT * FROM \"users\" OFFSET 5");

        let mut s = Selector::table(Dialect::MySql, "users");
        s.set_offset(Some(5));
        assert_eq!(
            s.query().0,
            "SELECT * FROM `users` LIMIT 18446744073709551615 OFFSET 5"
        );
    }

    #[test]
    fn test_where_combines_with_and() {
        let mut s = Selector::table(Dialect::Postgres, "users");
        let (a, b) = (s.c("a"), s.c("b"));
        s.where_(Expr::eq(a, 1)).where_(Expr::eq(b, 2));
        assert_eq!(
            s.query().0,
            "SELECT * FROM \"users\" WHERE \"users\".\"a\" = $1 AND \"users\".\"b\" = $2"
        );
    }

    #[test]
    fn test_sub_select_aliases() {
        let s = Selector::table(Dialect::Sqlite, "users");
        let inner = s.sub_select("pets");
        assert_eq!(inner.table_ref(), "t1");
        assert_eq!(inner.sub_select("groups").table_ref(), "t2");
        assert_eq!(s.scratch().table_ref(), "users");
    }

    #[test]
    fn test_nested_in_select_numbering() {
        let mut inner = Selector::table(Dialect::Postgres, "pets");
        let (owner, name) = (inner.c("owner_id"), inner.c("name"));
        inner.select(vec![owner]).where_(Expr::eq(name, "x"));

        let mut outer = Selector::table(Dialect::Postgres, "users");
        let (id, age) = (outer.c("id"), outer.c("age"));
        outer
            .where_(Expr::eq(age, 3))
            .where_(Expr::in_select(id, inner));
        assert_eq!(
            outer.query().0,
            "SELECT * FROM \"users\" WHERE \"users\".\"age\" = $1 AND \"users\".\"id\" IN (SELECT \"pets\".\"owner_id\" FROM \"pets\" WHERE \"pets\".\"name\" = $2)"
        );
    }

    #[test]
    fn test_mysql_wraps_limited_in_select() {
        let mut inner = Selector::table(Dialect::MySql, "users");
        let id = inner.c("id");
        inner.select(vec![id]).set_limit(Some(2));
        let mut outer = Selector::table(Dialect::MySql, "pets");
        let owner = outer.c("owner_id");
        outer.where_(Expr::in_select(owner, inner));
        assert_eq!(
            outer.query().0,
            "SELECT * FROM `pets` WHERE `pets`.`owner_id` IN (SELECT * FROM (SELECT `users`.`id` FROM `users` LIMIT 2) AS `limited`)"
        );
    }

    #[test]
    fn test_aggregates_and_group_by() {
        let mut s = Selector::table(Dialect::Sqlite, "users");
        let (name, age) = (s.c("name"), s.c("age"));
        s.set_projection(vec![
            Projection::Column(name.clone()),
            Projection::Aggregate {
                func: AggregateFunc::Count,
                column: None,
                alias: Some("count".into()),
            },
            Projection::Aggregate {
                func: AggregateFunc::Mean,
                column: Some(age),
                alias: Some("mean".into()),
            },
        ])
        .group_by(vec![name]);
        assert_eq!(
            s.query().0,
            "SELECT \"users\".\"name\", COUNT(*) AS \"count\", AVG(\"users\".\"age\") AS \"mean\" FROM \"users\" GROUP BY \"users\".\"name\""
        );
    }

    #[test]
    fn test_join_and_derived_table() {
        let mut s = Selector::table(Dialect::Sqlite, "groups");
        let on = Expr::columns_eq(s.c("id"), Column::qualified("gu", "group_id"));
        s.join("group_users", Some("gu".into()), on)
            .set_distinct(true);
        let wrapped = {
            let mut w = Selector::from_select(s, "sub");
            w.set_projection(vec![Projection::Aggregate {
                func: AggregateFunc::Count,
                column: None,
                alias: None,
            }]);
            w
        };
        assert_eq!(
            wrapped.query().0,
            "SELECT COUNT(*) FROM (SELECT DISTINCT * FROM \"groups\" JOIN \"group_users\" AS \"gu\" ON \"groups\".\"id\" = \"gu\".\"group_id\") AS \"sub\""
        );
    }
}
