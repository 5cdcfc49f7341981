//! Boolean condition expressions.

use crate::builder::Builder;
use crate::select::Selector;
use crate::value::Value;

/// A column reference, optionally qualified by a table name or alias.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Column {
    pub table: Option<String>,
    pub name: String,
}

impl Column {
    /// An unqualified column.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            table: None,
            name: name.into(),
        }
    }

    /// A column qualified by `table`.
    pub fn qualified(table: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            table: Some(table.into()),
            name: name.into(),
        }
    }
}

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

impl CmpOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            CmpOp::Eq => "=",
            CmpOp::Ne => "<>",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
        }
    }
}

/// Operations on a value inside a JSON column.
#[derive(Debug, Clone, PartialEq)]
pub enum JsonOp {
    /// Compare the value at the path.
    Compare(CmpOp, Value),
    /// The path exists in the document.
    HasKey,
    /// The array at the path contains the value.
    Contains(Value),
}

/// A boolean SQL condition.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Compare {
        column: Column,
        op: CmpOp,
        value: Value,
    },
    CompareColumns {
        left: Column,
        op: CmpOp,
        right: Column,
    },
    In {
        column: Column,
        values: Vec<Value>,
        negated: bool,
    },
    InSelect {
        column: Column,
        select: Box<Selector>,
        negated: bool,
    },
    Null {
        column: Column,
        negated: bool,
    },
    /// `LIKE` against an already escaped pattern.
    Like {
        column: Column,
        pattern: String,
        fold: bool,
    },
    Json {
        column: Column,
        path: Vec<String>,
        op: JsonOp,
    },
    Exists {
        select: Box<Selector>,
        negated: bool,
    },
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Not(Box<Expr>),
    /// A constant condition.
    Bool(bool),
}

/// Escape LIKE wildcards in `s` with `\`.
pub fn like_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

impl Expr {
    pub fn cmp(column: Column, op: CmpOp, value: impl Into<Value>) -> Self {
        Expr::Compare {
            column,
            op,
            value: value.into(),
        }
    }

    pub fn eq(column: Column, value: impl Into<Value>) -> Self {
        Self::cmp(column, CmpOp::Eq, value)
    }

    pub fn columns_eq(left: Column, right: Column) -> Self {
        Expr::CompareColumns {
            left,
            op: CmpOp::Eq,
            right,
        }
    }

    /// `column IN (values)`. An empty set never matches.
    pub fn in_values(column: Column, values: Vec<Value>) -> Self {
        if values.is_empty() {
            return Expr::Bool(false);
        }
        Expr::In {
            column,
            values,
            negated: false,
        }
    }

    /// `column NOT IN (values)`. An empty set always matches.
    pub fn not_in_values(column: Column, values: Vec<Value>) -> Self {
        if values.is_empty() {
            return Expr::Bool(true);
        }
        Expr::In {
            column,
            values,
            negated: true,
        }
    }

    pub fn in_select(column: Column, select: Selector) -> Self {
        Expr::InSelect {
            column,
            select: Box::new(select),
            negated: false,
        }
    }

    pub fn is_null(column: Column) -> Self {
        Expr::Null {
            column,
            negated: false,
        }
    }

    pub fn not_null(column: Column) -> Self {
        Expr::Null {
            column,
            negated: true,
        }
    }

    pub fn contains(column: Column, s: &str) -> Self {
        Expr::Like {
            column,
            pattern: format!("%{}%", like_escape(s)),
            fold: false,
        }
    }

    pub fn contains_fold(column: Column, s: &str) -> Self {
        Expr::Like {
            column,
            pattern: format!("%{}%", like_escape(&s.to_lowercase())),
            fold: true,
        }
    }

    pub fn has_prefix(column: Column, s: &str) -> Self {
        Expr::Like {
            column,
            pattern: format!("{}%", like_escape(s)),
            fold: false,
        }
    }

    pub fn has_suffix(column: Column, s: &str) -> Self {
        Expr::Like {
            column,
            pattern: format!("%{}", like_escape(s)),
            fold: false,
        }
    }

    pub fn equal_fold(column: Column, s: &str) -> Self {
        Expr::Like {
            column,
            pattern: like_escape(&s.to_lowercase()),
            fold: true,
        }
    }

    pub fn json(column: Column, path: Vec<String>, op: JsonOp) -> Self {
        Expr::Json { column, path, op }
    }

    pub fn exists(select: Selector) -> Self {
        Expr::Exists {
            select: Box::new(select),
            negated: false,
        }
    }

    /// Conjunction, flattening nested conjunctions.
    pub fn and(exprs: Vec<Expr>) -> Self {
        let mut flat = Vec::with_capacity(exprs.len());
        for e in exprs {
            match e {
                Expr::And(inner) => flat.extend(inner),
                Expr::Bool(true) => {}
                other => flat.push(other),
            }
        }
        match flat.len() {
            0 => Expr::Bool(true),
            1 => flat.remove(0),
            _ => Expr::And(flat),
        }
    }

    /// Disjunction, flattening nested disjunctions.
    pub fn or(exprs: Vec<Expr>) -> Self {
        let mut flat = Vec::with_capacity(exprs.len());
        for e in exprs {
            match e {
                Expr::Or(inner) => flat.extend(inner),
                Expr::Bool(false) => {}
                other => flat.push(other),
            }
        }
        match flat.len() {
            0 => Expr::Bool(false),
            1 => flat.remove(0),
            _ => Expr::Or(flat),
        }
    }

    pub fn not(e: Expr) -> Self {
        match e {
            Expr::Bool(b) => Expr::Bool(!b),
            other => Expr::Not(Box::new(other)),
        }
    }

    pub(crate) fn render(&self, b: &mut Builder) {
        match self {
            Expr::Compare { column, op, value } => {
                b.column(column).push(" ").push(op.as_str()).push(" ");
                b.arg(value.clone());
            }
            Expr::CompareColumns { left, op, right } => {
                b.column(left).push(" ").push(op.as_str()).push(" ");
                b.column(right);
            }
            Expr::In {
                column,
                values,
                negated,
            } => {
                b.column(column);
                b.push(if *negated { " NOT IN (" } else { " IN (" });
                b.args(values);
                b.push(")");
            }
            Expr::InSelect {
                column,
                select,
                negated,
            } => {
                b.column(column);
                b.push(if *negated { " NOT IN " } else { " IN " });
                if select.limit().is_some() && b.dialect().wraps_limited_in_select() {
                    b.push("(SELECT * FROM ");
                    b.nested(select);
                    b.push(" AS ");
                    let alias = b.dialect().quote("limited");
                    b.push(&alias).push(")");
                } else {
                    b.nested(select);
                }
            }
            Expr::Null { column, negated } => {
                b.column(column);
                b.push(if *negated { " IS NOT NULL" } else { " IS NULL" });
            }
            Expr::Like {
                column,
                pattern,
                fold,
            } => {
                if *fold {
                    b.push("LOWER(").column(column).push(")");
                } else {
                    b.column(column);
                }
                b.push(" LIKE ");
                b.arg(Value::String(pattern.clone()));
                let escape = b.dialect().like_escape();
                b.push(escape);
            }
            Expr::Json { column, path, op } => {
                let dialect = b.dialect();
                dialect.render_json(b, column, path, op);
            }
            Expr::Exists { select, negated } => {
                b.push(if *negated { "NOT EXISTS " } else { "EXISTS " });
                b.nested(select);
            }
            Expr::And(exprs) => {
                for (i, e) in exprs.iter().enumerate() {
                    if i > 0 {
                        b.push(" AND ");
                    }
                    e.render_wrapped(b, matches!(e, Expr::Or(_)));
                }
            }
            Expr::Or(exprs) => {
                for (i, e) in exprs.iter().enumerate() {
                    if i > 0 {
                        b.push(" OR ");
                    }
                    e.render_wrapped(b, matches!(e, Expr::And(_)));
                }
            }
            Expr::Not(e) => {
                b.push("NOT (");
                e.render(b);
                b.push(")");
            }
            Expr::Bool(true) => {
                b.push("1 = 1");
            }
            Expr::Bool(false) => {
                b.push("1 = 0");
            }
        }
    }

    fn render_wrapped(&self, b: &mut Builder, wrap: bool) {
        if wrap {
            b.push("(");
        }
        self.render(b);
        if wrap {
            b.push(")");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::Dialect;
    use pretty_assertions::assert_eq;

    fn render(dialect: Dialect, e: &Expr) -> (String, Vec<Value>) {
        let mut b = Builder::new(dialect);
        e.render(&mut b);
        b.finish()
    }

    fn col(name: &str) -> Column {
        Column::qualified("users", name)
    }

    #[test]
    fn test_empty_in_is_false() {
        let e = Expr::in_values(col("id"), vec![]);
        assert_eq!(e, Expr::Bool(false));
        assert_eq!(render(Dialect::Sqlite, &e).0, "1 = 0");
        assert_eq!(
            Expr::not_in_values(col("id"), vec![]),
            Expr::Bool(true)
        );
    }

    #[test]
    fn test_in_placeholders() {
        let e = Expr::in_values(col("id"), vec![1.into(), 2.into(), 3.into()]);
        let (sql, args) = render(Dialect::Postgres, &e);
        assert_eq!(sql, "\"users\".\"id\" IN ($1, $2, $3)");
        assert_eq!(args.len(), 3);
    }

    #[test]
    fn test_and_or_precedence() {
        let e = Expr::and(vec![
            Expr::eq(col("a"), 1),
            Expr::or(vec![Expr::eq(col("b"), 2), Expr::eq(col("c"), 3)]),
        ]);
        let (sql, _) = render(Dialect::Sqlite, &e);
        assert_eq!(
            sql,
            "\"users\".\"a\" = ? AND (\"users\".\"b\" = ? OR \"users\".\"c\" = ?)"
        );
    }

    #[test]
    fn test_and_flattens() {
        let e = Expr::and(vec![
            Expr::and(vec![Expr::eq(col("a"), 1), Expr::eq(col("b"), 2)]),
            Expr::Bool(true),
            Expr::eq(col("c"), 3),
        ]);
        match e {
            Expr::And(inner) => assert_eq!(inner.len(), 3),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(Expr::and(vec![]), Expr::Bool(true));
        assert_eq!(Expr::or(vec![]), Expr::Bool(false));
    }

    #[test]
    fn test_like_escaping() {
        assert_eq!(like_escape("50%_off\\"), "50\\%\\_off\\\\");
        let (sql, args) = render(Dialect::Sqlite, &Expr::contains(col("name"), "a_b"));
        assert_eq!(sql, "\"users\".\"name\" LIKE ? ESCAPE '\\'");
        assert_eq!(args, vec![Value::from("%a\\_b%")]);

        let (sql, args) = render(Dialect::MySql, &Expr::equal_fold(col("name"), "AbC"));
        assert_eq!(sql, "LOWER(`users`.`name`) LIKE ? ESCAPE '\\\\'");
        assert_eq!(args, vec![Value::from("abc")]);
    }

    #[test]
    fn test_not_and_null() {
        let e = Expr::not(Expr::is_null(col("age")));
        assert_eq!(render(Dialect::Sqlite, &e).0, "NOT (\"users\".\"age\" IS NULL)");
        assert_eq!(Expr::not(Expr::Bool(false)), Expr::Bool(true));
    }
}
