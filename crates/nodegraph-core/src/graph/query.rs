//! Read execution: node scans, counts, existence checks and aggregates.

use nodegraph_sql::{AggregateFunc, Column, Dialect, FieldType, Projection, Selector, Value};

use crate::context::Context;
use crate::driver::{Driver, ExecResult, Rows};
use crate::error::Error;
use crate::graph::spec::QuerySpec;

/// Receives scanned rows.
///
/// The executor asks for the expected type of every projected column, runs
/// the query, coerces each cell to that type and hands the row over.
pub trait NodeSink {
    /// Storage kinds of `columns`, in order.
    fn scan_values(&self, columns: &[String]) -> Result<Vec<FieldType>, Error>;

    /// Accept one row whose values line up with `columns`.
    fn assign(&mut self, columns: &[String], values: Vec<Value>) -> Result<(), Error>;
}

/// One aggregate of an aggregate query.
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregate {
    pub func: AggregateFunc,
    /// `None` is only valid for counts.
    pub column: Option<String>,
    pub alias: String,
}

impl Aggregate {
    fn of(func: AggregateFunc, column: Option<&str>) -> Self {
        Self {
            func,
            column: column.map(str::to_string),
            alias: func.name().to_string(),
        }
    }

    /// `COUNT(*)`, aliased `count`.
    pub fn count() -> Self {
        Self::of(AggregateFunc::Count, None)
    }

    pub fn sum(column: &str) -> Self {
        Self::of(AggregateFunc::Sum, Some(column))
    }

    pub fn min(column: &str) -> Self {
        Self::of(AggregateFunc::Min, Some(column))
    }

    pub fn max(column: &str) -> Self {
        Self::of(AggregateFunc::Max, Some(column))
    }

    pub fn mean(column: &str) -> Self {
        Self::of(AggregateFunc::Mean, Some(column))
    }

    /// Rename the result column.
    pub fn alias(mut self, alias: &str) -> Self {
        self.alias = alias.to_string();
        self
    }
}

/// The selector a query spec compiles to.
pub fn selector(d: Dialect, spec: &QuerySpec) -> Selector {
    let mut s = match &spec.from {
        Some(from) => from.clone(),
        None => Selector::table(d, &spec.node.table),
    };
    let columns = spec.node.qualified(&s);
    s.select(columns);
    if spec.unique {
        s.set_distinct(true);
    }
    if let Some(p) = &spec.predicate {
        p.apply(&mut s);
    }
    for o in &spec.order {
        o.apply(&mut s);
    }
    for m in &spec.modifiers {
        m(&mut s);
    }
    if spec.limit.is_some() {
        s.set_limit(spec.limit);
    }
    if spec.offset.is_some() {
        s.set_offset(spec.offset);
    }
    s
}

/// Names of the projected columns, as a driver reports them.
pub(crate) fn projection_names(s: &Selector) -> Vec<String> {
    s.projection()
        .iter()
        .map(|p| match p {
            Projection::Column(c) => c.name.clone(),
            Projection::Aggregate {
                alias: Some(alias), ..
            } => alias.clone(),
            Projection::Aggregate { func, .. } => func.name().to_string(),
            Projection::One => "1".to_string(),
        })
        .collect()
}

pub(crate) fn run_query(ctx: &Context, drv: &dyn Driver, query: &str, args: &[Value]) -> Result<Rows, Error> {
    ctx.err()?;
    drv.query(ctx, query, args)
        .map_err(|e| Error::from_driver(drv.dialect(), e))
}

pub(crate) fn run_exec(ctx: &Context, drv: &dyn Driver, query: &str, args: &[Value]) -> Result<ExecResult, Error> {
    ctx.err()?;
    drv.exec(ctx, query, args)
        .map_err(|e| Error::from_driver(drv.dialect(), e))
}

/// Run a query spec, feeding every row to `sink`. Returns the row count.
pub fn query_nodes(ctx: &Context, drv: &dyn Driver, spec: &QuerySpec, sink: &mut dyn NodeSink) -> Result<usize, Error> {
    let s = selector(drv.dialect(), spec);
    scan(ctx, drv, &s, sink)
}

pub(crate) fn scan(ctx: &Context, drv: &dyn Driver, s: &Selector, sink: &mut dyn NodeSink) -> Result<usize, Error> {
    let columns = projection_names(s);
    let types = sink.scan_values(&columns)?;
    if types.len() != columns.len() {
        return Err(Error::ColumnMismatch {
            columns: columns.len(),
            values: types.len(),
        });
    }
    let (query, args) = s.query();
    let rows = run_query(ctx, drv, &query, &args)?;
    let n = rows.rows.len();
    for row in rows.rows {
        if row.len() != columns.len() {
            return Err(Error::ColumnMismatch {
                columns: columns.len(),
                values: row.len(),
            });
        }
        let values = row
            .into_iter()
            .zip(&types)
            .map(|(v, ty)| v.coerce(*ty))
            .collect::<Result<Vec<_>, _>>()?;
        sink.assign(&columns, values)?;
    }
    Ok(n)
}

fn first_int(rows: &Rows) -> Result<i64, Error> {
    let cell = rows
        .rows
        .first()
        .and_then(|r| r.first())
        .cloned()
        .unwrap_or(Value::Null);
    match cell.coerce(FieldType::Int64)? {
        Value::Int64(n) => Ok(n),
        _ => Ok(0),
    }
}

/// Count the nodes a spec selects.
///
/// A plain count is `COUNT(*)` over the filtered table. DISTINCT, limits and
/// offsets change what is being counted, so those specs are counted through
/// a derived table.
pub fn count_nodes(ctx: &Context, drv: &dyn Driver, spec: &QuerySpec) -> Result<usize, Error> {
    let count = Projection::Aggregate {
        func: AggregateFunc::Count,
        column: None,
        alias: None,
    };
    let mut s = selector(drv.dialect(), spec);
    let s = if spec.unique || spec.limit.is_some() || spec.offset.is_some() {
        // Count exactly the selected columns; DISTINCT applies to them.
        let columns = if spec.node.columns.is_empty() {
            vec![s.c(&spec.node.id.column)]
        } else {
            spec.node.columns.iter().map(|c| s.c(c)).collect()
        };
        s.select(columns);
        if spec.limit.is_none() {
            s.clear_order();
        }
        let mut outer = Selector::from_select(s, "sub");
        outer.set_projection(vec![count]);
        outer
    } else {
        s.set_projection(vec![count]);
        s.clear_order();
        s
    };
    let (query, args) = s.query();
    let rows = run_query(ctx, drv, &query, &args)?;
    Ok(first_int(&rows)?.max(0) as usize)
}

/// Whether the spec selects any node.
pub fn exist_nodes(ctx: &Context, drv: &dyn Driver, spec: &QuerySpec) -> Result<bool, Error> {
    let mut s = selector(drv.dialect(), spec);
    s.set_projection(vec![Projection::One]).set_distinct(false).clear_order();
    s.set_limit(Some(1));
    let (query, args) = s.query();
    let rows = run_query(ctx, drv, &query, &args)?;
    Ok(!rows.rows.is_empty())
}

/// Run grouped aggregates. Result columns are the group-by columns followed
/// by the aggregates, under their aliases.
pub fn aggregate_nodes(
    ctx: &Context,
    drv: &dyn Driver,
    spec: &QuerySpec,
    group_by: &[String],
    aggregates: &[Aggregate],
) -> Result<Rows, Error> {
    let mut s = selector(drv.dialect(), spec);
    let groups: Vec<Column> = group_by.iter().map(|c| s.c(c)).collect();
    let mut projection: Vec<Projection> = groups.iter().cloned().map(Projection::Column).collect();
    for a in aggregates {
        projection.push(Projection::Aggregate {
            func: a.func,
            column: a.column.as_deref().map(|c| s.c(c)),
            alias: Some(a.alias.clone()),
        });
    }
    s.set_projection(projection).set_distinct(false);
    if !groups.is_empty() {
        s.group_by(groups);
    }
    if spec.limit.is_none() {
        s.clear_order();
    }
    let (query, args) = s.query();
    let mut rows = run_query(ctx, drv, &query, &args)?;
    rows.columns = projection_names(&s);
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::spec::{FieldSpec, NodeSpec};
    use crate::predicate;
    use crate::testing::MockDriver;
    use pretty_assertions::assert_eq;

    fn users() -> QuerySpec {
        QuerySpec::new(NodeSpec {
            table: "users".into(),
            columns: vec!["id".into(), "name".into()],
            id: FieldSpec::new("id", FieldType::Int),
        })
    }

    struct Names(Vec<String>);

    impl NodeSink for Names {
        fn scan_values(&self, columns: &[String]) -> Result<Vec<FieldType>, Error> {
            Ok(columns
                .iter()
                .map(|c| if c == "id" { FieldType::Int } else { FieldType::String })
                .collect())
        }

        fn assign(&mut self, _columns: &[String], values: Vec<Value>) -> Result<(), Error> {
            self.0.push(values[1].as_str().unwrap_or_default().to_string());
            Ok(())
        }
    }

    #[test]
    fn test_query_nodes() {
        let drv = MockDriver::new(Dialect::Sqlite);
        drv.push_rows(vec![
            vec![Value::from(1), Value::from("a")],
            vec![Value::from(2), Value::from("b")],
        ]);
        let mut spec = users();
        spec.predicate = Some(predicate::eq("name", "a"));
        spec.order = vec![predicate::desc("id")];
        spec.limit = Some(2);

        let mut sink = Names(vec![]);
        let n = query_nodes(&Context::background(), &drv, &spec, &mut sink).unwrap();
        assert_eq!(n, 2);
        assert_eq!(sink.0, vec!["a", "b"]);
        assert_eq!(
            drv.statements(),
            vec![r#"SELECT "users"."id", "users"."name" FROM "users" WHERE "users"."name" = ? ORDER BY "users"."id" DESC LIMIT 2"#]
        );
    }

    #[test]
    fn test_row_width_mismatch() {
        let drv = MockDriver::new(Dialect::Sqlite);
        drv.push_rows(vec![vec![Value::from(1)]]);
        let err = query_nodes(&Context::background(), &drv, &users(), &mut Names(vec![])).unwrap_err();
        assert!(matches!(err, Error::ColumnMismatch { columns: 2, values: 1 }));
    }

    #[test]
    fn test_count_wraps_distinct() {
        let drv = MockDriver::new(Dialect::Sqlite);
        drv.push_rows(vec![vec![Value::from(3)]]);
        let mut spec = users();
        spec.unique = true;
        spec.node.columns = vec!["name".into()];
        let n = count_nodes(&Context::background(), &drv, &spec).unwrap();
        assert_eq!(n, 3);
        assert_eq!(
            drv.statements(),
            vec![r#"SELECT COUNT(*) FROM (SELECT DISTINCT "users"."name" FROM "users") AS "sub""#]
        );
    }

    #[test]
    fn test_plain_count() {
        let drv = MockDriver::new(Dialect::Postgres);
        drv.push_rows(vec![vec![Value::from(7)]]);
        let mut spec = users();
        spec.predicate = Some(predicate::gt("id", 1));
        spec.order = vec![predicate::asc("name")];
        assert_eq!(count_nodes(&Context::background(), &drv, &spec).unwrap(), 7);
        assert_eq!(
            drv.statements(),
            vec![r#"SELECT COUNT(*) FROM "users" WHERE "users"."id" > $1"#]
        );
    }

    #[test]
    fn test_cancelled_context_skips_driver() {
        let drv = MockDriver::new(Dialect::Sqlite);
        let (ctx, cancel) = Context::background().with_cancel();
        cancel.cancel();
        let err = exist_nodes(&ctx, &drv, &users()).unwrap_err();
        assert!(err.is_cancelled());
        assert!(drv.statements().is_empty());
    }

    #[test]
    fn test_aggregate_group_by() {
        let drv = MockDriver::new(Dialect::Sqlite);
        drv.push_rows(vec![vec![Value::from("a"), Value::from(2)]]);
        let aggs = [Aggregate::count()];
        let rows = aggregate_nodes(&Context::background(), &drv, &users(), &["name".to_string()], &aggs).unwrap();
        assert_eq!(rows.columns, vec!["name", "count"]);
        assert_eq!(
            drv.statements(),
            vec![r#"SELECT "users"."name", COUNT(*) AS "count" FROM "users" GROUP BY "users"."name""#]
        );
    }
}
