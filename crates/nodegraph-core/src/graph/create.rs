//! Node insertion and edge linking for new nodes.

use nodegraph_sql::{Dialect, Expr, FieldType, InsertBuilder, InsertIds, Selector, UpdateBuilder, Value};
use tracing::debug;

use crate::context::Context;
use crate::driver::Driver;
use crate::error::Error;
use crate::graph::may_tx;
use crate::graph::query::{run_exec, run_query};
use crate::graph::spec::{CreateSpec, EdgeSpec, Rel};

/// Insert one node and link its edges. Returns the node id.
pub fn create_node(ctx: &Context, drv: &dyn Driver, spec: &CreateSpec) -> Result<Value, Error> {
    let needed = spec.edges.iter().any(|e| !e.owns_fk() && !e.target.nodes.is_empty());
    may_tx(ctx, drv, needed, |drv| {
        let id = insert_one(ctx, drv, spec)?;
        link_edges(ctx, drv, &id, &spec.edges)?;
        Ok(id)
    })
}

/// Insert a batch of nodes in one transaction. Returns their ids in input
/// order.
///
/// Rows sharing one column set go out as a single multi-row INSERT; ids are
/// then recovered from the dialect's id reporting. Mixed column sets fall
/// back to one INSERT per node.
pub fn create_nodes(ctx: &Context, drv: &dyn Driver, specs: &[CreateSpec]) -> Result<Vec<Value>, Error> {
    match specs {
        [] => Ok(Vec::new()),
        [spec] => Ok(vec![create_node(ctx, drv, spec)?]),
        _ => may_tx(ctx, drv, true, |drv| {
            let ids = insert_batch(ctx, drv, specs)?;
            for (spec, id) in specs.iter().zip(&ids) {
                link_edges(ctx, drv, id, &spec.edges)?;
            }
            Ok(ids)
        }),
    }
}

fn insert_row(spec: &CreateSpec) -> Result<(Vec<String>, Vec<Value>), Error> {
    let mut columns = Vec::with_capacity(spec.fields.len() + 1);
    let mut values = Vec::with_capacity(spec.fields.len() + 1);
    if let Some(id) = &spec.id.value {
        columns.push(spec.id.column.clone());
        values.push(id.clone());
    }
    for f in &spec.fields {
        columns.push(f.column.clone());
        values.push(f.value.clone().unwrap_or(Value::Null));
    }
    for e in spec.edges.iter().filter(|e| e.owns_fk()) {
        match e.target.nodes.as_slice() {
            [] => {}
            [node] => {
                columns.push(e.columns[0].clone());
                values.push(node.clone());
            }
            nodes => {
                return Err(Error::InvalidSpec(format!(
                    "unique edge {:?} received {} targets",
                    e.columns[0],
                    nodes.len()
                )))
            }
        }
    }
    Ok((columns, values))
}

fn id_value(raw: Value, ty: FieldType) -> Result<Value, Error> {
    if raw.is_null() {
        return Err(Error::InvalidSpec("driver returned no insert id".into()));
    }
    Ok(raw.coerce(ty)?)
}

fn insert_one(ctx: &Context, drv: &dyn Driver, spec: &CreateSpec) -> Result<Value, Error> {
    let d = drv.dialect();
    let (columns, values) = insert_row(spec)?;
    let mut insert = InsertBuilder::new(d, &spec.table);
    if !columns.is_empty() {
        insert.columns(columns).values(values);
    }
    if let Some(id) = &spec.id.value {
        let (query, args) = insert.query();
        run_exec(ctx, drv, &query, &args)?;
        return Ok(id.clone());
    }
    if d.insert_ids() == InsertIds::Returning {
        insert.returning(&spec.id.column);
        let (query, args) = insert.query();
        let rows = run_query(ctx, drv, &query, &args)?;
        let raw = rows
            .rows
            .into_iter()
            .next()
            .and_then(|r| r.into_iter().next())
            .unwrap_or(Value::Null);
        return id_value(raw, spec.id.field_type);
    }
    let (query, args) = insert.query();
    let res = run_exec(ctx, drv, &query, &args)?;
    id_value(res.last_insert_id.map(Value::from).unwrap_or(Value::Null), spec.id.field_type)
}

fn insert_batch(ctx: &Context, drv: &dyn Driver, specs: &[CreateSpec]) -> Result<Vec<Value>, Error> {
    let d = drv.dialect();
    let rows = specs.iter().map(insert_row).collect::<Result<Vec<_>, _>>()?;
    let columns = &rows[0].0;
    let uniform = !columns.is_empty() && rows.iter().all(|(c, _)| c == columns);
    if !uniform {
        debug!(rows = specs.len(), "column sets differ, inserting one by one");
        return specs.iter().map(|s| insert_one(ctx, drv, s)).collect();
    }

    let mut insert = InsertBuilder::new(d, &specs[0].table);
    insert.columns(columns.clone());
    for (_, values) in &rows {
        insert.values(values.clone());
    }
    let explicit: Option<Vec<Value>> = specs.iter().map(|s| s.id.value.clone()).collect();
    let id_type = specs[0].id.field_type;

    if let Some(ids) = explicit {
        let (query, args) = insert.query();
        run_exec(ctx, drv, &query, &args)?;
        return Ok(ids);
    }
    match d.insert_ids() {
        InsertIds::Returning => {
            insert.returning(&specs[0].id.column);
            let (query, args) = insert.query();
            let rows = run_query(ctx, drv, &query, &args)?;
            if rows.rows.len() != specs.len() {
                return Err(Error::ColumnMismatch {
                    columns: specs.len(),
                    values: rows.rows.len(),
                });
            }
            rows.rows
                .into_iter()
                .map(|r| id_value(r.into_iter().next().unwrap_or(Value::Null), id_type))
                .collect()
        }
        mode => {
            let (query, args) = insert.query();
            let res = run_exec(ctx, drv, &query, &args)?;
            let reported = res
                .last_insert_id
                .ok_or_else(|| Error::InvalidSpec("driver returned no insert id".into()))?;
            let n = specs.len() as i64;
            let first = match mode {
                InsertIds::FirstOfBatch => reported,
                _ => reported - n + 1,
            };
            (0..n).map(|i| id_value(Value::from(first + i), id_type)).collect()
        }
    }
}

fn link_edges(ctx: &Context, drv: &dyn Driver, id: &Value, edges: &[EdgeSpec]) -> Result<(), Error> {
    let d = drv.dialect();
    for e in edges.iter().filter(|e| !e.owns_fk() && !e.target.nodes.is_empty()) {
        if e.rel == Rel::M2M {
            insert_pairs(ctx, drv, e, &[id.clone()], &e.target.nodes)?;
        } else {
            attach_fk(ctx, drv, d, e, id, &e.target.nodes)?;
        }
    }
    Ok(())
}

/// Insert join rows linking every owner with every target.
pub(crate) fn insert_pairs(
    ctx: &Context,
    drv: &dyn Driver,
    e: &EdgeSpec,
    owners: &[Value],
    targets: &[Value],
) -> Result<(), Error> {
    if owners.is_empty() || targets.is_empty() {
        return Ok(());
    }
    let (owner_col, other_col) = e.join_columns();
    let mut insert = InsertBuilder::new(drv.dialect(), &e.table);
    insert.columns(vec![owner_col.to_string(), other_col.to_string()]);
    for owner in owners {
        for target in targets {
            insert.values(vec![owner.clone(), target.clone()]);
            if e.bidi && owner != target {
                insert.values(vec![target.clone(), owner.clone()]);
            }
        }
    }
    let (query, args) = insert.query();
    run_exec(ctx, drv, &query, &args)?;
    Ok(())
}

/// Point the foreign key of every target at `owner`. Targets already linked
/// elsewhere make this fail.
pub(crate) fn attach_fk(
    ctx: &Context,
    drv: &dyn Driver,
    d: Dialect,
    e: &EdgeSpec,
    owner: &Value,
    targets: &[Value],
) -> Result<(), Error> {
    let fk = &e.columns[0];
    let t = Selector::table(d, &e.table);
    let mut update = UpdateBuilder::new(d, &e.table);
    update.set(fk, owner.clone()).filter(Some(Expr::and(vec![
        Expr::in_values(t.c(&e.target.id.column), targets.to_vec()),
        Expr::is_null(t.c(fk)),
    ])));
    let (query, args) = update.query();
    let res = run_exec(ctx, drv, &query, &args)?;
    if (res.rows_affected as usize) < targets.len() {
        return Err(Error::Constraint {
            message: format!(
                "one of {} {:?} is already connected to a different node through {:?}",
                e.table,
                targets.iter().map(ToString::to_string).collect::<Vec<_>>(),
                fk
            ),
        });
    }
    Ok(())
}
