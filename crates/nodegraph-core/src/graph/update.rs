//! Updates of node fields and edges.

use nodegraph_sql::{DeleteBuilder, Dialect, Expr, Projection, Selector, UpdateBuilder, Value};

use crate::context::Context;
use crate::driver::Driver;
use crate::error::Error;
use crate::graph::create::{attach_fk, insert_pairs};
use crate::graph::may_tx;
use crate::graph::query::{run_exec, run_query, scan, NodeSink};
use crate::graph::spec::{Assignment, EdgeMutations, EdgeSpec, Rel, UpdateSpec};

/// Update every node matching the spec predicate. Returns the number of
/// updated nodes.
///
/// When edges stored outside the node table change, the matching ids are
/// selected first and every statement is restricted to them.
pub fn update_nodes(ctx: &Context, drv: &dyn Driver, spec: &UpdateSpec) -> Result<usize, Error> {
    let d = drv.dialect();
    let external = has_external_edges(spec);
    may_tx(ctx, drv, external, |drv| {
        let mut target = Selector::table(d, &spec.node.table);
        if let Some(p) = &spec.predicate {
            p.apply(&mut target);
        }
        let mut update = UpdateBuilder::new(d, &spec.node.table);
        assign(&mut update, spec)?;

        if !external {
            if update.is_empty() {
                return Ok(0);
            }
            update.filter(target.take_filter());
            let (query, args) = update.query();
            return Ok(run_exec(ctx, drv, &query, &args)?.rows_affected as usize);
        }

        let ids = select_ids(ctx, drv, &mut target, spec)?;
        if ids.is_empty() {
            return Ok(0);
        }
        if !update.is_empty() {
            let t = Selector::table(d, &spec.node.table);
            update.filter(Some(Expr::in_values(t.c(&spec.node.id.column), ids.clone())));
            let (query, args) = update.query();
            run_exec(ctx, drv, &query, &args)?;
        }
        mutate_edges(ctx, drv, &ids, spec)?;
        Ok(ids.len())
    })
}

/// Update the node whose id is set in `spec.node.id.value`, then scan its
/// fresh state into `sink`.
///
/// Fails with not-found when the node does not exist or does not match the
/// predicate.
pub fn update_node(ctx: &Context, drv: &dyn Driver, spec: &UpdateSpec, sink: &mut dyn NodeSink) -> Result<(), Error> {
    let d = drv.dialect();
    let id = spec
        .node
        .id
        .value
        .clone()
        .ok_or_else(|| Error::validation(&spec.node.id.column, "missing id value for update"))?;
    let external = has_external_edges(spec);
    may_tx(ctx, drv, external, |drv| {
        let mut target = Selector::table(d, &spec.node.table);
        let id_column = target.c(&spec.node.id.column);
        target.where_(Expr::eq(id_column.clone(), id.clone()));
        if let Some(p) = &spec.predicate {
            p.apply(&mut target);
        }

        let mut update = UpdateBuilder::new(d, &spec.node.table);
        assign(&mut update, spec)?;
        let mut found = false;
        if !update.is_empty() {
            update.filter(target.filter().cloned());
            let (query, args) = update.query();
            found = run_exec(ctx, drv, &query, &args)?.rows_affected > 0;
        }
        // Some engines report zero affected rows when nothing changed.
        if !found {
            let mut probe = target.clone();
            probe.set_projection(vec![Projection::One]).set_limit(Some(1));
            let (query, args) = probe.query();
            if run_query(ctx, drv, &query, &args)?.rows.is_empty() {
                return Err(Error::not_found(&spec.node.table));
            }
        }
        mutate_edges(ctx, drv, std::slice::from_ref(&id), spec)?;

        let mut read = Selector::table(d, &spec.node.table);
        let columns = spec.node.qualified(&read);
        read.select(columns).where_(Expr::eq(id_column, id.clone()));
        if scan(ctx, drv, &read, sink)? == 0 {
            return Err(Error::not_found(&spec.node.table));
        }
        Ok(())
    })
}

fn has_external_edges(spec: &UpdateSpec) -> bool {
    spec.edges.iter().any(|(e, _)| !e.owns_fk())
}

fn select_ids(ctx: &Context, drv: &dyn Driver, target: &mut Selector, spec: &UpdateSpec) -> Result<Vec<Value>, Error> {
    let id_column = target.c(&spec.node.id.column);
    target.select(vec![id_column]);
    let (query, args) = target.query();
    let rows = run_query(ctx, drv, &query, &args)?;
    rows.rows
        .into_iter()
        .filter_map(|r| r.into_iter().next())
        .map(|v| v.coerce(spec.node.id.field_type).map_err(Error::from))
        .collect()
}

/// Field assignments plus foreign keys held by the node itself.
fn assign(update: &mut UpdateBuilder, spec: &UpdateSpec) -> Result<(), Error> {
    for (field, a) in &spec.fields {
        match a {
            Assignment::Set(v) => update.set(&field.column, v.clone()),
            Assignment::Add(v) => update.add(&field.column, v.clone()),
            Assignment::Clear => update.set_null(&field.column),
        };
    }
    for (e, m) in spec.edges.iter().filter(|(e, _)| e.owns_fk()) {
        let fk = &e.columns[0];
        if !m.remove.is_empty() {
            return Err(Error::InvalidSpec(format!(
                "cannot remove ids from unique edge {fk:?}; clear it instead"
            )));
        }
        if m.clear {
            update.set_null(fk);
        }
        match m.add.as_slice() {
            [] => {}
            [node] => {
                update.set(fk, node.clone());
            }
            nodes => {
                return Err(Error::InvalidSpec(format!(
                    "unique edge {fk:?} received {} targets",
                    nodes.len()
                )))
            }
        }
    }
    Ok(())
}

/// Clear, then remove, then add edges stored outside the node table.
fn mutate_edges(ctx: &Context, drv: &dyn Driver, ids: &[Value], spec: &UpdateSpec) -> Result<(), Error> {
    let d = drv.dialect();
    for (e, m) in spec.edges.iter().filter(|(e, _)| !e.owns_fk()) {
        if m.clear {
            clear_edge(ctx, drv, d, e, ids)?;
        }
        if !m.remove.is_empty() {
            remove_edge(ctx, drv, d, e, ids, m)?;
        }
        if m.add.is_empty() {
            continue;
        }
        if e.rel == Rel::M2M {
            insert_pairs(ctx, drv, e, ids, &m.add)?;
        } else {
            if ids.len() > 1 {
                return Err(Error::validation(
                    e.columns[0].as_str(),
                    format!("cannot link {} rows of {} to {} nodes at once", m.add.len(), e.table, ids.len()),
                ));
            }
            attach_fk(ctx, drv, d, e, &ids[0], &m.add)?;
        }
    }
    Ok(())
}

fn join_filter(t: &Selector, e: &EdgeSpec, owners: &[Value], others: Option<&[Value]>) -> Expr {
    let (owner, other) = e.join_columns();
    let pair = |owner: &str, other: &str| {
        let mut parts = vec![Expr::in_values(t.c(owner), owners.to_vec())];
        if let Some(others) = others {
            parts.push(Expr::in_values(t.c(other), others.to_vec()));
        }
        Expr::and(parts)
    };
    if e.bidi {
        Expr::or(vec![pair(owner, other), pair(other, owner)])
    } else {
        pair(owner, other)
    }
}

fn clear_edge(ctx: &Context, drv: &dyn Driver, d: Dialect, e: &EdgeSpec, ids: &[Value]) -> Result<(), Error> {
    let t = Selector::table(d, &e.table);
    let (query, args) = if e.rel == Rel::M2M {
        let mut delete = DeleteBuilder::new(d, &e.table);
        delete.filter(Some(join_filter(&t, e, ids, None)));
        delete.query()
    } else {
        let fk = &e.columns[0];
        let mut update = UpdateBuilder::new(d, &e.table);
        update
            .set_null(fk)
            .filter(Some(Expr::in_values(t.c(fk), ids.to_vec())));
        update.query()
    };
    run_exec(ctx, drv, &query, &args)?;
    Ok(())
}

fn remove_edge(
    ctx: &Context,
    drv: &dyn Driver,
    d: Dialect,
    e: &EdgeSpec,
    ids: &[Value],
    m: &EdgeMutations,
) -> Result<(), Error> {
    let t = Selector::table(d, &e.table);
    let (query, args) = if e.rel == Rel::M2M {
        let mut delete = DeleteBuilder::new(d, &e.table);
        delete.filter(Some(join_filter(&t, e, ids, Some(&m.remove))));
        delete.query()
    } else {
        let fk = &e.columns[0];
        let mut update = UpdateBuilder::new(d, &e.table);
        update.set_null(fk).filter(Some(Expr::and(vec![
            Expr::in_values(t.c(fk), ids.to_vec()),
            Expr::in_values(t.c(&e.target.id.column), m.remove.clone()),
        ])));
        update.query()
    };
    run_exec(ctx, drv, &query, &args)?;
    Ok(())
}
