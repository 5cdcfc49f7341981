use nodegraph_sql::{DeleteBuilder, Selector};

use crate::context::Context;
use crate::driver::Driver;
use crate::error::Error;
use crate::graph::query::run_exec;
use crate::graph::spec::DeleteSpec;

/// Delete the nodes matching the spec predicate. Returns the number of rows
/// removed.
pub fn delete_nodes(ctx: &Context, drv: &dyn Driver, spec: &DeleteSpec) -> Result<usize, Error> {
    let d = drv.dialect();
    let mut target = Selector::table(d, &spec.node.table);
    if let Some(p) = &spec.predicate {
        p.apply(&mut target);
    }
    let mut delete = DeleteBuilder::new(d, &spec.node.table);
    delete.filter(target.take_filter());
    let (query, args) = delete.query();
    Ok(run_exec(ctx, drv, &query, &args)?.rows_affected as usize)
}
