//! The graph executor.
//!
//! Compiles query, create, update and delete specs into SQL and runs them on
//! a [`Driver`]. Everything here is untyped; the typed builders in
//! [`crate::query`] and [`crate::mutation`] produce the specs.

pub mod create;
pub mod delete;
pub mod query;
pub mod spec;
pub mod step;
pub mod update;

use tracing::warn;

use crate::context::Context;
use crate::driver::Driver;
use crate::error::Error;

pub use create::{create_node, create_nodes};
pub use delete::delete_nodes;
pub use query::{aggregate_nodes, count_nodes, exist_nodes, query_nodes, selector, Aggregate, NodeSink};
pub use spec::{
    Assignment, CreateSpec, DeleteSpec, EdgeMutations, EdgeSpec, EdgeTarget, FieldSpec, NodeSpec, QuerySpec, Rel,
    UpdateSpec,
};
pub use step::{has_neighbors, has_neighbors_with, set_neighbors, Step, StepEdge, StepFrom, StepSource, StepTo};
pub use update::{update_node, update_nodes};

/// Run `f` inside a transaction when `needed` and the driver can begin one.
///
/// A driver already scoped to a transaction runs `f` directly, as does a
/// driver without transaction support. On error the transaction is rolled
/// back and the original error returned.
pub(crate) fn may_tx<T>(
    ctx: &Context,
    drv: &dyn Driver,
    needed: bool,
    f: impl FnOnce(&dyn Driver) -> Result<T, Error>,
) -> Result<T, Error> {
    if !needed || drv.in_tx() || !drv.supports_tx() {
        return f(drv);
    }
    let tx = drv
        .begin(ctx)
        .map_err(|e| Error::from_driver(drv.dialect(), e))?;
    match f(tx.driver()) {
        Ok(v) => {
            tx.commit().map_err(|e| Error::from_driver(drv.dialect(), e))?;
            Ok(v)
        }
        Err(err) => {
            if let Err(rollback) = tx.rollback() {
                warn!(error = %rollback, "rollback failed");
            }
            Err(err)
        }
    }
}
