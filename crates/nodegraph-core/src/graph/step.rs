//! Edge traversal compiled to nested selects.
//!
//! A [`Step`] describes one hop along an edge. Three compilations exist:
//!
//! * [`set_neighbors`] produces a selector over the target table restricted
//!   to neighbors of the source set, using `IN` subqueries.
//! * [`has_neighbors`] adds a correlated `EXISTS` (or a NOT NULL check when
//!   the source table holds the foreign key) to a selector.
//! * [`has_neighbors_with`] is the same with a predicate on the neighbor.

use nodegraph_sql::{Dialect, Expr, Projection, Selector, Value};

use crate::error::Error;
use crate::graph::spec::Rel;
use crate::predicate::Predicate;

/// Where the traversal starts.
#[derive(Debug, Clone)]
pub enum StepSource {
    /// A single node.
    Id(Value),
    /// The nodes selected by a query.
    Select(Selector),
}

#[derive(Debug, Clone)]
pub struct StepFrom {
    pub table: String,
    /// The id column of the source table.
    pub column: String,
    pub source: Option<StepSource>,
}

#[derive(Debug, Clone)]
pub struct StepTo {
    pub table: String,
    /// The id column of the target table.
    pub column: String,
}

#[derive(Debug, Clone)]
pub struct StepEdge {
    pub rel: Rel,
    pub inverse: bool,
    pub bidi: bool,
    /// FK table or join table.
    pub table: String,
    pub columns: Vec<String>,
}

impl StepEdge {
    pub(crate) fn owns_fk(&self) -> bool {
        self.rel == Rel::M2O || (self.rel == Rel::O2O && self.inverse)
    }

    pub(crate) fn join_columns(&self) -> (&str, &str) {
        if self.inverse {
            (&self.columns[1], &self.columns[0])
        } else {
            (&self.columns[0], &self.columns[1])
        }
    }
}

/// One hop along an edge.
#[derive(Debug, Clone)]
pub struct Step {
    pub from: StepFrom,
    pub to: StepTo,
    pub edge: StepEdge,
}

impl Step {
    pub fn new(from: StepFrom, to: StepTo, edge: StepEdge) -> Self {
        Self { from, to, edge }
    }

    /// The foreign key lives on the source table.
    pub fn from_edge_owner(&self) -> bool {
        self.edge.owns_fk()
    }

    /// The foreign key lives on the target table.
    pub fn to_edge_owner(&self) -> bool {
        self.edge.rel == Rel::O2M || (self.edge.rel == Rel::O2O && !self.edge.inverse)
    }

    /// The edge is stored in a join table.
    pub fn through_edge_table(&self) -> bool {
        self.edge.rel == Rel::M2M
    }
}

fn source_selector(d: Dialect, step: &Step) -> Result<Selector, Error> {
    match &step.from.source {
        Some(StepSource::Id(id)) => {
            let mut s = Selector::table(d, &step.from.table);
            let c = s.c(&step.from.column);
            s.where_(Expr::eq(c, id.clone()));
            Ok(s)
        }
        Some(StepSource::Select(s)) => {
            let mut s = s.clone();
            // Ordering and DISTINCT are meaningless inside IN unless a limit
            // depends on them.
            if s.limit().is_none() {
                s.clear_order();
                s.set_distinct(false);
            }
            Ok(s)
        }
        None => Err(Error::InvalidSpec(format!(
            "step from {:?} has no source",
            step.from.table
        ))),
    }
}

/// Select the neighbors of the step source in the target table.
pub fn set_neighbors(d: Dialect, step: &Step) -> Result<Selector, Error> {
    let mut source = source_selector(d, step)?;
    let mut to = Selector::table(d, &step.to.table);
    let to_id = to.c(&step.to.column);

    if step.through_edge_table() {
        let (owner, other) = step.edge.join_columns();
        source.select(vec![source.c(&step.from.column)]);
        let pairs = if step.edge.bidi {
            vec![(owner, other), (other, owner)]
        } else {
            vec![(owner, other)]
        };
        let mut alts = Vec::with_capacity(pairs.len());
        for (owner, other) in pairs {
            let mut join = Selector::table(d, &step.edge.table);
            join.select(vec![join.c(other)]);
            let c = join.c(owner);
            join.where_(Expr::in_select(c, source.clone()));
            alts.push(Expr::in_select(to_id.clone(), join));
        }
        to.where_(Expr::or(alts));
        return Ok(to);
    }

    let fk = &step.edge.columns[0];
    if step.from_edge_owner() {
        source.select(vec![source.c(fk)]);
        to.where_(Expr::in_select(to_id, source));
    } else {
        source.select(vec![source.c(&step.from.column)]);
        let c = to.c(fk);
        to.where_(Expr::in_select(c, source));
    }
    Ok(to)
}

/// Restrict `s` to rows that have at least one neighbor along the step.
pub fn has_neighbors(s: &mut Selector, step: &Step) {
    let from_id = s.c(&step.from.column);
    if step.through_edge_table() {
        let (owner, other) = step.edge.join_columns();
        let mut join = s.sub_select(&step.edge.table);
        let mut alts = vec![Expr::columns_eq(join.c(owner), from_id.clone())];
        if step.edge.bidi {
            alts.push(Expr::columns_eq(join.c(other), from_id));
        }
        join.set_projection(vec![Projection::One]);
        join.where_(Expr::or(alts));
        s.where_(Expr::exists(join));
        return;
    }
    let fk = &step.edge.columns[0];
    if step.from_edge_owner() {
        let c = s.c(fk);
        s.where_(Expr::not_null(c));
        return;
    }
    let mut to = s.sub_select(&step.edge.table);
    to.set_projection(vec![Projection::One]);
    let c = to.c(fk);
    to.where_(Expr::columns_eq(c, from_id));
    s.where_(Expr::exists(to));
}

/// Restrict `s` to rows with a neighbor matching `pred`.
pub fn has_neighbors_with(s: &mut Selector, step: &Step, pred: &Predicate) {
    let from_id = s.c(&step.from.column);
    if step.through_edge_table() {
        let (owner, other) = step.edge.join_columns();
        let mut join = s.sub_select(&step.edge.table);
        join.set_projection(vec![Projection::One]);

        let mut neighbors = join.sub_select(&step.to.table);
        neighbors.select(vec![neighbors.c(&step.to.column)]);
        pred.apply(&mut neighbors);

        let pairs = if step.edge.bidi {
            vec![(owner, other), (other, owner)]
        } else {
            vec![(owner, other)]
        };
        let alts = pairs
            .into_iter()
            .map(|(owner, other)| {
                Expr::and(vec![
                    Expr::columns_eq(join.c(owner), from_id.clone()),
                    Expr::in_select(join.c(other), neighbors.clone()),
                ])
            })
            .collect();
        join.where_(Expr::or(alts));
        s.where_(Expr::exists(join));
        return;
    }

    let mut to = s.sub_select(&step.to.table);
    to.set_projection(vec![Projection::One]);
    let fk = &step.edge.columns[0];
    let correlation = if step.from_edge_owner() {
        Expr::columns_eq(s.c(fk), to.c(&step.to.column))
    } else {
        Expr::columns_eq(to.c(fk), from_id)
    };
    to.where_(correlation);
    pred.apply(&mut to);
    s.where_(Expr::exists(to));
}
