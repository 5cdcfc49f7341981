//! Middleware around query and mutation execution.
//!
//! Every terminal operation of the typed builders is handed to the client's
//! middleware chain as an [`Operation`] before it reaches the executor. A
//! middleware may inspect or rewrite the spec, short-circuit with an error,
//! or observe the outcome of the rest of the chain.

use std::sync::Arc;
use std::time::Instant;

use nodegraph_sql::Value;
use tracing::{debug, debug_span, warn};

use crate::context::Context;
use crate::error::Error;
use crate::graph::spec::{CreateSpec, DeleteSpec, QuerySpec, UpdateSpec};

/// An operation in flight.
pub enum Operation<'a> {
    Query { label: &'a str, spec: &'a mut QuerySpec },
    Count { label: &'a str, spec: &'a mut QuerySpec },
    Exist { label: &'a str, spec: &'a mut QuerySpec },
    Create { label: &'a str, specs: &'a mut Vec<CreateSpec> },
    Update { label: &'a str, spec: &'a mut UpdateSpec, one: bool },
    Delete { label: &'a str, spec: &'a mut DeleteSpec },
}

impl<'a> Operation<'a> {
    /// Label of the node type operated on.
    pub fn label(&self) -> &'a str {
        match self {
            Operation::Query { label, .. }
            | Operation::Count { label, .. }
            | Operation::Exist { label, .. }
            | Operation::Create { label, .. }
            | Operation::Update { label, .. }
            | Operation::Delete { label, .. } => *label,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Operation::Query { .. } => "query",
            Operation::Count { .. } => "count",
            Operation::Exist { .. } => "exist",
            Operation::Create { .. } => "create",
            Operation::Update { one: true, .. } => "update_one",
            Operation::Update { .. } => "update",
            Operation::Delete { .. } => "delete",
        }
    }
}

/// What an operation produced.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Number of nodes scanned.
    Nodes(usize),
    Count(usize),
    Exists(bool),
    /// Ids of created nodes, in input order.
    Created(Vec<Value>),
    /// Number of updated or deleted rows.
    Affected(usize),
}

/// Terminal handler at the end of a chain.
pub type Terminal<'a> = dyn FnMut(&Context, &mut Operation<'_>) -> Result<Outcome, Error> + 'a;

/// Wraps the execution of every operation.
pub trait Middleware: Send + Sync {
    fn handle(&self, ctx: &Context, op: &mut Operation<'_>, next: Next<'_>) -> Result<Outcome, Error>;
}

/// The remainder of a middleware chain.
pub struct Next<'a> {
    chain: &'a [Arc<dyn Middleware>],
    terminal: &'a mut Terminal<'a>,
}

impl<'a> Next<'a> {
    pub(crate) fn new(chain: &'a [Arc<dyn Middleware>], terminal: &'a mut Terminal<'a>) -> Self {
        Self { chain, terminal }
    }

    /// Hand the operation to the next middleware, or execute it.
    pub fn run(self, ctx: &Context, op: &mut Operation<'_>) -> Result<Outcome, Error> {
        match self.chain.split_first() {
            Some((m, rest)) => m.handle(ctx, op, Next::new(rest, self.terminal)),
            None => (self.terminal)(ctx, op),
        }
    }
}

/// Emits a debug span per operation and logs its outcome.
#[derive(Debug, Clone, Copy, Default)]
pub struct Tracing;

impl Middleware for Tracing {
    fn handle(&self, ctx: &Context, op: &mut Operation<'_>, next: Next<'_>) -> Result<Outcome, Error> {
        let span = debug_span!(
            "nodegraph",
            kind = op.kind(),
            label = op.label(),
            op = ctx.op().unwrap_or("")
        );
        let _enter = span.enter();
        let start = Instant::now();
        let result = next.run(ctx, op);
        let elapsed_us = start.elapsed().as_micros() as u64;
        match &result {
            Ok(outcome) => debug!(elapsed_us, ?outcome, "operation complete"),
            Err(err) => warn!(elapsed_us, error = %err, "operation failed"),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::spec::{FieldSpec, NodeSpec};
    use nodegraph_sql::FieldType;
    use parking_lot::Mutex;

    struct Record(Arc<Mutex<Vec<String>>>, &'static str);

    impl Middleware for Record {
        fn handle(&self, ctx: &Context, op: &mut Operation<'_>, next: Next<'_>) -> Result<Outcome, Error> {
            self.0.lock().push(format!("{} {}", self.1, op.kind()));
            let out = next.run(ctx, op);
            self.0.lock().push(format!("{} done", self.1));
            out
        }
    }

    struct Limit;

    impl Middleware for Limit {
        fn handle(&self, ctx: &Context, op: &mut Operation<'_>, next: Next<'_>) -> Result<Outcome, Error> {
            if let Operation::Query { spec, .. } = op {
                spec.limit = Some(5);
            }
            next.run(ctx, op)
        }
    }

    fn spec() -> QuerySpec {
        QuerySpec::new(NodeSpec {
            table: "users".into(),
            columns: vec![],
            id: FieldSpec::new("id", FieldType::Int),
        })
    }

    #[test]
    fn test_chain_order_and_rewrite() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain: Vec<Arc<dyn Middleware>> = vec![
            Arc::new(Record(log.clone(), "outer")),
            Arc::new(Limit),
            Arc::new(Record(log.clone(), "inner")),
        ];
        let mut seen = None;
        let mut terminal = |_: &Context, op: &mut Operation<'_>| -> Result<Outcome, Error> {
            if let Operation::Query { spec, .. } = op {
                seen = spec.limit;
            }
            Ok(Outcome::Nodes(0))
        };
        let mut spec = spec();
        let mut op = Operation::Query {
            label: "User",
            spec: &mut spec,
        };
        let out = Next::new(&chain, &mut terminal)
            .run(&Context::background(), &mut op)
            .unwrap();
        assert_eq!(out, Outcome::Nodes(0));
        assert_eq!(seen, Some(5));
        assert_eq!(
            *log.lock(),
            vec!["outer query", "inner query", "inner done", "outer done"]
        );
    }

    #[test]
    fn test_short_circuit() {
        struct Deny;
        impl Middleware for Deny {
            fn handle(&self, _: &Context, _: &mut Operation<'_>, _: Next<'_>) -> Result<Outcome, Error> {
                Err(Error::InvalidSpec("denied".into()))
            }
        }
        let chain: Vec<Arc<dyn Middleware>> = vec![Arc::new(Tracing), Arc::new(Deny)];
        let mut called = false;
        let mut terminal = |_: &Context, _: &mut Operation<'_>| -> Result<Outcome, Error> {
            called = true;
            Ok(Outcome::Count(1))
        };
        let mut spec = spec();
        let mut op = Operation::Count {
            label: "User",
            spec: &mut spec,
        };
        assert!(Next::new(&chain, &mut terminal)
            .run(&Context::background(), &mut op)
            .is_err());
        assert!(!called);
    }
}
