//! The driver boundary.
//!
//! The core renders SQL text and positional arguments; a [`Driver`] runs
//! them. Connection pooling and transaction mechanics belong to the driver
//! implementation.

use std::sync::Arc;

use nodegraph_sql::{Dialect, Value};
use thiserror::Error;
use tracing::debug;

use crate::context::Context;

/// An error reported by a driver, carried verbatim.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct DriverError {
    pub message: String,
}

impl DriverError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Result of a statement that returns no rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecResult {
    pub rows_affected: u64,
    pub last_insert_id: Option<i64>,
}

/// A fully materialized result set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Rows {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

/// Executes SQL against one database.
///
/// Implementations should return promptly once `ctx` is cancelled; the
/// executor checks the context before every call as well.
pub trait Driver: Send + Sync {
    /// The dialect SQL must be rendered in.
    fn dialect(&self) -> Dialect;

    /// Execute a statement that returns no rows.
    fn exec(&self, ctx: &Context, query: &str, args: &[Value]) -> Result<ExecResult, DriverError>;

    /// Execute a query and collect its rows.
    fn query(&self, ctx: &Context, query: &str, args: &[Value]) -> Result<Rows, DriverError>;

    /// Whether [`Driver::begin`] is supported.
    fn supports_tx(&self) -> bool {
        false
    }

    /// Whether this driver is already scoped to a transaction.
    fn in_tx(&self) -> bool {
        false
    }

    /// Begin a transaction.
    fn begin(&self, _ctx: &Context) -> Result<Arc<dyn TxDriver>, DriverError> {
        Err(DriverError::new(format!(
            "{} driver does not support transactions",
            self.dialect()
        )))
    }
}

/// A transaction-scoped driver.
pub trait TxDriver: Send + Sync {
    /// The driver statements of this transaction run on.
    fn driver(&self) -> &dyn Driver;

    fn commit(&self) -> Result<(), DriverError>;

    fn rollback(&self) -> Result<(), DriverError>;
}

/// Logs every statement at debug level before delegating.
pub struct DebugDriver {
    inner: Arc<dyn Driver>,
    log_args: bool,
}

impl DebugDriver {
    pub fn new(inner: Arc<dyn Driver>, log_args: bool) -> Self {
        Self { inner, log_args }
    }
}

fn log_statement(kind: &'static str, in_tx: bool, query: &str, args: &[Value], log_args: bool) {
    if log_args {
        debug!(target: "nodegraph::driver", kind, in_tx, query, args = ?args, "statement");
    } else {
        debug!(target: "nodegraph::driver", kind, in_tx, query, "statement");
    }
}

impl Driver for DebugDriver {
    fn dialect(&self) -> Dialect {
        self.inner.dialect()
    }

    fn exec(&self, ctx: &Context, query: &str, args: &[Value]) -> Result<ExecResult, DriverError> {
        log_statement("exec", false, query, args, self.log_args);
        self.inner.exec(ctx, query, args)
    }

    fn query(&self, ctx: &Context, query: &str, args: &[Value]) -> Result<Rows, DriverError> {
        log_statement("query", false, query, args, self.log_args);
        self.inner.query(ctx, query, args)
    }

    fn supports_tx(&self) -> bool {
        self.inner.supports_tx()
    }

    fn in_tx(&self) -> bool {
        self.inner.in_tx()
    }

    fn begin(&self, ctx: &Context) -> Result<Arc<dyn TxDriver>, DriverError> {
        let tx = self.inner.begin(ctx)?;
        debug!(target: "nodegraph::driver", "begin");
        Ok(Arc::new(DebugTx {
            inner: tx,
            log_args: self.log_args,
        }))
    }
}

struct DebugTx {
    inner: Arc<dyn TxDriver>,
    log_args: bool,
}

impl Driver for DebugTx {
    fn dialect(&self) -> Dialect {
        self.inner.driver().dialect()
    }

    fn exec(&self, ctx: &Context, query: &str, args: &[Value]) -> Result<ExecResult, DriverError> {
        log_statement("exec", true, query, args, self.log_args);
        self.inner.driver().exec(ctx, query, args)
    }

    fn query(&self, ctx: &Context, query: &str, args: &[Value]) -> Result<Rows, DriverError> {
        log_statement("query", true, query, args, self.log_args);
        self.inner.driver().query(ctx, query, args)
    }

    fn in_tx(&self) -> bool {
        true
    }
}

impl TxDriver for DebugTx {
    fn driver(&self) -> &dyn Driver {
        self
    }

    fn commit(&self) -> Result<(), DriverError> {
        debug!(target: "nodegraph::driver", "commit");
        self.inner.commit()
    }

    fn rollback(&self) -> Result<(), DriverError> {
        debug!(target: "nodegraph::driver", "rollback");
        self.inner.rollback()
    }
}
