//! nodegraph core - declarative graph queries compiled to SQL.
//!
//! Node types describe themselves with a [`NodeSchema`]; the [`Client`]
//! turns typed queries and mutations into specs, runs them through its
//! middleware chain and executes them on a [`Driver`].

pub mod client;
pub mod config;
pub mod context;
pub mod driver;
mod eager;
pub mod entity;
pub mod error;
pub mod graph;
pub mod middleware;
pub mod mutation;
pub mod predicate;
pub mod query;
pub mod schema;

#[cfg(test)]
mod testing;

pub use client::{Client, Tx};
pub use config::ClientConfig;
pub use context::{CancelHandle, Context};
pub use driver::{DebugDriver, Driver, DriverError, ExecResult, Rows, TxDriver};
pub use entity::{check_columns, Entity, Loaded};
pub use error::{Error, MustExt};
pub use graph::Aggregate;
pub use middleware::{Middleware, Next, Operation, Outcome, Tracing};
pub use mutation::{Create, CreateBulk, Delete, DeleteOne, Update, UpdateOne};
pub use predicate::{asc, desc, Order, Predicate};
pub use query::Query;
pub use schema::{field, m2m, m2o, o2m, o2o, o2o_inverse, EdgeSchema, FieldDescriptor, NodeSchema};

/// Re-export of the SQL builder crate.
pub use nodegraph_sql as sql;
pub use nodegraph_sql::{Dialect, FieldType, FromValue, Value};
