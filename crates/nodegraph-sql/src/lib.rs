//! SQL building blocks for nodegraph.
//!
//! This crate holds everything that is purely about SQL text: runtime values,
//! storage kinds, dialect rules, condition expressions and the statement
//! builders that render them. It knows nothing about nodes, edges or
//! drivers.

pub mod builder;
pub mod dialect;
pub mod error;
pub mod expr;
pub mod mutate;
pub mod select;
pub mod types;
pub mod value;

pub use builder::Builder;
pub use dialect::{Dialect, InsertIds};
pub use error::ValueError;
pub use expr::{like_escape, CmpOp, Column, Expr, JsonOp};
pub use mutate::{DeleteBuilder, InsertBuilder, SetValue, UpdateBuilder};
pub use select::{AggregateFunc, Join, OrderTerm, Projection, Selector, Source};
pub use types::FieldType;
pub use value::{FromValue, Key, Value};
