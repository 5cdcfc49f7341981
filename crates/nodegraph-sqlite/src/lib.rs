//! SQLite driver for nodegraph, built on `rusqlite`.
//!
//! ```no_run
//! use std::sync::Arc;
//! use nodegraph_core::Client;
//! use nodegraph_sqlite::SqliteDriver;
//!
//! let driver = SqliteDriver::open_in_memory().unwrap();
//! let client = Client::new(Arc::new(driver));
//! ```

mod driver;
mod value;

pub use driver::{SqliteDriver, SqliteTx};
