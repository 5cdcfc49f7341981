//! The SQLite driver and its transactions.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use nodegraph_core::{Context, Driver, DriverError, ExecResult, Rows, TxDriver};
use nodegraph_sql::{Dialect, Value};
use parking_lot::Mutex;
use rusqlite::{params_from_iter, Connection};
use tracing::{debug, info, warn};

use crate::value::{from_sql, Arg};

fn driver_err(e: rusqlite::Error) -> DriverError {
    DriverError::new(e.to_string())
}

/// A driver over one SQLite connection.
///
/// Clones share the connection. Statements are serialized on it, so a
/// transaction begun through one clone is visible to all of them.
#[derive(Clone)]
pub struct SqliteDriver {
    conn: Arc<Mutex<Connection>>,
    in_tx: bool,
}

impl SqliteDriver {
    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self, DriverError> {
        info!("opening in-memory sqlite database");
        Self::from_connection(Connection::open_in_memory().map_err(driver_err)?)
    }

    /// Open or create a database file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DriverError> {
        let path = path.as_ref();
        info!(path = %path.display(), "opening sqlite database");
        Self::from_connection(Connection::open(path).map_err(driver_err)?)
    }

    /// Wrap an existing connection. Foreign-key enforcement is turned on.
    pub fn from_connection(conn: Connection) -> Result<Self, DriverError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(driver_err)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            in_tx: false,
        })
    }

    /// Run several `;`-separated statements, e.g. a schema.
    pub fn execute_batch(&self, sql: &str) -> Result<(), DriverError> {
        self.conn.lock().execute_batch(sql).map_err(driver_err)
    }

    /// Run `f` with the underlying connection.
    pub fn with_connection<T>(&self, f: impl FnOnce(&Connection) -> T) -> T {
        f(&self.conn.lock())
    }

    fn check(ctx: &Context) -> Result<(), DriverError> {
        ctx.err().map_err(|e| DriverError::new(e.to_string()))
    }
}

impl Driver for SqliteDriver {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn exec(&self, ctx: &Context, query: &str, args: &[Value]) -> Result<ExecResult, DriverError> {
        Self::check(ctx)?;
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(query).map_err(driver_err)?;
        let n = stmt
            .execute(params_from_iter(args.iter().map(Arg)))
            .map_err(driver_err)?;
        let last_insert_id = query
            .trim_start()
            .get(..6)
            .filter(|verb| verb.eq_ignore_ascii_case("insert"))
            .map(|_| conn.last_insert_rowid());
        Ok(ExecResult {
            rows_affected: n as u64,
            last_insert_id,
        })
    }

    fn query(&self, ctx: &Context, query: &str, args: &[Value]) -> Result<Rows, DriverError> {
        Self::check(ctx)?;
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(query).map_err(driver_err)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let width = columns.len();
        let mut rows = stmt
            .query(params_from_iter(args.iter().map(Arg)))
            .map_err(driver_err)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(driver_err)? {
            let mut values = Vec::with_capacity(width);
            for i in 0..width {
                let v = row.get_ref(i).map_err(driver_err)?;
                values.push(from_sql(v).map_err(DriverError::new)?);
            }
            out.push(values);
        }
        Ok(Rows { columns, rows: out })
    }

    fn supports_tx(&self) -> bool {
        !self.in_tx
    }

    fn in_tx(&self) -> bool {
        self.in_tx
    }

    fn begin(&self, ctx: &Context) -> Result<Arc<dyn TxDriver>, DriverError> {
        if self.in_tx {
            return Err(DriverError::new("sqlite: transaction already in progress"));
        }
        Self::check(ctx)?;
        self.execute_batch("BEGIN")?;
        debug!("sqlite transaction started");
        Ok(Arc::new(SqliteTx {
            driver: SqliteDriver {
                conn: self.conn.clone(),
                in_tx: true,
            },
            done: AtomicBool::new(false),
        }))
    }
}

/// An open SQLite transaction. Dropping it unfinished rolls it back.
pub struct SqliteTx {
    driver: SqliteDriver,
    done: AtomicBool,
}

impl SqliteTx {
    fn finish(&self, stmt: &str) -> Result<(), DriverError> {
        if self.done.swap(true, Ordering::SeqCst) {
            return Err(DriverError::new("sqlite: transaction already finished"));
        }
        self.driver.execute_batch(stmt)
    }
}

impl TxDriver for SqliteTx {
    fn driver(&self) -> &dyn Driver {
        &self.driver
    }

    fn commit(&self) -> Result<(), DriverError> {
        self.finish("COMMIT")
    }

    fn rollback(&self) -> Result<(), DriverError> {
        self.finish("ROLLBACK")
    }
}

impl Drop for SqliteTx {
    fn drop(&mut self) {
        if !self.done.load(Ordering::SeqCst) {
            if let Err(e) = self.finish("ROLLBACK") {
                warn!(error = %e, "rollback of abandoned transaction failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exec_and_query() {
        let drv = SqliteDriver::open_in_memory().unwrap();
        drv.execute_batch("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT)").unwrap();
        let ctx = Context::background();
        let res = drv
            .exec(&ctx, "INSERT INTO t (name) VALUES (?)", &[Value::from("a")])
            .unwrap();
        assert_eq!(res.rows_affected, 1);
        assert_eq!(res.last_insert_id, Some(1));

        let res = drv
            .exec(&ctx, "UPDATE t SET name = ?", &[Value::from("b")])
            .unwrap();
        assert_eq!(res.last_insert_id, None);

        let rows = drv.query(&ctx, "SELECT id, name FROM t", &[]).unwrap();
        assert_eq!(rows.columns, vec!["id", "name"]);
        assert_eq!(rows.rows, vec![vec![Value::from(1), Value::from("b")]]);
    }

    #[test]
    fn test_tx_rollback_on_drop() {
        let drv = SqliteDriver::open_in_memory().unwrap();
        drv.execute_batch("CREATE TABLE t (id INTEGER PRIMARY KEY)").unwrap();
        let ctx = Context::background();
        {
            let tx = drv.begin(&ctx).unwrap();
            assert!(tx.driver().in_tx());
            assert!(tx.driver().begin(&ctx).is_err());
            tx.driver().exec(&ctx, "INSERT INTO t DEFAULT VALUES", &[]).unwrap();
        }
        let rows = drv.query(&ctx, "SELECT COUNT(*) FROM t", &[]).unwrap();
        assert_eq!(rows.rows[0][0], Value::from(0));

        let tx = drv.begin(&ctx).unwrap();
        tx.driver().exec(&ctx, "INSERT INTO t DEFAULT VALUES", &[]).unwrap();
        tx.commit().unwrap();
        assert!(tx.commit().is_err());
        let rows = drv.query(&ctx, "SELECT COUNT(*) FROM t", &[]).unwrap();
        assert_eq!(rows.rows[0][0], Value::from(1));
    }

    #[test]
    fn test_cancelled_context() {
        let drv = SqliteDriver::open_in_memory().unwrap();
        let (ctx, cancel) = Context::background().with_cancel();
        cancel.cancel();
        assert!(drv.query(&ctx, "SELECT 1", &[]).is_err());
    }
}
