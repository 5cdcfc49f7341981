//! A scripted in-memory driver for unit tests.

use std::collections::VecDeque;
use std::sync::Arc;

use nodegraph_sql::{Dialect, Value};
use parking_lot::Mutex;

use crate::context::Context;
use crate::driver::{Driver, DriverError, ExecResult, Rows, TxDriver};

#[derive(Default)]
struct State {
    statements: Vec<(String, Vec<Value>)>,
    rows: VecDeque<Result<Vec<Vec<Value>>, DriverError>>,
    execs: VecDeque<Result<ExecResult, DriverError>>,
}

/// Records every statement and answers from queued responses.
///
/// Queries without a queued response return no rows; execs without one
/// report a single affected row.
#[derive(Clone)]
pub(crate) struct MockDriver {
    dialect: Dialect,
    tx: bool,
    in_tx: bool,
    state: Arc<Mutex<State>>,
}

impl MockDriver {
    pub(crate) fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            tx: false,
            in_tx: false,
            state: Arc::default(),
        }
    }

    /// Enable transactions; BEGIN/COMMIT/ROLLBACK are recorded as statements.
    pub(crate) fn with_tx(mut self) -> Self {
        self.tx = true;
        self
    }

    pub(crate) fn push_rows(&self, rows: Vec<Vec<Value>>) {
        self.state.lock().rows.push_back(Ok(rows));
    }

    pub(crate) fn push_query_error(&self, message: &str) {
        self.state.lock().rows.push_back(Err(DriverError::new(message)));
    }

    pub(crate) fn push_exec(&self, rows_affected: u64, last_insert_id: Option<i64>) {
        self.state.lock().execs.push_back(Ok(ExecResult {
            rows_affected,
            last_insert_id,
        }));
    }

    pub(crate) fn push_exec_error(&self, message: &str) {
        self.state.lock().execs.push_back(Err(DriverError::new(message)));
    }

    pub(crate) fn statements(&self) -> Vec<String> {
        self.state.lock().statements.iter().map(|(q, _)| q.clone()).collect()
    }

    pub(crate) fn args(&self) -> Vec<Vec<Value>> {
        self.state.lock().statements.iter().map(|(_, a)| a.clone()).collect()
    }

    fn record(&self, query: &str, args: &[Value]) {
        self.state.lock().statements.push((query.to_string(), args.to_vec()));
    }
}

impl Driver for MockDriver {
    fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn exec(&self, _ctx: &Context, query: &str, args: &[Value]) -> Result<ExecResult, DriverError> {
        self.record(query, args);
        self.state.lock().execs.pop_front().unwrap_or(Ok(ExecResult {
            rows_affected: 1,
            last_insert_id: None,
        }))
    }

    fn query(&self, _ctx: &Context, query: &str, args: &[Value]) -> Result<Rows, DriverError> {
        self.record(query, args);
        let rows = self.state.lock().rows.pop_front().unwrap_or(Ok(Vec::new()))?;
        Ok(Rows {
            columns: Vec::new(),
            rows,
        })
    }

    fn supports_tx(&self) -> bool {
        self.tx
    }

    fn in_tx(&self) -> bool {
        self.in_tx
    }

    fn begin(&self, _ctx: &Context) -> Result<Arc<dyn TxDriver>, DriverError> {
        if !self.tx {
            return Err(DriverError::new("mock driver built without transactions"));
        }
        self.record("BEGIN", &[]);
        let mut tx = self.clone();
        tx.in_tx = true;
        Ok(Arc::new(tx))
    }
}

impl TxDriver for MockDriver {
    fn driver(&self) -> &dyn Driver {
        self
    }

    fn commit(&self) -> Result<(), DriverError> {
        self.record("COMMIT", &[]);
        Ok(())
    }

    fn rollback(&self) -> Result<(), DriverError> {
        self.record("ROLLBACK", &[]);
        Ok(())
    }
}

/// Hand-written entities shared by unit tests.
pub(crate) mod fixtures {
    use std::sync::OnceLock;

    use nodegraph_sql::{FromValue, Value};

    use crate::entity::{check_columns, Entity, Loaded};
    use crate::error::Error;
    use crate::schema::{field, m2m, m2o, o2m, NodeSchema};

    #[derive(Debug, Clone, Default, PartialEq)]
    pub(crate) struct User {
        pub(crate) id: i64,
        pub(crate) name: String,
        pub(crate) age: Option<i64>,
        pub(crate) pets: Vec<Pet>,
        pub(crate) friends: Vec<User>,
        pub(crate) loaded: Loaded<2>,
    }

    impl Entity for User {
        fn schema() -> &'static NodeSchema {
            static SCHEMA: OnceLock<NodeSchema> = OnceLock::new();
            SCHEMA.get_or_init(|| {
                NodeSchema::builder("User", "users")
                    .field(field::string("name").not_empty().build())
                    .field(field::int("age").optional().build())
                    .edge(o2m("pets", "pets", "owner_id"))
                    .edge(m2m("friends", "users", "user_friends", ("user_id", "friend_id")).bidi())
                    .build()
                    .expect("user schema")
            })
        }

        fn assign_values(&mut self, columns: &[String], values: Vec<Value>) -> Result<(), Error> {
            check_columns(columns, &values)?;
            for (c, v) in columns.iter().zip(values) {
                match c.as_str() {
                    "id" => self.id = i64::from_value(v)?,
                    "name" => self.name = String::from_value(v)?,
                    "age" => self.age = Option::from_value(v)?,
                    other => return Err(Error::validation(other, "unexpected column for User")),
                }
            }
            Ok(())
        }

        fn id(&self) -> Value {
            Value::from(self.id)
        }

        fn value(&self, column: &str) -> Option<Value> {
            match column {
                "id" => Some(Value::from(self.id)),
                "name" => Some(Value::from(self.name.as_str())),
                "age" => Some(Value::from(self.age)),
                _ => None,
            }
        }

        fn mark_loaded(&mut self, ordinal: usize) {
            self.loaded.mark(ordinal);
        }
    }

    #[derive(Debug, Clone, Default, PartialEq)]
    pub(crate) struct Pet {
        pub(crate) id: i64,
        pub(crate) name: String,
        pub(crate) owner_id: Option<i64>,
        pub(crate) owner: Option<Box<User>>,
        pub(crate) loaded: Loaded<1>,
    }

    impl Entity for Pet {
        fn schema() -> &'static NodeSchema {
            static SCHEMA: OnceLock<NodeSchema> = OnceLock::new();
            SCHEMA.get_or_init(|| {
                NodeSchema::builder("Pet", "pets")
                    .field(field::string("name").build())
                    .edge(m2o("owner", "users", "owner_id"))
                    .build()
                    .expect("pet schema")
            })
        }

        fn assign_values(&mut self, columns: &[String], values: Vec<Value>) -> Result<(), Error> {
            check_columns(columns, &values)?;
            for (c, v) in columns.iter().zip(values) {
                match c.as_str() {
                    "id" => self.id = i64::from_value(v)?,
                    "name" => self.name = String::from_value(v)?,
                    "owner_id" => self.owner_id = Option::from_value(v)?,
                    other => return Err(Error::validation(other, "unexpected column for Pet")),
                }
            }
            Ok(())
        }

        fn id(&self) -> Value {
            Value::from(self.id)
        }

        fn value(&self, column: &str) -> Option<Value> {
            match column {
                "id" => Some(Value::from(self.id)),
                "name" => Some(Value::from(self.name.as_str())),
                "owner_id" => Some(Value::from(self.owner_id)),
                _ => None,
            }
        }

        fn mark_loaded(&mut self, ordinal: usize) {
            self.loaded.mark(ordinal);
        }
    }
}
