//! Shared schema and entities for the SQLite integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use nodegraph_core::{
    check_columns, field, m2m, m2o, o2m, Client, Context, Driver, DriverError, Entity, Error, ExecResult,
    FromValue, Loaded, NodeSchema, Rows, TxDriver, Value,
};
use nodegraph_sql::Dialect;
use nodegraph_sqlite::SqliteDriver;

pub const SCHEMA: &str = r#"
CREATE TABLE users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    age INTEGER,
    version INTEGER NOT NULL DEFAULT 0
);
CREATE TABLE pets (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    owner_id INTEGER REFERENCES users(id) ON DELETE SET NULL
);
CREATE TABLE "groups" (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL
);
CREATE TABLE group_users (
    group_id INTEGER NOT NULL REFERENCES "groups"(id) ON DELETE CASCADE,
    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    PRIMARY KEY (group_id, user_id)
);
CREATE TABLE user_friends (
    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    friend_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    PRIMARY KEY (user_id, friend_id)
);
CREATE TRIGGER users_version AFTER UPDATE OF name ON users
BEGIN
    UPDATE users SET version = version + 1 WHERE id = NEW.id;
END;
"#;

/// Counts the queries run through it.
pub struct Counting {
    inner: SqliteDriver,
    queries: Arc<AtomicUsize>,
}

impl Driver for Counting {
    fn dialect(&self) -> Dialect {
        self.inner.dialect()
    }

    fn exec(&self, ctx: &Context, query: &str, args: &[Value]) -> Result<ExecResult, DriverError> {
        self.inner.exec(ctx, query, args)
    }

    fn query(&self, ctx: &Context, query: &str, args: &[Value]) -> Result<Rows, DriverError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.inner.query(ctx, query, args)
    }

    fn supports_tx(&self) -> bool {
        self.inner.supports_tx()
    }

    fn begin(&self, ctx: &Context) -> Result<Arc<dyn TxDriver>, DriverError> {
        self.inner.begin(ctx)
    }
}

pub struct TestContext {
    pub driver: SqliteDriver,
    pub client: Client,
    pub ctx: Context,
    queries: Arc<AtomicUsize>,
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_driver(SqliteDriver::open_in_memory().unwrap())
    }

    pub fn with_driver(driver: SqliteDriver) -> Self {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
        driver.execute_batch(SCHEMA).unwrap();
        let queries = Arc::new(AtomicUsize::new(0));
        let counting = Counting {
            inner: driver.clone(),
            queries: queries.clone(),
        };
        Self {
            driver,
            client: Client::new(Arc::new(counting)),
            ctx: Context::background(),
            queries,
        }
    }

    /// Queries run since the last call.
    pub fn take_queries(&self) -> usize {
        self.queries.swap(0, Ordering::SeqCst)
    }

    pub fn user(&self, name: &str) -> User {
        self.client.create::<User>().set("name", name).save(&self.ctx).unwrap()
    }

    pub fn pet(&self, name: &str, owner: Option<&User>) -> Pet {
        let mut create = self.client.create::<Pet>().set("name", name);
        if let Some(owner) = owner {
            create = create.add_edge("owner", [owner.id]);
        }
        create.save(&self.ctx).unwrap()
    }

    pub fn group(&self, name: &str) -> Group {
        self.client.create::<Group>().set("name", name).save(&self.ctx).unwrap()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub age: Option<i64>,
    pub version: i64,
    pub pets: Vec<Pet>,
    pub friends: Vec<User>,
    pub groups: Vec<Group>,
    pub loaded: Loaded<3>,
}

impl User {
    pub const PETS: usize = 0;
    pub const FRIENDS: usize = 1;
    pub const GROUPS: usize = 2;

    pub fn pets(&self) -> Result<&Vec<Pet>, Error> {
        self.loaded.edge(Self::PETS, "pets", &self.pets)
    }

    pub fn friends(&self) -> Result<&Vec<User>, Error> {
        self.loaded.edge(Self::FRIENDS, "friends", &self.friends)
    }
}

impl Entity for User {
    fn schema() -> &'static NodeSchema {
        static SCHEMA: OnceLock<NodeSchema> = OnceLock::new();
        SCHEMA.get_or_init(|| {
            NodeSchema::builder("User", "users")
                .field(field::string("name").unique().not_empty().build())
                .field(field::int("age").optional().non_negative().build())
                .field(field::int("version").default(0).build())
                .edge(o2m("pets", "pets", "owner_id"))
                .edge(m2m("friends", "users", "user_friends", ("user_id", "friend_id")).bidi())
                .edge(m2m("groups", "groups", "group_users", ("group_id", "user_id")).inverse())
                .build()
                .unwrap()
        })
    }

    fn assign_values(&mut self, columns: &[String], values: Vec<Value>) -> Result<(), Error> {
        check_columns(columns, &values)?;
        for (c, v) in columns.iter().zip(values) {
            match c.as_str() {
                "id" => self.id = i64::from_value(v)?,
                "name" => self.name = String::from_value(v)?,
                "age" => self.age = Option::from_value(v)?,
                "version" => self.version = i64::from_value(v)?,
                other => {
                    return Err(Error::Validation {
                        field: other.to_string(),
                        cause: "unexpected column for User".into(),
                    })
                }
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
            "version" => Some(Value::from(self.version)),
            _ => None,
        }
    }

    fn mark_loaded(&mut self, ordinal: usize) {
        self.loaded.mark(ordinal);
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pet {
    pub id: i64,
    pub name: String,
    pub owner_id: Option<i64>,
    pub owner: Option<Box<User>>,
    pub loaded: Loaded<1>,
}

impl Entity for Pet {
    fn schema() -> &'static NodeSchema {
        static SCHEMA: OnceLock<NodeSchema> = OnceLock::new();
        SCHEMA.get_or_init(|| {
            NodeSchema::builder("Pet", "pets")
                .field(field::string("name").build())
                .edge(m2o("owner", "users", "owner_id"))
                .build()
                .unwrap()
        })
    }

    fn assign_values(&mut self, columns: &[String], values: Vec<Value>) -> Result<(), Error> {
        check_columns(columns, &values)?;
        for (c, v) in columns.iter().zip(values) {
            match c.as_str() {
                "id" => self.id = i64::from_value(v)?,
                "name" => self.name = String::from_value(v)?,
                "owner_id" => self.owner_id = Option::from_value(v)?,
                other => {
                    return Err(Error::Validation {
                        field: other.to_string(),
                        cause: "unexpected column for Pet".into(),
                    })
                }
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

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Group {
    pub id: i64,
    pub name: String,
    pub users: Vec<User>,
    pub loaded: Loaded<1>,
}

impl Entity for Group {
    fn schema() -> &'static NodeSchema {
        static SCHEMA: OnceLock<NodeSchema> = OnceLock::new();
        SCHEMA.get_or_init(|| {
            NodeSchema::builder("Group", "groups")
                .field(field::string("name").build())
                .edge(m2m("users", "users", "group_users", ("group_id", "user_id")))
                .build()
                .unwrap()
        })
    }

    fn assign_values(&mut self, columns: &[String], values: Vec<Value>) -> Result<(), Error> {
        check_columns(columns, &values)?;
        for (c, v) in columns.iter().zip(values) {
            match c.as_str() {
                "id" => self.id = i64::from_value(v)?,
                "name" => self.name = String::from_value(v)?,
                other => {
                    return Err(Error::Validation {
                        field: other.to_string(),
                        cause: "unexpected column for Group".into(),
                    })
                }
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
            _ => None,
        }
    }

    fn mark_loaded(&mut self, ordinal: usize) {
        self.loaded.mark(ordinal);
    }
}
