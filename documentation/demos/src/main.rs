//! nodegraph walk-through: a small social graph on SQLite.
//!
//! Run with: RUST_LOG=nodegraph=debug cargo run

use std::sync::{Arc, OnceLock};

use nodegraph_core::predicate::{self, asc};
use nodegraph_core::{
    check_columns, field, m2m, m2o, o2m, Client, ClientConfig, Context, Entity, Error, FromValue, Loaded,
    NodeSchema, Tracing, Value,
};
use nodegraph_sqlite::SqliteDriver;
use tracing::info;

const SCHEMA: &str = r#"
CREATE TABLE cities (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT NOT NULL);
CREATE TABLE people (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    city_id INTEGER REFERENCES cities(id)
);
CREATE TABLE friendships (
    person_id INTEGER NOT NULL REFERENCES people(id) ON DELETE CASCADE,
    friend_id INTEGER NOT NULL REFERENCES people(id) ON DELETE CASCADE,
    PRIMARY KEY (person_id, friend_id)
);
"#;

#[derive(Debug, Clone, Default)]
struct City {
    id: i64,
    name: String,
    residents: Vec<Person>,
    loaded: Loaded<1>,
}

impl Entity for City {
    fn schema() -> &'static NodeSchema {
        static SCHEMA: OnceLock<NodeSchema> = OnceLock::new();
        SCHEMA.get_or_init(|| {
            NodeSchema::builder("City", "cities")
                .field(field::string("name").not_empty().build())
                .edge(o2m("residents", "people", "city_id"))
                .build()
                .expect("city schema")
        })
    }

    fn assign_values(&mut self, columns: &[String], values: Vec<Value>) -> Result<(), Error> {
        check_columns(columns, &values)?;
        for (c, v) in columns.iter().zip(values) {
            match c.as_str() {
                "id" => self.id = i64::from_value(v)?,
                "name" => self.name = String::from_value(v)?,
                _ => {}
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

#[derive(Debug, Clone, Default)]
struct Person {
    id: i64,
    name: String,
    city_id: Option<i64>,
    friends: Vec<Person>,
    loaded: Loaded<2>,
}

impl Entity for Person {
    fn schema() -> &'static NodeSchema {
        static SCHEMA: OnceLock<NodeSchema> = OnceLock::new();
        SCHEMA.get_or_init(|| {
            NodeSchema::builder("Person", "people")
                .field(field::string("name").unique().not_empty().build())
                .edge(m2o("city", "cities", "city_id"))
                .edge(m2m("friends", "people", "friendships", ("person_id", "friend_id")).bidi())
                .build()
                .expect("person schema")
        })
    }

    fn assign_values(&mut self, columns: &[String], values: Vec<Value>) -> Result<(), Error> {
        check_columns(columns, &values)?;
        for (c, v) in columns.iter().zip(values) {
            match c.as_str() {
                "id" => self.id = i64::from_value(v)?,
                "name" => self.name = String::from_value(v)?,
                "city_id" => self.city_id = Option::from_value(v)?,
                _ => {}
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
            "city_id" => Some(Value::from(self.city_id)),
            _ => None,
        }
    }

    fn mark_loaded(&mut self, ordinal: usize) {
        self.loaded.mark(ordinal);
    }
}

fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("nodegraph_demo=info".parse().map_err(|e| Error::InvalidSpec(format!("{e}")))?),
        )
        .init();

    let driver = SqliteDriver::open_in_memory()?;
    driver.execute_batch(SCHEMA)?;
    let client = Client::with_config(Arc::new(driver), ClientConfig::new().with_debug(true)).with_middleware(Tracing);
    let ctx = Context::background();

    let berlin = client.create::<City>().set("name", "Berlin").save(&ctx)?;
    let lisbon = client.create::<City>().set("name", "Lisbon").save(&ctx)?;
    let people = client
        .create_bulk(
            [("ana", &lisbon), ("ben", &berlin), ("cleo", &berlin), ("dev", &lisbon)]
                .into_iter()
                .map(|(name, city)| client.create::<Person>().set("name", name).add_edge("city", [city.id]))
                .collect(),
        )
        .save(&ctx)?;
    info!(count = people.len(), "people created");

    let ana = &people[0];
    client
        .update_one(ana)
        .add_edge("friends", [people[1].id, people[2].id])
        .exec(&ctx)?;

    // Friends of ana, then the cities those friends live in.
    let friends = client.query_edge_of::<Person, Person>(ana, "friends");
    let cities = friends
        .query_edge::<City>("city")
        .unique(true)
        .order(asc("name"))
        .all(&ctx)?;
    for city in &cities {
        info!(city = %city.name, "a friend of ana lives here");
    }

    // Every city with its residents and their friends, in three queries.
    let cities = client
        .query::<City>()
        .order(asc("name"))
        .with_edge(
            "residents",
            |c: &mut City, p: Person| c.residents.push(p),
            |q| q.with_edge("friends", |p: &mut Person, f: Person| p.friends.push(f), |q| q),
        )
        .all(&ctx)?;
    for city in &cities {
        for p in &city.residents {
            let friends: Vec<&str> = p.friends.iter().map(|f| f.name.as_str()).collect();
            info!(city = %city.name, person = %p.name, ?friends, "resident");
        }
    }

    let lonely = client
        .query::<Person>()
        .filter(predicate::Predicate::not(Person::schema().edge("friends")?.has()))
        .count(&ctx)?;
    info!(lonely, "people without friends");
    Ok(())
}
