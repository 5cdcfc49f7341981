//! Integration tests for eager loading on SQLite.

mod common;

use std::sync::Arc;

use common::{Group, Pet, TestContext, User};
use nodegraph_core::predicate::{self, asc};
use nodegraph_core::{
    CancelHandle, Client, Context, Dialect, Driver, DriverError, Entity, Error, ExecResult, Rows, TxDriver, Value,
};
use nodegraph_sqlite::SqliteDriver;
use pretty_assertions::assert_eq;

fn pet_names(pets: &[Pet]) -> Vec<&str> {
    let mut names: Vec<&str> = pets.iter().map(|p| p.name.as_str()).collect();
    names.sort_unstable();
    names
}

fn user_names(users: &[User]) -> Vec<&str> {
    let mut names: Vec<&str> = users.iter().map(|u| u.name.as_str()).collect();
    names.sort_unstable();
    names
}

#[test]
fn test_o2m_loads_in_one_round_trip() {
    let t = TestContext::new();
    let a = t.user("a");
    let b = t.user("b");
    t.user("c");
    t.pet("rex", Some(&a));
    t.pet("tom", Some(&a));
    t.pet("max", Some(&b));
    t.take_queries();

    let users = t
        .client
        .query::<User>()
        .order(asc("name"))
        .with_edge("pets", |u: &mut User, p: Pet| u.pets.push(p), |q| q)
        .all(&t.ctx)
        .unwrap();
    assert_eq!(t.take_queries(), 2);
    assert_eq!(pet_names(users[0].pets().unwrap()), vec!["rex", "tom"]);
    assert_eq!(pet_names(users[1].pets().unwrap()), vec!["max"]);
    // Loaded, with no neighbors.
    assert!(users[2].pets().unwrap().is_empty());
}

#[test]
fn test_not_loaded_edge() {
    let t = TestContext::new();
    t.user("a");
    let u = t.client.query::<User>().only(&t.ctx).unwrap();
    let err = u.pets().unwrap_err();
    assert!(err.is_not_loaded());
    assert!(matches!(err, Error::NotLoaded { ref edge } if edge == "pets"));
    assert!(u.friends().is_err());
}

#[test]
fn test_m2o_and_nested_loads() {
    let t = TestContext::new();
    let a = t.user("a");
    t.pet("rex", Some(&a));
    t.pet("tom", Some(&a));
    t.pet("stray", None);
    t.take_queries();

    let users = t
        .client
        .query::<User>()
        .with_edge(
            "pets",
            |u: &mut User, p: Pet| u.pets.push(p),
            |q| q.with_edge("owner", |p: &mut Pet, o: User| p.owner = Some(Box::new(o)), |q| q),
        )
        .all(&t.ctx)
        .unwrap();
    assert_eq!(t.take_queries(), 3);
    for pet in &users[0].pets {
        assert_eq!(pet.owner.as_ref().map(|o| o.id), Some(a.id));
        assert!(pet.loaded.is_loaded(0));
    }

    let pets = t
        .client
        .query::<Pet>()
        .select(&["name"])
        .order(asc("name"))
        .with_edge("owner", |p: &mut Pet, o: User| p.owner = Some(Box::new(o)), |q| q.select(&["name"]))
        .all(&t.ctx)
        .unwrap();
    assert_eq!(pets[0].name, "rex");
    assert_eq!(pets[0].owner.as_ref().map(|o| o.name.as_str()), Some("a"));
    assert_eq!(pets[1].name, "stray");
    assert!(pets[1].owner.is_none());
}

#[test]
fn test_select_after_owner_edge_keeps_foreign_key() {
    let t = TestContext::new();
    let a = t.user("a");
    t.pet("rex", Some(&a));
    t.pet("stray", None);

    let pets = t
        .client
        .query::<Pet>()
        .with_edge("owner", |p: &mut Pet, o: User| p.owner = Some(Box::new(o)), |q| q)
        .select(&["name"])
        .order(asc("name"))
        .all(&t.ctx)
        .unwrap();
    assert_eq!(pets[0].name, "rex");
    assert_eq!(pets[0].owner_id, Some(a.id));
    assert_eq!(pets[0].owner.as_ref().map(|o| o.id), Some(a.id));
    assert!(pets[0].loaded.is_loaded(0));
    assert_eq!(pets[1].name, "stray");
    assert!(pets[1].owner.is_none());
    assert!(pets[1].loaded.is_loaded(0));
}

#[test]
fn test_configured_edge_query() {
    let t = TestContext::new();
    let a = t.user("a");
    t.pet("rex", Some(&a));
    t.pet("tom", Some(&a));

    let a = t
        .client
        .query::<User>()
        .with_edge(
            "pets",
            |u: &mut User, p: Pet| u.pets.push(p),
            |q| q.filter(predicate::eq("name", "tom")),
        )
        .only(&t.ctx)
        .unwrap();
    assert_eq!(pet_names(&a.pets), vec!["tom"]);
}

#[test]
fn test_m2m_both_directions() {
    let t = TestContext::new();
    let a = t.user("a");
    let b = t.user("b");
    t.user("c");
    t.client
        .create::<Group>()
        .set("name", "g1")
        .add_edge("users", [a.id, b.id])
        .save(&t.ctx)
        .unwrap();
    t.client
        .create::<Group>()
        .set("name", "g2")
        .add_edge("users", [a.id])
        .save(&t.ctx)
        .unwrap();
    t.take_queries();

    let groups = t
        .client
        .query::<Group>()
        .order(asc("name"))
        .with_edge("users", |g: &mut Group, u: User| g.users.push(u), |q| q)
        .all(&t.ctx)
        .unwrap();
    assert_eq!(t.take_queries(), 2);
    assert_eq!(user_names(&groups[0].users), vec!["a", "b"]);
    assert_eq!(user_names(&groups[1].users), vec!["a"]);

    let users = t
        .client
        .query::<User>()
        .order(asc("name"))
        .with_edge("groups", |u: &mut User, g: Group| u.groups.push(g), |q| q)
        .all(&t.ctx)
        .unwrap();
    assert_eq!(users[0].groups.len(), 2);
    assert_eq!(users[1].groups.len(), 1);
    assert!(users[2].groups.is_empty());
    assert!(users[2].loaded.is_loaded(User::GROUPS));
}

#[test]
fn test_bidi_friends_loaded_once() {
    let t = TestContext::new();
    let a = t.user("a");
    let b = t.user("b");
    let c = t.user("c");
    t.client
        .update_one(&a)
        .add_edge("friends", [b.id, c.id])
        .exec(&t.ctx)
        .unwrap();

    let users = t
        .client
        .query::<User>()
        .order(asc("name"))
        .with_edge("friends", |u: &mut User, f: User| u.friends.push(f), |q| q)
        .all(&t.ctx)
        .unwrap();
    assert_eq!(user_names(users[0].friends().unwrap()), vec!["b", "c"]);
    assert_eq!(user_names(users[1].friends().unwrap()), vec!["a"]);
    assert_eq!(user_names(users[2].friends().unwrap()), vec!["a"]);
}

#[test]
fn test_unknown_edge_is_rejected() {
    let t = TestContext::new();
    let err = t
        .client
        .query::<User>()
        .with_edge("enemies", |u: &mut User, f: User| u.friends.push(f), |q| q)
        .all(&t.ctx)
        .unwrap_err();
    assert!(matches!(err, Error::InvalidSpec(_)));
    assert!(User::schema().edge("enemies").is_err());
}

/// Cancels the caller's context once the first query has returned.
struct CancelAfterFirst {
    inner: SqliteDriver,
    cancel: CancelHandle,
}

impl Driver for CancelAfterFirst {
    fn dialect(&self) -> Dialect {
        self.inner.dialect()
    }

    fn exec(&self, ctx: &Context, query: &str, args: &[Value]) -> Result<ExecResult, DriverError> {
        self.inner.exec(ctx, query, args)
    }

    fn query(&self, ctx: &Context, query: &str, args: &[Value]) -> Result<Rows, DriverError> {
        let rows = self.inner.query(ctx, query, args)?;
        self.cancel.cancel();
        Ok(rows)
    }

    fn supports_tx(&self) -> bool {
        false
    }

    fn begin(&self, _ctx: &Context) -> Result<Arc<dyn TxDriver>, DriverError> {
        Err(DriverError::new("transactions disabled"))
    }
}

#[test]
fn test_cancel_aborts_edge_loads() {
    let t = TestContext::new();
    let a = t.user("a");
    t.pet("rex", Some(&a));

    let (ctx, cancel) = t.ctx.with_cancel();
    let client = Client::new(Arc::new(CancelAfterFirst {
        inner: t.driver.clone(),
        cancel,
    }));
    let err = client
        .query::<User>()
        .with_edge("pets", |u: &mut User, p: Pet| u.pets.push(p), |q| q)
        .all(&ctx)
        .unwrap_err();
    assert!(err.is_cancelled());
}
