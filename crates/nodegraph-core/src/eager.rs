//! Batched eager loading of edges.
//!
//! Each requested edge is loaded with one query for all owners, whatever
//! their number, and the neighbors are routed back to their owners by key.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use nodegraph_sql::{Column, Expr, Key, Value};

use crate::context::Context;
use crate::entity::Entity;
use crate::error::Error;
use crate::predicate;
use crate::query::Query;
use crate::schema::EdgeSchema;

pub(crate) trait EagerLoad<E>: Send + Sync {
    fn load(&self, ctx: &Context, owners: &mut [E]) -> Result<(), Error>;
}

/// Loads one edge of `E` whose neighbors are `N`.
pub(crate) struct EdgeLoad<E: Entity, N: Entity> {
    edge: EdgeSchema,
    query: Query<N>,
    assign: Arc<dyn Fn(&mut E, N) + Send + Sync>,
}

impl<E: Entity, N: Entity> EdgeLoad<E, N> {
    pub(crate) fn new(edge: EdgeSchema, query: Query<N>, assign: impl Fn(&mut E, N) + Send + Sync + 'static) -> Self {
        Self {
            edge,
            query,
            assign: Arc::new(assign),
        }
    }

    fn unexpected(&self, column: &str, value: &Value) -> Error {
        Error::UnexpectedForeignKey {
            column: column.to_string(),
            value: value.to_string(),
        }
    }

    /// The owners hold the foreign key: fetch targets by id.
    fn load_owner_fk(&self, ctx: &Context, owners: &mut [E]) -> Result<(), Error> {
        let fk = self.edge.fk_column();
        let mut index: HashMap<Key, Vec<usize>> = HashMap::new();
        let mut keys = Vec::new();
        for (i, o) in owners.iter().enumerate() {
            let Some(v) = o.value(fk) else { continue };
            let Some(k) = v.key() else { continue };
            let slot = index.entry(k).or_default();
            if slot.is_empty() {
                keys.push(v);
            }
            slot.push(i);
        }
        if keys.is_empty() {
            return Ok(());
        }

        let nodes = self
            .query
            .clone()
            .filter(predicate::in_(self.edge.target_id(), keys))
            .load(ctx, Vec::new())?
            .nodes;
        for n in nodes {
            let id = n.id();
            let idx = id
                .key()
                .and_then(|k| index.get(&k))
                .ok_or_else(|| self.unexpected(fk, &id))?;
            for &i in idx {
                (self.assign)(&mut owners[i], n.clone());
            }
        }
        Ok(())
    }

    /// The targets hold the foreign key: fetch targets pointing at the owners.
    fn load_target_fk(&self, ctx: &Context, owners: &mut [E]) -> Result<(), Error> {
        let fk = self.edge.fk_column();
        let (index, ids) = owner_index(owners);

        let mut query = self.query.clone();
        query.ensure_field(fk);
        let nodes = query.filter(predicate::in_(fk, ids)).load(ctx, Vec::new())?.nodes;
        for n in nodes {
            let v = n.value(fk).unwrap_or(Value::Null);
            if v.is_null() {
                return Err(Error::MissingForeignKey {
                    column: fk.to_string(),
                    node: n.id().to_string(),
                });
            }
            let idx = v
                .key()
                .and_then(|k| index.get(&k))
                .ok_or_else(|| self.unexpected(fk, &v))?;
            for &i in idx {
                (self.assign)(&mut owners[i], n.clone());
            }
        }
        Ok(())
    }

    /// Join the edge table and read the owner side of each pair as a
    /// leading column.
    fn load_m2m(&self, ctx: &Context, owners: &mut [E]) -> Result<(), Error> {
        let (index, ids) = owner_index(owners);
        let table = self.edge.table().to_string();
        let target_id = self.edge.target_id().to_string();
        let (owner, other) = {
            let (o, t) = self.edge.join_columns();
            (o.to_string(), t.to_string())
        };
        let bidi = self.edge.is_bidi();

        let query = self.query.clone().modify(move |s| {
            let alias = format!("t{}", s.depth() + 1);
            let j = |c: &str| Column::qualified(alias.as_str(), c);
            let target = s.c(&target_id);
            if bidi {
                let on = Expr::or(vec![
                    Expr::and(vec![
                        Expr::columns_eq(target.clone(), j(&other)),
                        Expr::in_values(j(&owner), ids.clone()),
                    ]),
                    Expr::and(vec![
                        Expr::columns_eq(target, j(&owner)),
                        Expr::in_values(j(&other), ids.clone()),
                    ]),
                ]);
                s.join(table.as_str(), Some(alias.clone()), on);
                s.prepend_columns(vec![j(&owner), j(&other)]);
            } else {
                s.join(table.as_str(), Some(alias.clone()), Expr::columns_eq(target, j(&other)));
                s.where_(Expr::in_values(j(&owner), ids.clone()));
                s.prepend_columns(vec![j(&owner)]);
            }
            s.set_distinct(false);
        });

        let id_type = E::schema().id().field_type();
        let prefix = if bidi { vec![id_type; 2] } else { vec![id_type] };
        let collected = query.load(ctx, prefix)?;
        let column = self.edge.columns()[0].as_str();
        let mut seen: HashSet<(Key, Option<Key>)> = HashSet::new();
        for (n, pair) in collected.nodes.into_iter().zip(collected.prefixes) {
            let owner_id = match pair.as_slice() {
                [c0, c1] if bidi => {
                    if c1.key().is_some() && c1.key() == n.id().key() {
                        c0
                    } else {
                        c1
                    }
                }
                [o, ..] => o,
                [] => continue,
            };
            let key = owner_id.key().ok_or_else(|| self.unexpected(column, owner_id))?;
            let idx = index.get(&key).ok_or_else(|| self.unexpected(column, owner_id))?;
            if bidi && !seen.insert((key, n.id().key())) {
                continue;
            }
            for &i in idx {
                (self.assign)(&mut owners[i], n.clone());
            }
        }
        Ok(())
    }
}

fn owner_index<E: Entity>(owners: &[E]) -> (HashMap<Key, Vec<usize>>, Vec<Value>) {
    let mut index: HashMap<Key, Vec<usize>> = HashMap::new();
    let mut ids = Vec::new();
    for (i, o) in owners.iter().enumerate() {
        let id = o.id();
        let Some(k) = id.key() else { continue };
        let slot = index.entry(k).or_default();
        if slot.is_empty() {
            ids.push(id);
        }
        slot.push(i);
    }
    (index, ids)
}

impl<E: Entity, N: Entity> EagerLoad<E> for EdgeLoad<E, N> {
    fn load(&self, ctx: &Context, owners: &mut [E]) -> Result<(), Error> {
        if owners.is_empty() {
            return Ok(());
        }
        if self.edge.is_m2m() {
            self.load_m2m(ctx, owners)?;
        } else if self.edge.owns_fk() {
            self.load_owner_fk(ctx, owners)?;
        } else {
            self.load_target_fk(ctx, owners)?;
        }
        for o in owners.iter_mut() {
            o.mark_loaded(self.edge.ordinal());
        }
        Ok(())
    }
}
