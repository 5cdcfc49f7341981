//! Typed create, update and delete builders.

use std::collections::HashSet;
use std::marker::PhantomData;

use nodegraph_sql::Value;

use crate::client::Client;
use crate::context::Context;
use crate::entity::Entity;
use crate::error::Error;
use crate::graph::{self, CreateSpec, DeleteSpec, FieldSpec, UpdateSpec};
use crate::middleware::{Operation, Outcome};
use crate::predicate::{self, Predicate};
use crate::query::{unexpected, unexpected_outcome, Collect};
use crate::schema::{EdgeSchema, FieldDescriptor, NodeSchema};

fn lookup<'a>(schema: &'a NodeSchema, name: &str) -> Result<&'a FieldDescriptor, Error> {
    schema
        .field(name)
        .ok_or_else(|| Error::validation(name, format!("unknown field for {}", schema.label())))
}

fn coerce_field(f: &FieldDescriptor, v: Value) -> Result<Value, Error> {
    v.coerce(f.field_type())
        .map_err(|e| Error::validation(f.name(), e.to_string()))
}

fn edge_targets(edge: &EdgeSchema, ids: &[Value]) -> Result<Vec<Value>, Error> {
    let ty = edge.spec(Vec::new()).target.id.field_type;
    ids.iter()
        .map(|id| {
            id.clone()
                .coerce(ty)
                .map_err(|e| Error::validation(edge.name(), e.to_string()))
        })
        .collect()
}

/// Builder for a single node.
pub struct Create<E: Entity> {
    client: Client,
    id: Option<Value>,
    values: Vec<(String, Value)>,
    edges: Vec<(String, Vec<Value>)>,
    _node: PhantomData<fn() -> E>,
}

impl<E: Entity> Create<E> {
    pub(crate) fn new(client: Client) -> Self {
        Self {
            client,
            id: None,
            values: Vec::new(),
            edges: Vec::new(),
            _node: PhantomData,
        }
    }

    /// Set a field by name or column.
    pub fn set(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.values.push((field.to_string(), value.into()));
        self
    }

    /// Insert with an explicit id instead of a generated one.
    pub fn set_id(mut self, id: impl Into<Value>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Link the new node to existing nodes along `edge`.
    pub fn add_edge<V: Into<Value>>(mut self, edge: &str, ids: impl IntoIterator<Item = V>) -> Self {
        let ids = ids.into_iter().map(Into::into);
        match self.edges.iter_mut().find(|(e, _)| e == edge) {
            Some((_, existing)) => existing.extend(ids),
            None => self.edges.push((edge.to_string(), ids.collect())),
        }
        self
    }

    fn spec(&self) -> Result<CreateSpec, Error> {
        let schema = E::schema();
        for (name, _) in &self.values {
            lookup(schema, name)?;
        }

        let mut spec = CreateSpec::new(schema.table(), schema.id_spec());
        if let Some(id) = &self.id {
            let id = coerce_field(schema.id(), id.clone())?;
            schema.id().validate(&id)?;
            spec.id.value = Some(id);
        }

        for f in schema.fields() {
            let set = self
                .values
                .iter()
                .rev()
                .find(|(name, _)| name == f.name() || name == f.column())
                .map(|(_, v)| v.clone());
            let value = match set {
                Some(v) => {
                    let v = coerce_field(f, v)?;
                    f.validate(&v)?;
                    Some(v)
                }
                None => match f.default_value() {
                    Some(d) => Some(d),
                    None if f.is_required() => return Err(Error::validation(f.name(), "missing required field")),
                    None => None,
                },
            };
            if let Some(v) = value {
                spec.fields
                    .push(FieldSpec::new(f.column(), f.field_type()).with_value(v));
            }
        }

        for (name, ids) in &self.edges {
            let edge = schema.edge(name)?;
            if edge.is_unique() && ids.len() > 1 {
                return Err(Error::validation(name.as_str(), "edge takes a single node"));
            }
            spec.edges.push(edge.spec(edge_targets(edge, ids)?));
        }
        Ok(spec)
    }

    /// Insert the node and return it.
    pub fn save(self, ctx: &Context) -> Result<E, Error> {
        let spec = self.spec()?;
        let mut nodes = run_create::<E>(&self.client, &ctx.with_op("Create"), vec![spec])?;
        nodes
            .pop()
            .ok_or_else(|| Error::InvalidSpec("create returned no node".into()))
    }

    pub fn exec(self, ctx: &Context) -> Result<(), Error> {
        self.save(ctx).map(|_| ())
    }
}

/// Builder for several nodes inserted together.
pub struct CreateBulk<E: Entity> {
    client: Client,
    builders: Vec<Create<E>>,
}

impl<E: Entity> CreateBulk<E> {
    pub(crate) fn new(client: Client, builders: Vec<Create<E>>) -> Self {
        Self { client, builders }
    }

    /// Insert all nodes; returned nodes are in input order.
    pub fn save(self, ctx: &Context) -> Result<Vec<E>, Error> {
        let specs = self
            .builders
            .iter()
            .map(Create::spec)
            .collect::<Result<Vec<_>, _>>()?;
        run_create::<E>(&self.client, &ctx.with_op("CreateBulk"), specs)
    }

    pub fn exec(self, ctx: &Context) -> Result<(), Error> {
        self.save(ctx).map(|_| ())
    }
}

fn run_create<E: Entity>(client: &Client, ctx: &Context, mut specs: Vec<CreateSpec>) -> Result<Vec<E>, Error> {
    let label = E::schema().label();
    let drv = client.driver();
    let mut terminal = |ctx: &Context, op: &mut Operation<'_>| -> Result<Outcome, Error> {
        match op {
            Operation::Create { specs, .. } => graph::create_nodes(ctx, drv, specs).map(Outcome::Created),
            other => Err(unexpected(other)),
        }
    };
    let ids = match client.run(ctx, &mut Operation::Create { label, specs: &mut specs }, &mut terminal)? {
        Outcome::Created(ids) => ids,
        other => return Err(unexpected_outcome("create", &other)),
    };
    if ids.len() != specs.len() {
        return Err(Error::InvalidSpec(format!(
            "created {} ids for {} nodes",
            ids.len(),
            specs.len()
        )));
    }
    specs
        .iter()
        .zip(ids)
        .map(|(spec, id)| created::<E>(spec, id))
        .collect()
}

/// Build the node from what was inserted.
fn created<E: Entity>(spec: &CreateSpec, id: Value) -> Result<E, Error> {
    let schema = E::schema();
    let mut columns = vec![spec.id.column.clone()];
    let mut values = vec![id.coerce(spec.id.field_type)?];
    for f in &spec.fields {
        if schema.valid_column(&f.column) && !columns.contains(&f.column) {
            columns.push(f.column.clone());
            values.push(f.value.clone().unwrap_or(Value::Null));
        }
    }
    for e in spec.edges.iter().filter(|e| e.owns_fk()) {
        if let [target] = e.target.nodes.as_slice() {
            let fk = &e.columns[0];
            if schema.valid_column(fk) && !columns.contains(fk) {
                columns.push(fk.clone());
                values.push(target.clone());
            }
        }
    }
    let mut node = E::default();
    node.assign_values(&columns, values)?;
    Ok(node)
}

#[derive(Clone)]
enum FieldOp {
    Set(String, Value),
    Add(String, Value),
    Clear(String),
}

#[derive(Clone)]
enum EdgeOp {
    Add(String, Vec<Value>),
    Remove(String, Vec<Value>),
    Clear(String),
}

/// Field and edge changes shared by the update builders, replayed in call
/// order.
#[derive(Clone, Default)]
struct Changes {
    fields: Vec<FieldOp>,
    edges: Vec<EdgeOp>,
}

impl Changes {
    fn apply<E: Entity>(&self, spec: &mut UpdateSpec) -> Result<(), Error> {
        let schema = E::schema();
        let mut touched = HashSet::new();
        for op in &self.fields {
            let name = match op {
                FieldOp::Set(n, _) | FieldOp::Add(n, _) | FieldOp::Clear(n) => n,
            };
            let f = lookup(schema, name)?;
            if f.is_immutable() {
                return Err(Error::validation(f.name(), "field is immutable"));
            }
            let field = FieldSpec::new(f.column(), f.field_type());
            match op {
                FieldOp::Set(_, v) => {
                    let v = coerce_field(f, v.clone())?;
                    f.validate(&v)?;
                    spec.set_field(field, v);
                }
                FieldOp::Add(_, d) => {
                    if !f.field_type().is_numeric() {
                        return Err(Error::validation(f.name(), "field is not numeric"));
                    }
                    let d = coerce_field(f, d.clone())?;
                    spec.add_field(field, d)?;
                }
                FieldOp::Clear(_) => {
                    if !f.is_nullable() {
                        return Err(Error::validation(f.name(), "field is not nullable"));
                    }
                    spec.clear_field(field);
                }
            }
            touched.insert(f.column().to_string());
        }
        for f in schema.fields() {
            if touched.contains(f.column()) {
                continue;
            }
            if let Some(v) = f.update_default_value() {
                spec.set_field(FieldSpec::new(f.column(), f.field_type()), v);
            }
        }

        for op in &self.edges {
            let name = match op {
                EdgeOp::Add(n, _) | EdgeOp::Remove(n, _) | EdgeOp::Clear(n) => n,
            };
            let edge = schema.edge(name)?;
            match op {
                EdgeOp::Add(_, ids) => {
                    let ids = edge_targets(edge, ids)?;
                    spec.edge_mut(edge.spec(Vec::new())).add.extend(ids);
                }
                EdgeOp::Remove(_, ids) => {
                    let ids = edge_targets(edge, ids)?;
                    spec.edge_mut(edge.spec(Vec::new())).remove.extend(ids);
                }
                EdgeOp::Clear(_) => spec.edge_mut(edge.spec(Vec::new())).clear = true,
            }
        }
        Ok(())
    }
}

macro_rules! change_setters {
    () => {
        /// Set a field by name or column.
        pub fn set(mut self, field: &str, value: impl Into<Value>) -> Self {
            self.changes.fields.push(FieldOp::Set(field.to_string(), value.into()));
            self
        }

        /// Add to a numeric field; NULL counts as zero.
        pub fn add(mut self, field: &str, delta: impl Into<Value>) -> Self {
            self.changes.fields.push(FieldOp::Add(field.to_string(), delta.into()));
            self
        }

        /// Set a nullable field to NULL.
        pub fn clear(mut self, field: &str) -> Self {
            self.changes.fields.push(FieldOp::Clear(field.to_string()));
            self
        }

        pub fn add_edge<V: Into<Value>>(mut self, edge: &str, ids: impl IntoIterator<Item = V>) -> Self {
            let ids = ids.into_iter().map(Into::into).collect();
            self.changes.edges.push(EdgeOp::Add(edge.to_string(), ids));
            self
        }

        pub fn remove_edge<V: Into<Value>>(mut self, edge: &str, ids: impl IntoIterator<Item = V>) -> Self {
            let ids = ids.into_iter().map(Into::into).collect();
            self.changes.edges.push(EdgeOp::Remove(edge.to_string(), ids));
            self
        }

        /// Unlink every neighbor along `edge`.
        pub fn clear_edge(mut self, edge: &str) -> Self {
            self.changes.edges.push(EdgeOp::Clear(edge.to_string()));
            self
        }

        pub fn filter(mut self, pred: Predicate) -> Self {
            self.predicates.push(pred);
            self
        }
    };
}

/// Update of every node matching the filters.
pub struct Update<E: Entity> {
    client: Client,
    predicates: Vec<Predicate>,
    changes: Changes,
    _node: PhantomData<fn() -> E>,
}

impl<E: Entity> Update<E> {
    pub(crate) fn new(client: Client) -> Self {
        Self {
            client,
            predicates: Vec::new(),
            changes: Changes::default(),
            _node: PhantomData,
        }
    }

    change_setters!();

    /// Apply the update; returns the number of matched nodes.
    pub fn exec(self, ctx: &Context) -> Result<usize, Error> {
        let schema = E::schema();
        let label = schema.label();
        let mut spec = UpdateSpec::new(schema.node_spec(schema.columns().to_vec()));
        if !self.predicates.is_empty() {
            spec.predicate = Some(Predicate::and(self.predicates));
        }
        self.changes.apply::<E>(&mut spec)?;

        let drv = self.client.driver();
        let mut terminal = |ctx: &Context, op: &mut Operation<'_>| -> Result<Outcome, Error> {
            match op {
                Operation::Update { spec, .. } => graph::update_nodes(ctx, drv, spec).map(Outcome::Affected),
                other => Err(unexpected(other)),
            }
        };
        let mut op = Operation::Update {
            label,
            spec: &mut spec,
            one: false,
        };
        match self.client.run(&ctx.with_op("Update"), &mut op, &mut terminal)? {
            Outcome::Affected(n) => Ok(n),
            other => Err(unexpected_outcome("update", &other)),
        }
    }
}

/// Update of a single node by id, returning the node as stored afterwards.
pub struct UpdateOne<E: Entity> {
    client: Client,
    id: Value,
    predicates: Vec<Predicate>,
    fields: Vec<String>,
    changes: Changes,
    _node: PhantomData<fn() -> E>,
}

impl<E: Entity> UpdateOne<E> {
    pub(crate) fn new(client: Client, id: Value) -> Self {
        Self {
            client,
            id,
            predicates: Vec::new(),
            fields: Vec::new(),
            changes: Changes::default(),
            _node: PhantomData,
        }
    }

    change_setters!();

    /// Restrict the columns read back after the update.
    pub fn select(mut self, fields: &[&str]) -> Self {
        self.fields = fields.iter().map(|f| f.to_string()).collect();
        self
    }

    pub fn save(self, ctx: &Context) -> Result<E, Error> {
        let schema = E::schema();
        let label = schema.label();
        let columns = if self.fields.is_empty() {
            schema.columns().to_vec()
        } else {
            self.fields
                .iter()
                .map(|f| {
                    schema
                        .column_of(f)
                        .map(str::to_string)
                        .ok_or_else(|| Error::validation(f.as_str(), "invalid field for query"))
                })
                .collect::<Result<Vec<_>, _>>()?
        };
        let mut spec = UpdateSpec::new(schema.node_spec(columns));
        spec.node.id.value = Some(coerce_field(schema.id(), self.id)?);
        if !self.predicates.is_empty() {
            spec.predicate = Some(Predicate::and(self.predicates));
        }
        self.changes.apply::<E>(&mut spec)?;

        let drv = self.client.driver();
        let mut sink = Collect::<E>::new(Vec::new());
        let mut terminal = |ctx: &Context, op: &mut Operation<'_>| -> Result<Outcome, Error> {
            match op {
                Operation::Update { spec, .. } => {
                    graph::update_node(ctx, drv, spec, &mut sink).map(|_| Outcome::Affected(1))
                }
                other => Err(unexpected(other)),
            }
        };
        let mut op = Operation::Update {
            label,
            spec: &mut spec,
            one: true,
        };
        self.client
            .run(&ctx.with_op("UpdateOne"), &mut op, &mut terminal)
            .map_err(|e| e.with_label(label))?;
        sink.nodes.pop().ok_or_else(|| Error::not_found(label))
    }

    pub fn exec(self, ctx: &Context) -> Result<(), Error> {
        self.save(ctx).map(|_| ())
    }
}

/// Delete of every node matching the filters.
pub struct Delete<E: Entity> {
    client: Client,
    predicates: Vec<Predicate>,
    _node: PhantomData<fn() -> E>,
}

impl<E: Entity> Delete<E> {
    pub(crate) fn new(client: Client) -> Self {
        Self {
            client,
            predicates: Vec::new(),
            _node: PhantomData,
        }
    }

    pub fn filter(mut self, pred: Predicate) -> Self {
        self.predicates.push(pred);
        self
    }

    /// Delete; returns the number of deleted nodes.
    pub fn exec(self, ctx: &Context) -> Result<usize, Error> {
        self.run(&ctx.with_op("Delete"))
    }

    fn run(self, ctx: &Context) -> Result<usize, Error> {
        let schema = E::schema();
        let label = schema.label();
        let mut spec = DeleteSpec::new(schema.node_spec(Vec::new()));
        if !self.predicates.is_empty() {
            spec.predicate = Some(Predicate::and(self.predicates));
        }
        let drv = self.client.driver();
        let mut terminal = |ctx: &Context, op: &mut Operation<'_>| -> Result<Outcome, Error> {
            match op {
                Operation::Delete { spec, .. } => graph::delete_nodes(ctx, drv, spec).map(Outcome::Affected),
                other => Err(unexpected(other)),
            }
        };
        match self
            .client
            .run(ctx, &mut Operation::Delete { label, spec: &mut spec }, &mut terminal)?
        {
            Outcome::Affected(n) => Ok(n),
            other => Err(unexpected_outcome("delete", &other)),
        }
    }
}

/// Delete of a single node by id.
pub struct DeleteOne<E: Entity> {
    delete: Delete<E>,
}

impl<E: Entity> DeleteOne<E> {
    pub(crate) fn new(client: Client, id: Value) -> Self {
        let column = E::schema().id().column().to_string();
        Self {
            delete: Delete::new(client).filter(predicate::eq(&column, id)),
        }
    }

    /// Delete the node; not-found if it does not exist.
    pub fn exec(self, ctx: &Context) -> Result<(), Error> {
        match self.delete.run(&ctx.with_op("DeleteOne"))? {
            0 => Err(Error::not_found(E::schema().label())),
            _ => Ok(()),
        }
    }
}
