//! The typed query builder.

use std::marker::PhantomData;
use std::sync::Arc;

use nodegraph_sql::{AggregateFunc, FieldType, Selector, Value};

use crate::client::Client;
use crate::context::Context;
use crate::driver::Rows;
use crate::eager::{EagerLoad, EdgeLoad};
use crate::entity::Entity;
use crate::error::Error;
use crate::graph::{self, Aggregate, NodeSink, QuerySpec, StepSource};
use crate::middleware::{Operation, Outcome};
use crate::predicate::{Modifier, Order, Predicate};
use crate::schema::NodeSchema;

/// A query over nodes of type `E`.
///
/// Builders consume and return the query; terminal operations run it. A
/// query is cheap to clone, so one prepared query can be executed several
/// ways.
#[derive(Clone)]
pub struct Query<E: Entity> {
    client: Client,
    predicates: Vec<Predicate>,
    order: Vec<Order>,
    limit: Option<u64>,
    offset: Option<u64>,
    unique: Option<bool>,
    fields: Vec<String>,
    required: Vec<String>,
    group_by: Vec<String>,
    from: Option<Selector>,
    invalid: Option<String>,
    with: Vec<Arc<dyn EagerLoad<E>>>,
    modifiers: Vec<Modifier>,
    _node: PhantomData<fn() -> E>,
}

impl<E: Entity> Query<E> {
    pub(crate) fn new(client: Client) -> Self {
        Self {
            client,
            predicates: Vec::new(),
            order: Vec::new(),
            limit: None,
            offset: None,
            unique: None,
            fields: Vec::new(),
            required: Vec::new(),
            group_by: Vec::new(),
            from: None,
            invalid: None,
            with: Vec::new(),
            modifiers: Vec::new(),
            _node: PhantomData,
        }
    }

    /// A query over the neighbors of `source` along `edge` of `schema`.
    pub(crate) fn traverse(client: Client, schema: &NodeSchema, edge: &str, source: StepSource) -> Self {
        let mut q = Self::new(client);
        let edge = match schema.edge(edge) {
            Ok(edge) => edge,
            Err(err) => {
                q.invalid = Some(err.to_string());
                return q;
            }
        };
        if edge.target_table() != E::schema().table() {
            q.invalid = Some(format!(
                "edge {:?} of {} does not lead to {}",
                edge.name(),
                schema.label(),
                E::schema().label()
            ));
            return q;
        }
        match graph::set_neighbors(q.client.dialect(), &edge.step(source)) {
            Ok(s) => q.from = Some(s),
            Err(err) => q.invalid = Some(err.to_string()),
        }
        q
    }

    /// Add a predicate; predicates are AND-ed.
    pub fn filter(mut self, pred: Predicate) -> Self {
        self.predicates.push(pred);
        self
    }

    pub fn order(mut self, order: Order) -> Self {
        self.order.push(order);
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Force or suppress DISTINCT; unset follows the client configuration.
    pub fn unique(mut self, unique: bool) -> Self {
        self.unique = Some(unique);
        self
    }

    /// Restrict the columns read. The id is always read.
    pub fn select(mut self, fields: &[&str]) -> Self {
        self.fields = fields.iter().map(|f| f.to_string()).collect();
        self
    }

    /// Group rows for [`Query::aggregate`].
    pub fn group_by(mut self, fields: &[&str]) -> Self {
        self.group_by = fields.iter().map(|f| f.to_string()).collect();
        self
    }

    /// Apply an arbitrary change to the compiled selector.
    pub fn modify(mut self, f: impl Fn(&mut Selector) + Send + Sync + 'static) -> Self {
        self.modifiers.push(Arc::new(f));
        self
    }

    /// Eager-load `edge`. `assign` receives every neighbor of every node;
    /// `configure` shapes the neighbor query, including nested loads.
    pub fn with_edge<N: Entity>(
        mut self,
        edge: &str,
        assign: impl Fn(&mut E, N) + Send + Sync + 'static,
        configure: impl FnOnce(Query<N>) -> Query<N>,
    ) -> Self {
        let schema = E::schema();
        match schema.edge(edge) {
            Ok(e) if e.target_table() == N::schema().table() => {
                if e.owns_fk() {
                    self.ensure_field(e.fk_column());
                }
                let query = configure(Query::new(self.client.clone()));
                self.with.push(Arc::new(EdgeLoad::new(e.clone(), query, assign)));
            }
            Ok(_) => {
                self.invalid = Some(format!(
                    "edge {edge:?} of {} does not lead to {}",
                    schema.label(),
                    N::schema().label()
                ));
            }
            Err(err) => self.invalid = Some(err.to_string()),
        }
        self
    }

    /// Continue the traversal along `edge` from the nodes this query selects.
    pub fn query_edge<N: Entity>(&self, edge: &str) -> Query<N> {
        match self.query_spec() {
            Ok(spec) => {
                let source = graph::selector(self.client.dialect(), &spec);
                Query::traverse(self.client.clone(), E::schema(), edge, StepSource::Select(source))
            }
            Err(err) => {
                let mut q = Query::new(self.client.clone());
                q.invalid = Some(err.to_string());
                q
            }
        }
    }

    /// Read `column` even when `select` restricts the columns, whether
    /// `select` runs before or after this call.
    pub(crate) fn ensure_field(&mut self, column: &str) {
        if !self.required.iter().any(|f| f == column) {
            self.required.push(column.to_string());
        }
    }

    fn resolve(fields: &[String]) -> Result<Vec<String>, Error> {
        let schema = E::schema();
        fields
            .iter()
            .map(|f| {
                schema
                    .column_of(f)
                    .map(str::to_string)
                    .ok_or_else(|| Error::validation(f.as_str(), "invalid field for query"))
            })
            .collect()
    }

    /// The spec this query compiles to.
    pub fn query_spec(&self) -> Result<QuerySpec, Error> {
        if let Some(invalid) = &self.invalid {
            return Err(Error::InvalidSpec(invalid.clone()));
        }
        let schema = E::schema();
        let columns = if self.fields.is_empty() {
            schema.columns().to_vec()
        } else {
            let mut columns = Self::resolve(&self.fields)?;
            for c in Self::resolve(&self.required)? {
                if !columns.contains(&c) {
                    columns.push(c);
                }
            }
            columns
        };
        let mut spec = QuerySpec::new(schema.node_spec(columns));
        spec.from = self.from.clone();
        if !self.predicates.is_empty() {
            spec.predicate = Some(Predicate::and(self.predicates.clone()));
        }
        spec.order = self.order.clone();
        spec.modifiers = self.modifiers.clone();
        spec.limit = self.limit;
        spec.offset = self.offset;
        spec.unique = self.unique.unwrap_or(self.client.config().unique_by_default);
        Ok(spec)
    }

    /// Run the query, then its eager loads. `prefix` types leading columns
    /// added by modifiers.
    pub(crate) fn load(self, ctx: &Context, prefix: Vec<FieldType>) -> Result<Collect<E>, Error> {
        let mut spec = self.query_spec()?;
        let label = E::schema().label();
        let drv = self.client.driver();
        let mut sink = Collect::new(prefix);
        let mut terminal = |ctx: &Context, op: &mut Operation<'_>| -> Result<Outcome, Error> {
            match op {
                Operation::Query { spec, .. } => graph::query_nodes(ctx, drv, spec, &mut sink).map(Outcome::Nodes),
                other => Err(unexpected(other)),
            }
        };
        self.client
            .run(ctx, &mut Operation::Query { label, spec: &mut spec }, &mut terminal)
            .map_err(|e| e.with_label(label))?;
        for w in &self.with {
            w.load(ctx, &mut sink.nodes)?;
        }
        Ok(sink)
    }

    /// All matching nodes.
    pub fn all(self, ctx: &Context) -> Result<Vec<E>, Error> {
        Ok(self.load(&ctx.with_op("All"), Vec::new())?.nodes)
    }

    /// The first matching node; not-found when there is none.
    pub fn first(self, ctx: &Context) -> Result<E, Error> {
        let label = E::schema().label();
        self.limit(1)
            .load(&ctx.with_op("First"), Vec::new())?
            .nodes
            .into_iter()
            .next()
            .ok_or_else(|| Error::not_found(label))
    }

    /// The only matching node; not-found or not-singular otherwise.
    pub fn only(self, ctx: &Context) -> Result<E, Error> {
        let label = E::schema().label();
        let mut nodes = self.limit(2).load(&ctx.with_op("Only"), Vec::new())?.nodes;
        match nodes.len() {
            0 => Err(Error::not_found(label)),
            1 => Ok(nodes.remove(0)),
            _ => Err(Error::NotSingular {
                label: label.to_string(),
            }),
        }
    }

    fn id_query(mut self, ctx: &Context) -> Result<Vec<Value>, Error> {
        let schema = E::schema();
        if self.unique.is_none() {
            self.unique = Some(true);
        }
        self.fields = vec![schema.id().column().to_string()];
        self.required.clear();
        let mut spec = self.query_spec()?;
        let label = schema.label();
        let drv = self.client.driver();
        let mut sink = Ids {
            ty: schema.id().field_type(),
            ids: Vec::new(),
        };
        let mut terminal = |ctx: &Context, op: &mut Operation<'_>| -> Result<Outcome, Error> {
            match op {
                Operation::Query { spec, .. } => graph::query_nodes(ctx, drv, spec, &mut sink).map(Outcome::Nodes),
                other => Err(unexpected(other)),
            }
        };
        self.client
            .run(ctx, &mut Operation::Query { label, spec: &mut spec }, &mut terminal)
            .map_err(|e| e.with_label(label))?;
        Ok(sink.ids)
    }

    /// Ids of all matching nodes.
    pub fn ids(self, ctx: &Context) -> Result<Vec<Value>, Error> {
        self.id_query(&ctx.with_op("IDs"))
    }

    pub fn first_id(self, ctx: &Context) -> Result<Value, Error> {
        let label = E::schema().label();
        self.limit(1)
            .id_query(&ctx.with_op("FirstID"))?
            .into_iter()
            .next()
            .ok_or_else(|| Error::not_found(label))
    }

    pub fn only_id(self, ctx: &Context) -> Result<Value, Error> {
        let label = E::schema().label();
        let mut ids = self.limit(2).id_query(&ctx.with_op("OnlyID"))?;
        match ids.len() {
            0 => Err(Error::not_found(label)),
            1 => Ok(ids.remove(0)),
            _ => Err(Error::NotSingular {
                label: label.to_string(),
            }),
        }
    }

    /// Number of matching nodes. With `select` and `unique` this counts
    /// distinct values of the selected columns.
    pub fn count(self, ctx: &Context) -> Result<usize, Error> {
        let ctx = ctx.with_op("Count");
        let mut spec = self.query_spec()?;
        spec.node.columns = Self::resolve(&self.fields)?;
        let label = E::schema().label();
        let drv = self.client.driver();
        let mut terminal = |ctx: &Context, op: &mut Operation<'_>| -> Result<Outcome, Error> {
            match op {
                Operation::Count { spec, .. } => graph::count_nodes(ctx, drv, spec).map(Outcome::Count),
                other => Err(unexpected(other)),
            }
        };
        match self
            .client
            .run(&ctx, &mut Operation::Count { label, spec: &mut spec }, &mut terminal)?
        {
            Outcome::Count(n) => Ok(n),
            other => Err(unexpected_outcome("count", &other)),
        }
    }

    /// Whether any node matches.
    pub fn exist(self, ctx: &Context) -> Result<bool, Error> {
        let ctx = ctx.with_op("Exist");
        let mut spec = self.query_spec()?;
        let label = E::schema().label();
        let drv = self.client.driver();
        let mut terminal = |ctx: &Context, op: &mut Operation<'_>| -> Result<Outcome, Error> {
            match op {
                Operation::Exist { spec, .. } => graph::exist_nodes(ctx, drv, spec).map(Outcome::Exists),
                other => Err(unexpected(other)),
            }
        };
        match self
            .client
            .run(&ctx, &mut Operation::Exist { label, spec: &mut spec }, &mut terminal)?
        {
            Outcome::Exists(b) => Ok(b),
            other => Err(unexpected_outcome("exist", &other)),
        }
    }

    /// Compute aggregates, grouped by the [`Query::group_by`] fields.
    ///
    /// Result columns are the group fields followed by the aggregate
    /// aliases. Counts are `Int64`, means `Float64`; sums, minimums and
    /// maximums keep the field's kind.
    pub fn aggregate(self, ctx: &Context, aggregates: &[Aggregate]) -> Result<Rows, Error> {
        let schema = E::schema();
        let spec = self.query_spec()?;
        let groups = Self::resolve(&self.group_by)?;
        let mut resolved = Vec::with_capacity(aggregates.len());
        for a in aggregates {
            let mut a = a.clone();
            a.column = match &a.column {
                Some(c) => Some(Self::resolve(std::slice::from_ref(c))?.remove(0)),
                None if a.func == AggregateFunc::Count => None,
                None => return Err(Error::validation(a.alias.as_str(), "aggregate requires a field")),
            };
            resolved.push(a);
        }

        let mut types: Vec<FieldType> = groups
            .iter()
            .map(|c| schema.column_type(c).unwrap_or(FieldType::Other))
            .collect();
        for a in &resolved {
            let field = a.column.as_deref().and_then(|c| schema.column_type(c));
            types.push(match (a.func, field) {
                (AggregateFunc::Count, _) => FieldType::Int64,
                (AggregateFunc::Mean, _) => FieldType::Float64,
                (AggregateFunc::Sum, Some(t)) if t.is_float() => FieldType::Float64,
                (AggregateFunc::Sum, _) => FieldType::Int64,
                (_, Some(t)) => t,
                (_, None) => FieldType::Other,
            });
        }

        let mut rows = graph::aggregate_nodes(&ctx.with_op("Aggregate"), self.client.driver(), &spec, &groups, &resolved)?;
        for row in &mut rows.rows {
            if row.len() != types.len() {
                return Err(Error::ColumnMismatch {
                    columns: types.len(),
                    values: row.len(),
                });
            }
            for (cell, ty) in row.iter_mut().zip(&types) {
                let v = std::mem::replace(cell, Value::Null);
                *cell = v.coerce(*ty)?;
            }
        }
        Ok(rows)
    }
}

pub(crate) fn unexpected(op: &Operation<'_>) -> Error {
    Error::InvalidSpec(format!("unexpected {} operation", op.kind()))
}

pub(crate) fn unexpected_outcome(what: &str, outcome: &Outcome) -> Error {
    Error::InvalidSpec(format!("middleware returned {outcome:?} for {what}"))
}

/// Collects scanned nodes. Leading `prefix` columns, added by eager-load
/// joins, are kept per row in `prefixes`.
pub(crate) struct Collect<E> {
    prefix: Vec<FieldType>,
    pub(crate) nodes: Vec<E>,
    pub(crate) prefixes: Vec<Vec<Value>>,
}

impl<E> Collect<E> {
    pub(crate) fn new(prefix: Vec<FieldType>) -> Self {
        Self {
            prefix,
            nodes: Vec::new(),
            prefixes: Vec::new(),
        }
    }
}

impl<E: Entity> NodeSink for Collect<E> {
    fn scan_values(&self, columns: &[String]) -> Result<Vec<FieldType>, Error> {
        let k = self.prefix.len();
        if columns.len() < k {
            return Err(Error::ColumnMismatch {
                columns: k,
                values: columns.len(),
            });
        }
        let mut types = self.prefix.clone();
        types.extend(E::scan_values(&columns[k..])?);
        Ok(types)
    }

    fn assign(&mut self, columns: &[String], mut values: Vec<Value>) -> Result<(), Error> {
        let k = self.prefix.len();
        let rest = values.split_off(k);
        let mut node = E::default();
        node.assign_values(&columns[k..], rest)?;
        if k > 0 {
            self.prefixes.push(values);
        }
        self.nodes.push(node);
        Ok(())
    }
}

struct Ids {
    ty: FieldType,
    ids: Vec<Value>,
}

impl NodeSink for Ids {
    fn scan_values(&self, columns: &[String]) -> Result<Vec<FieldType>, Error> {
        Ok(vec![self.ty; columns.len()])
    }

    fn assign(&mut self, _columns: &[String], values: Vec<Value>) -> Result<(), Error> {
        if let Some(id) = values.into_iter().next() {
            self.ids.push(id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predicate::{self, desc};
    use crate::testing::{
        fixtures::{Pet, User},
        MockDriver,
    };
    use crate::ClientConfig;
    use nodegraph_sql::Dialect;
    use pretty_assertions::assert_eq;

    fn client(drv: &MockDriver) -> Client {
        Client::new(Arc::new(drv.clone()))
    }

    #[test]
    fn test_all_scans_nodes() {
        let drv = MockDriver::new(Dialect::Sqlite);
        drv.push_rows(vec![
            vec![Value::from(1), Value::from("a"), Value::from(30)],
            vec![Value::from(2), Value::from("b"), Value::Null],
        ]);
        let users = client(&drv)
            .query::<User>()
            .filter(predicate::has_prefix("name", "a"))
            .order(desc("age"))
            .all(&Context::background())
            .unwrap();
        assert_eq!(users.len(), 2);
        assert_eq!(users[0].name, "a");
        assert_eq!(users[1].age, None);
        assert_eq!(
            drv.statements(),
            vec![r#"SELECT "users"."id", "users"."name", "users"."age" FROM "users" WHERE "users"."name" LIKE ? ESCAPE '\' ORDER BY "users"."age" DESC"#]
        );
    }

    #[test]
    fn test_only_semantics() {
        let drv = MockDriver::new(Dialect::Sqlite);
        let ctx = Context::background();
        let c = client(&drv);

        let err = c.query::<User>().only(&ctx).unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "nodegraph: User not found");

        drv.push_rows(vec![
            vec![Value::from(1), Value::from("a"), Value::Null],
            vec![Value::from(2), Value::from("a"), Value::Null],
        ]);
        assert!(c.query::<User>().only(&ctx).unwrap_err().is_not_singular());

        drv.push_rows(vec![vec![Value::from(1), Value::from("a"), Value::Null]]);
        assert_eq!(c.query::<User>().only(&ctx).unwrap().id, 1);
        assert!(drv.statements().iter().all(|s| s.ends_with("LIMIT 2")));
    }

    #[test]
    fn test_invalid_select_field() {
        let drv = MockDriver::new(Dialect::Sqlite);
        let err = client(&drv)
            .query::<User>()
            .select(&["nope"])
            .all(&Context::background())
            .unwrap_err();
        assert!(err.is_validation());
        assert!(drv.statements().is_empty());
    }

    #[test]
    fn test_ids_are_distinct_by_default() {
        let drv = MockDriver::new(Dialect::Sqlite);
        drv.push_rows(vec![vec![Value::from(1)], vec![Value::from(2)]]);
        let ids = client(&drv).query::<User>().ids(&Context::background()).unwrap();
        assert_eq!(ids, vec![Value::from(1), Value::from(2)]);
        assert_eq!(drv.statements(), vec![r#"SELECT DISTINCT "users"."id" FROM "users""#]);
    }

    #[test]
    fn test_unique_by_default_config() {
        let drv = MockDriver::new(Dialect::Sqlite);
        let c = Client::with_config(
            Arc::new(drv.clone()),
            ClientConfig::new().with_unique_by_default(true),
        );
        c.query::<User>().all(&Context::background()).unwrap();
        c.query::<User>().unique(false).all(&Context::background()).unwrap();
        let statements = drv.statements();
        assert!(statements[0].starts_with("SELECT DISTINCT"));
        assert!(!statements[1].contains("DISTINCT"));
    }

    #[test]
    fn test_query_edge_traversal() {
        let drv = MockDriver::new(Dialect::Sqlite);
        let c = client(&drv);
        let friends = c
            .query::<User>()
            .filter(predicate::eq("name", "a"))
            .query_edge::<User>("friends");
        friends.all(&Context::background()).unwrap();
        let sql = &drv.statements()[0];
        assert!(sql.starts_with(r#"SELECT "users"."id", "users"."name", "users"."age" FROM "users" WHERE "users"."id" IN "#));
        assert!(sql.contains(r#"(SELECT "user_friends"."friend_id" FROM "user_friends" WHERE "user_friends"."user_id" IN "#));
        assert!(sql.contains(r#" OR "users"."id" IN (SELECT "user_friends"."user_id" FROM "user_friends""#));
        assert_eq!(drv.args()[0], vec![Value::from("a"), Value::from("a")]);
    }

    #[test]
    fn test_owner_fk_survives_later_select() {
        let drv = MockDriver::new(Dialect::Sqlite);
        let c = client(&drv);
        let before = c
            .query::<Pet>()
            .with_edge("owner", |p: &mut Pet, o: User| p.owner = Some(Box::new(o)), |q| q)
            .select(&["name"]);
        let after = c
            .query::<Pet>()
            .select(&["name"])
            .with_edge("owner", |p: &mut Pet, o: User| p.owner = Some(Box::new(o)), |q| q);
        let columns = before.query_spec().unwrap().node.columns;
        assert!(columns.iter().any(|c| c == "name"));
        assert!(columns.iter().any(|c| c == "owner_id"));
        assert_eq!(columns, after.query_spec().unwrap().node.columns);

        // Counting ignores columns needed only by eager loads.
        drv.push_rows(vec![vec![Value::from(0)]]);
        before.count(&Context::background()).unwrap();
        assert!(!drv.statements()[0].contains("owner_id"));
    }

    #[test]
    fn test_unknown_edge() {
        let drv = MockDriver::new(Dialect::Sqlite);
        let err = client(&drv)
            .query::<User>()
            .query_edge::<User>("enemies")
            .all(&Context::background())
            .unwrap_err();
        assert!(matches!(err, Error::InvalidSpec(_)));
    }

    #[test]
    fn test_count_and_exist() {
        let drv = MockDriver::new(Dialect::Sqlite);
        drv.push_rows(vec![vec![Value::from(4)]]);
        drv.push_rows(vec![vec![Value::from(1)]]);
        let c = client(&drv);
        let ctx = Context::background();
        assert_eq!(c.query::<User>().count(&ctx).unwrap(), 4);
        assert!(c.query::<User>().exist(&ctx).unwrap());
        assert!(!c.query::<User>().exist(&ctx).unwrap());
        assert_eq!(
            drv.statements(),
            vec![
                r#"SELECT COUNT(*) FROM "users""#,
                r#"SELECT 1 FROM "users" LIMIT 1"#,
                r#"SELECT 1 FROM "users" LIMIT 1"#,
            ]
        );
    }

    #[test]
    fn test_aggregate_coerces_results() {
        let drv = MockDriver::new(Dialect::Sqlite);
        drv.push_rows(vec![vec![Value::from("a"), Value::from("2"), Value::from(31)]]);
        let rows = client(&drv)
            .query::<User>()
            .group_by(&["name"])
            .aggregate(&Context::background(), &[Aggregate::count(), Aggregate::mean("age")])
            .unwrap();
        assert_eq!(rows.columns, vec!["name", "count", "mean"]);
        assert_eq!(
            rows.rows,
            vec![vec![Value::from("a"), Value::from(2), Value::Float64(31.0)]]
        );
    }
}
