//! Node and edge schemas.

use nodegraph_sql::{FieldType, Value};

use crate::error::Error;
use crate::graph::spec::{EdgeSpec, EdgeTarget, FieldSpec, NodeSpec, Rel};
use crate::graph::step::{self, Step, StepEdge, StepFrom, StepSource, StepTo};
use crate::predicate::Predicate;
use crate::schema::field::{self, FieldDescriptor};

/// Declaration of an edge, resolved into an [`EdgeSchema`] when the owning
/// node schema is built.
#[derive(Debug, Clone)]
pub struct EdgeBuilder {
    name: String,
    rel: Rel,
    inverse: bool,
    bidi: bool,
    table: Option<String>,
    columns: Vec<String>,
    target_table: String,
    target_id: String,
    target_id_type: FieldType,
}

impl EdgeBuilder {
    fn new(name: &str, rel: Rel, target_table: &str, table: Option<&str>, columns: Vec<String>) -> Self {
        Self {
            name: name.to_string(),
            rel,
            inverse: false,
            bidi: false,
            table: table.map(str::to_string),
            columns,
            target_table: target_table.to_string(),
            target_id: "id".to_string(),
            target_id_type: FieldType::Int,
        }
    }

    /// Mark a many-to-many edge as the inverse side of its join table.
    pub fn inverse(mut self) -> Self {
        self.inverse = true;
        self
    }

    /// A self-referential edge whose pairs are undirected.
    pub fn bidi(mut self) -> Self {
        self.bidi = true;
        self
    }

    /// Id column and type of the target node; defaults to `id` / int.
    pub fn target_id(mut self, column: &str, field_type: FieldType) -> Self {
        self.target_id = column.to_string();
        self.target_id_type = field_type;
        self
    }
}

/// One-to-many: the target table holds `fk` pointing back at this node.
pub fn o2m(name: &str, target_table: &str, fk: &str) -> EdgeBuilder {
    EdgeBuilder::new(name, Rel::O2M, target_table, Some(target_table), vec![fk.to_string()])
}

/// Many-to-one: this node's table holds `fk` pointing at the target.
pub fn m2o(name: &str, target_table: &str, fk: &str) -> EdgeBuilder {
    let mut e = EdgeBuilder::new(name, Rel::M2O, target_table, None, vec![fk.to_string()]);
    e.inverse = true;
    e
}

/// One-to-one owned by this node: the target table holds `fk`.
pub fn o2o(name: &str, target_table: &str, fk: &str) -> EdgeBuilder {
    EdgeBuilder::new(name, Rel::O2O, target_table, Some(target_table), vec![fk.to_string()])
}

/// One-to-one back-reference: this node's table holds `fk`.
pub fn o2o_inverse(name: &str, target_table: &str, fk: &str) -> EdgeBuilder {
    let mut e = EdgeBuilder::new(name, Rel::O2O, target_table, None, vec![fk.to_string()]);
    e.inverse = true;
    e
}

/// Many-to-many through `join_table`. `columns` are `(owner, target)` for the
/// forward edge; the inverse edge declares the same pair and calls
/// [`EdgeBuilder::inverse`].
pub fn m2m(name: &str, target_table: &str, join_table: &str, columns: (&str, &str)) -> EdgeBuilder {
    EdgeBuilder::new(
        name,
        Rel::M2M,
        target_table,
        Some(join_table),
        vec![columns.0.to_string(), columns.1.to_string()],
    )
}

/// A resolved edge of a node schema.
#[derive(Debug, Clone)]
pub struct EdgeSchema {
    name: String,
    ordinal: usize,
    rel: Rel,
    inverse: bool,
    bidi: bool,
    table: String,
    columns: Vec<String>,
    owner_table: String,
    owner_id: String,
    target_table: String,
    target_id: String,
    target_id_type: FieldType,
}

impl EdgeSchema {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Position in the declaring schema; indexes the loaded-edges vector.
    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    pub fn rel(&self) -> Rel {
        self.rel
    }

    pub fn is_inverse(&self) -> bool {
        self.inverse
    }

    pub fn is_bidi(&self) -> bool {
        self.bidi
    }

    /// The table holding the edge: the FK table, or the join table.
    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn target_table(&self) -> &str {
        &self.target_table
    }

    pub fn target_id(&self) -> &str {
        &self.target_id
    }

    /// The edge points at a single node.
    pub fn is_unique(&self) -> bool {
        matches!(self.rel, Rel::O2O | Rel::M2O)
    }

    pub fn is_m2m(&self) -> bool {
        self.rel == Rel::M2M
    }

    /// The foreign key lives on the owner's table.
    pub fn owns_fk(&self) -> bool {
        self.edge().owns_fk()
    }

    /// The foreign key column (first edge column).
    pub fn fk_column(&self) -> &str {
        &self.columns[0]
    }

    /// Join-table columns as `(owner side, target side)`.
    pub fn join_columns(&self) -> (&str, &str) {
        if self.inverse {
            (&self.columns[1], &self.columns[0])
        } else {
            (&self.columns[0], &self.columns[1])
        }
    }

    fn edge(&self) -> StepEdge {
        StepEdge {
            rel: self.rel,
            inverse: self.inverse,
            bidi: self.bidi,
            table: self.table.clone(),
            columns: self.columns.clone(),
        }
    }

    /// A traversal step from the owner node along this edge.
    pub fn step(&self, source: StepSource) -> Step {
        Step::new(
            StepFrom {
                table: self.owner_table.clone(),
                column: self.owner_id.clone(),
                source: Some(source),
            },
            StepTo {
                table: self.target_table.clone(),
                column: self.target_id.clone(),
            },
            self.edge(),
        )
    }

    fn filter_step(&self) -> Step {
        let mut s = self.step(StepSource::Id(Value::Null));
        s.from.source = None;
        s
    }

    /// Predicate: the node has at least one neighbor along this edge.
    pub fn has(&self) -> Predicate {
        let step = self.filter_step();
        Predicate::new(move |s| step::has_neighbors(s, &step))
    }

    /// Predicate: the node has a neighbor matching all of `preds`.
    pub fn has_with(&self, preds: Vec<Predicate>) -> Predicate {
        let step = self.filter_step();
        let pred = Predicate::and(preds);
        Predicate::new(move |s| step::has_neighbors_with(s, &step, &pred))
    }

    /// Mutation spec linking the owner with `nodes`.
    pub fn spec(&self, nodes: Vec<Value>) -> EdgeSpec {
        EdgeSpec {
            rel: self.rel,
            inverse: self.inverse,
            bidi: self.bidi,
            table: self.table.clone(),
            columns: self.columns.clone(),
            target: EdgeTarget {
                id: FieldSpec::new(&self.target_id, self.target_id_type),
                nodes,
            },
        }
    }
}

/// Everything the executor needs to know about one node type.
#[derive(Debug, Clone)]
pub struct NodeSchema {
    label: String,
    table: String,
    id: FieldDescriptor,
    fields: Vec<FieldDescriptor>,
    foreign_keys: Vec<(String, FieldType)>,
    edges: Vec<EdgeSchema>,
    columns: Vec<String>,
}

impl NodeSchema {
    pub fn builder(label: &str, table: &str) -> NodeSchemaBuilder {
        NodeSchemaBuilder {
            label: label.to_string(),
            table: table.to_string(),
            id: None,
            fields: Vec::new(),
            edges: Vec::new(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn id(&self) -> &FieldDescriptor {
        &self.id
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// Look up a field by name or column.
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields
            .iter()
            .find(|f| f.name() == name || f.column() == name)
    }

    /// Foreign-key columns this table holds for its edges.
    pub fn foreign_keys(&self) -> &[(String, FieldType)] {
        &self.foreign_keys
    }

    pub fn edges(&self) -> &[EdgeSchema] {
        &self.edges
    }

    pub fn edge(&self, name: &str) -> Result<&EdgeSchema, Error> {
        self.edges
            .iter()
            .find(|e| e.name == name)
            .ok_or_else(|| Error::InvalidSpec(format!("{} has no edge {name:?}", self.label)))
    }

    /// All columns: id, fields, then foreign keys.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn valid_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    /// Resolve a field name or column into its column name.
    pub fn column_of(&self, name: &str) -> Option<&str> {
        if name == self.id.name() || name == self.id.column() {
            return Some(self.id.column());
        }
        if let Some(f) = self.field(name) {
            return Some(f.column());
        }
        self.foreign_keys
            .iter()
            .find(|(c, _)| c == name)
            .map(|(c, _)| c.as_str())
    }

    pub fn column_type(&self, column: &str) -> Option<FieldType> {
        if column == self.id.column() {
            return Some(self.id.field_type());
        }
        if let Some(f) = self.fields.iter().find(|f| f.column() == column) {
            return Some(f.field_type());
        }
        self.foreign_keys
            .iter()
            .find(|(c, _)| c == column)
            .map(|(_, t)| *t)
    }

    /// The id column as a field spec.
    pub fn id_spec(&self) -> FieldSpec {
        FieldSpec::new(self.id.column(), self.id.field_type())
    }

    /// A read projection over `columns`.
    pub fn node_spec(&self, columns: Vec<String>) -> NodeSpec {
        NodeSpec {
            table: self.table.clone(),
            columns,
            id: self.id_spec(),
        }
    }
}

/// Builder for [`NodeSchema`].
pub struct NodeSchemaBuilder {
    label: String,
    table: String,
    id: Option<FieldDescriptor>,
    fields: Vec<FieldDescriptor>,
    edges: Vec<EdgeBuilder>,
}

impl NodeSchemaBuilder {
    /// Override the id field; defaults to an int field named `id`.
    pub fn id(mut self, id: FieldDescriptor) -> Self {
        self.id = Some(id);
        self
    }

    pub fn field(mut self, field: FieldDescriptor) -> Self {
        self.fields.push(field);
        self
    }

    pub fn edge(mut self, edge: EdgeBuilder) -> Self {
        self.edges.push(edge);
        self
    }

    /// Resolve edges, register foreign keys and freeze the schema.
    pub fn build(self) -> Result<NodeSchema, Error> {
        let id = self.id.unwrap_or_else(|| field::int("id").build());
        let mut columns = vec![id.column().to_string()];
        for f in &self.fields {
            if columns.iter().any(|c| c == f.column()) {
                return Err(Error::InvalidSpec(format!(
                    "{}: duplicate column {:?}",
                    self.label,
                    f.column()
                )));
            }
            columns.push(f.column().to_string());
        }

        let mut foreign_keys = Vec::new();
        let mut edges = Vec::with_capacity(self.edges.len());
        for (ordinal, e) in self.edges.into_iter().enumerate() {
            let expected = if e.rel == Rel::M2M { 2 } else { 1 };
            if e.columns.len() != expected {
                return Err(Error::InvalidSpec(format!(
                    "{}: edge {:?} needs {expected} column(s)",
                    self.label, e.name
                )));
            }
            if edges.iter().any(|x: &EdgeSchema| x.name == e.name) {
                return Err(Error::InvalidSpec(format!(
                    "{}: duplicate edge {:?}",
                    self.label, e.name
                )));
            }
            if e.bidi && (e.rel != Rel::M2M || e.target_table != self.table) {
                return Err(Error::InvalidSpec(format!(
                    "{}: bidirectional edge {:?} must be a self-referencing many-to-many",
                    self.label, e.name
                )));
            }
            let table = e.table.unwrap_or_else(|| self.table.clone());
            let edge = EdgeSchema {
                name: e.name,
                ordinal,
                rel: e.rel,
                inverse: e.inverse,
                bidi: e.bidi,
                table,
                columns: e.columns,
                owner_table: self.table.clone(),
                owner_id: id.column().to_string(),
                target_table: e.target_table,
                target_id: e.target_id,
                target_id_type: e.target_id_type,
            };
            if edge.owns_fk() {
                let fk = edge.fk_column().to_string();
                if !columns.contains(&fk) {
                    columns.push(fk.clone());
                    foreign_keys.push((fk, edge.target_id_type));
                }
            }
            edges.push(edge);
        }

        Ok(NodeSchema {
            label: self.label,
            table: self.table,
            id,
            fields: self.fields,
            foreign_keys,
            edges,
            columns,
        })
    }
}
