//! Declarative descriptions of reads and writes handed to the executor.

use nodegraph_sql::{Column, FieldType, Selector, Value};
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::predicate::{Modifier, Order, Predicate};

/// Edge cardinality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rel {
    O2O,
    O2M,
    M2O,
    M2M,
}

impl Rel {
    pub fn name(&self) -> &'static str {
        match self {
            Rel::O2O => "O2O",
            Rel::O2M => "O2M",
            Rel::M2O => "M2O",
            Rel::M2M => "M2M",
        }
    }
}

/// A column with its type and, in mutations, its value.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub column: String,
    pub field_type: FieldType,
    pub value: Option<Value>,
}

impl FieldSpec {
    pub fn new(column: &str, field_type: FieldType) -> Self {
        Self {
            column: column.to_string(),
            field_type,
            value: None,
        }
    }

    pub fn with_value(mut self, value: impl Into<Value>) -> Self {
        self.value = Some(value.into());
        self
    }
}

/// The table and columns read for one node type.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeSpec {
    pub table: String,
    pub columns: Vec<String>,
    pub id: FieldSpec,
}

impl NodeSpec {
    /// Columns to project: the requested ones, with the id first when it was
    /// not requested explicitly.
    pub fn projection(&self) -> Vec<String> {
        if self.columns.iter().any(|c| *c == self.id.column) {
            return self.columns.clone();
        }
        let mut columns = Vec::with_capacity(self.columns.len() + 1);
        columns.push(self.id.column.clone());
        columns.extend(self.columns.iter().cloned());
        columns
    }

    pub(crate) fn qualified(&self, s: &Selector) -> Vec<Column> {
        self.projection().iter().map(|c| s.c(c)).collect()
    }
}

/// The far end of an edge mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeTarget {
    pub id: FieldSpec,
    pub nodes: Vec<Value>,
}

/// An edge as seen by mutations.
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeSpec {
    pub rel: Rel,
    pub inverse: bool,
    pub bidi: bool,
    /// The FK table, or the join table.
    pub table: String,
    pub columns: Vec<String>,
    pub target: EdgeTarget,
}

impl EdgeSpec {
    /// The foreign key lives on the table of the node being mutated.
    pub fn owns_fk(&self) -> bool {
        self.rel == Rel::M2O || (self.rel == Rel::O2O && self.inverse)
    }

    /// The foreign key lives on the target table.
    pub fn fk_on_target(&self) -> bool {
        self.rel == Rel::O2M || (self.rel == Rel::O2O && !self.inverse)
    }

    /// Join-table columns as `(owner side, target side)`.
    pub fn join_columns(&self) -> (&str, &str) {
        if self.inverse {
            (&self.columns[1], &self.columns[0])
        } else {
            (&self.columns[0], &self.columns[1])
        }
    }
}

/// Everything needed to run a read.
#[derive(Clone)]
pub struct QuerySpec {
    pub node: NodeSpec,
    /// Start from this selector instead of the node table, as produced by
    /// edge traversal.
    pub from: Option<Selector>,
    pub predicate: Option<Predicate>,
    pub order: Vec<Order>,
    pub modifiers: Vec<Modifier>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub unique: bool,
}

impl QuerySpec {
    pub fn new(node: NodeSpec) -> Self {
        Self {
            node,
            from: None,
            predicate: None,
            order: Vec::new(),
            modifiers: Vec::new(),
            limit: None,
            offset: None,
            unique: false,
        }
    }
}

/// One pending assignment of an update.
#[derive(Debug, Clone, PartialEq)]
pub enum Assignment {
    Set(Value),
    /// Numeric increment; applied as `COALESCE(col, 0) + delta`.
    Add(Value),
    Clear,
}

/// Edge changes of one edge within an update.
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeMutations {
    pub clear: bool,
    pub add: Vec<Value>,
    pub remove: Vec<Value>,
}

/// Everything needed to run an update.
#[derive(Clone)]
pub struct UpdateSpec {
    pub node: NodeSpec,
    pub predicate: Option<Predicate>,
    /// Field assignments in first-touched order.
    pub fields: Vec<(FieldSpec, Assignment)>,
    /// Edge mutations; `target.nodes` of the edge spec is unused here.
    pub edges: Vec<(EdgeSpec, EdgeMutations)>,
}

impl UpdateSpec {
    pub fn new(node: NodeSpec) -> Self {
        Self {
            node,
            predicate: None,
            fields: Vec::new(),
            edges: Vec::new(),
        }
    }

    fn slot(&mut self, field: &FieldSpec) -> Option<&mut Assignment> {
        self.fields
            .iter_mut()
            .find(|(f, _)| f.column == field.column)
            .map(|(_, a)| a)
    }

    fn put(&mut self, field: FieldSpec, assignment: Assignment) {
        match self.slot(&field) {
            Some(a) => *a = assignment,
            None => self.fields.push((field, assignment)),
        }
    }

    /// Set a column, replacing any earlier assignment of it.
    pub fn set_field(&mut self, field: FieldSpec, value: Value) {
        self.put(field, Assignment::Set(value));
    }

    /// Add to a numeric column, merging with an earlier assignment.
    pub fn add_field(&mut self, field: FieldSpec, delta: Value) -> Result<(), Error> {
        let column = field.column.clone();
        let overflow = || Error::validation(&column, "numeric overflow");
        let next = match self.slot(&field) {
            None => Assignment::Add(delta),
            Some(Assignment::Add(x)) => Assignment::Add(x.checked_add(&delta).ok_or_else(overflow)?),
            Some(Assignment::Set(v)) => Assignment::Set(v.checked_add(&delta).ok_or_else(overflow)?),
            Some(Assignment::Clear) => Assignment::Set(delta),
        };
        self.put(field, next);
        Ok(())
    }

    /// Set a column to NULL, replacing any earlier assignment of it.
    pub fn clear_field(&mut self, field: FieldSpec) {
        self.put(field, Assignment::Clear);
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.edges.is_empty()
    }

    /// Mutations of the edge stored in `table`/`columns`, created on first use.
    pub fn edge_mut(&mut self, edge: EdgeSpec) -> &mut EdgeMutations {
        let pos = self
            .edges
            .iter()
            .position(|(e, _)| e.table == edge.table && e.columns == edge.columns && e.inverse == edge.inverse);
        let pos = match pos {
            Some(pos) => pos,
            None => {
                self.edges.push((
                    edge,
                    EdgeMutations {
                        clear: false,
                        add: Vec::new(),
                        remove: Vec::new(),
                    },
                ));
                self.edges.len() - 1
            }
        };
        &mut self.edges[pos].1
    }
}

/// Everything needed to insert one node.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateSpec {
    pub table: String,
    /// The id column; a present value is inserted explicitly.
    pub id: FieldSpec,
    pub fields: Vec<FieldSpec>,
    /// Edges to link, with target ids in `target.nodes`.
    pub edges: Vec<EdgeSpec>,
}

impl CreateSpec {
    pub fn new(table: &str, id: FieldSpec) -> Self {
        Self {
            table: table.to_string(),
            id,
            fields: Vec::new(),
            edges: Vec::new(),
        }
    }
}

/// Everything needed to run a delete.
#[derive(Clone)]
pub struct DeleteSpec {
    pub node: NodeSpec,
    pub predicate: Option<Predicate>,
}

impl DeleteSpec {
    pub fn new(node: NodeSpec) -> Self {
        Self {
            node,
            predicate: None,
        }
    }
}
