//! The contract between typed node structs and the executor.

use nodegraph_sql::{FieldType, Value};

use crate::error::Error;
use crate::schema::NodeSchema;

/// A node type.
///
/// Implementations are plain structs holding one field per column plus a
/// [`Loaded`] vector and slots for eager-loaded neighbors. The schema is
/// usually kept in a `OnceLock` static.
pub trait Entity: Clone + Default + Send + Sync + 'static {
    fn schema() -> &'static NodeSchema;

    /// Storage kinds for the given columns. The default resolves them
    /// through the schema and rejects unknown columns.
    fn scan_values(columns: &[String]) -> Result<Vec<FieldType>, Error> {
        let schema = Self::schema();
        columns
            .iter()
            .map(|c| {
                schema
                    .column_type(c)
                    .ok_or_else(|| Error::validation(c.as_str(), format!("unexpected column for {}", schema.label())))
            })
            .collect()
    }

    /// Copy scanned values into the struct. `values` line up with
    /// `columns` and are already coerced to the schema types.
    fn assign_values(&mut self, columns: &[String], values: Vec<Value>) -> Result<(), Error>;

    fn id(&self) -> Value;

    /// Current value of a column, including foreign keys the node holds.
    fn value(&self, column: &str) -> Option<Value>;

    /// Record that the edge with this ordinal was eager-loaded.
    fn mark_loaded(&mut self, ordinal: usize);
}

/// Which edges of a node have been eager-loaded.
///
/// A loaded edge with no neighbors reads as empty; an edge that was never
/// loaded reads as [`Error::NotLoaded`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Loaded<const N: usize>([bool; N]);

impl<const N: usize> Default for Loaded<N> {
    fn default() -> Self {
        Self([false; N])
    }
}

impl<const N: usize> Loaded<N> {
    pub fn mark(&mut self, ordinal: usize) {
        if let Some(slot) = self.0.get_mut(ordinal) {
            *slot = true;
        }
    }

    pub fn is_loaded(&self, ordinal: usize) -> bool {
        self.0.get(ordinal).copied().unwrap_or(false)
    }

    /// Return `value` if edge `ordinal` was loaded.
    pub fn edge<'a, T>(&self, ordinal: usize, name: &str, value: &'a T) -> Result<&'a T, Error> {
        if self.is_loaded(ordinal) {
            Ok(value)
        } else {
            Err(Error::NotLoaded {
                edge: name.to_string(),
            })
        }
    }
}

/// Fail unless `columns` and `values` have the same width.
pub fn check_columns(columns: &[String], values: &[Value]) -> Result<(), Error> {
    if columns.len() != values.len() {
        return Err(Error::ColumnMismatch {
            columns: columns.len(),
            values: values.len(),
        });
    }
    Ok(())
}
