//! Immutable node, field and edge descriptors.

pub mod field;
pub mod node;

pub use field::{FieldBuilder, FieldDefault, FieldDescriptor, Numeric, NumericBuilder, Signed, Validator};
pub use node::{m2m, m2o, o2m, o2o, o2o_inverse, EdgeBuilder, EdgeSchema, NodeSchema, NodeSchemaBuilder};
