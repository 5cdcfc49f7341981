//! Field descriptors and their builders.
//!
//! A descriptor is built once and frozen; validators and default functions
//! are shared behind `Arc` so frozen descriptors can be read from any thread
//! without locking.

use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use chrono::Utc;
use nodegraph_sql::{Dialect, FieldType, FromValue, Value};

use crate::error::Error;

/// A validator over a field value. Returns a human readable cause on failure.
pub type Validator = Arc<dyn Fn(&Value) -> Result<(), String> + Send + Sync>;

/// A default value, fixed or computed at insert/update time.
#[derive(Clone)]
pub enum FieldDefault {
    Value(Value),
    Func(Arc<dyn Fn() -> Value + Send + Sync>),
}

impl FieldDefault {
    pub fn get(&self) -> Value {
        match self {
            FieldDefault::Value(v) => v.clone(),
            FieldDefault::Func(f) => f(),
        }
    }
}

impl fmt::Debug for FieldDefault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldDefault::Value(v) => f.debug_tuple("Value").field(v).finish(),
            FieldDefault::Func(_) => f.write_str("Func(..)"),
        }
    }
}

/// Frozen metadata of one node column.
#[derive(Clone)]
pub struct FieldDescriptor {
    name: String,
    field_type: FieldType,
    storage_key: Option<String>,
    unique: bool,
    optional: bool,
    nillable: bool,
    immutable: bool,
    default: Option<FieldDefault>,
    update_default: Option<FieldDefault>,
    enum_values: Vec<String>,
    schema_type: HashMap<Dialect, String>,
    comment: Option<String>,
    validators: Vec<Validator>,
}

impl FieldDescriptor {
    fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            storage_key: None,
            unique: false,
            optional: false,
            nillable: false,
            immutable: false,
            default: None,
            update_default: None,
            enum_values: Vec::new(),
            schema_type: HashMap::new(),
            comment: None,
            validators: Vec::new(),
        }
    }

    /// Field name as used by builders and predicates.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Column name; the storage key if one was set.
    pub fn column(&self) -> &str {
        self.storage_key.as_deref().unwrap_or(&self.name)
    }

    pub fn field_type(&self) -> FieldType {
        self.field_type
    }

    pub fn is_unique(&self) -> bool {
        self.unique
    }

    pub fn is_optional(&self) -> bool {
        self.optional
    }

    pub fn is_nillable(&self) -> bool {
        self.nillable
    }

    /// Whether the column accepts NULL.
    pub fn is_nullable(&self) -> bool {
        self.optional || self.nillable
    }

    pub fn is_immutable(&self) -> bool {
        self.immutable
    }

    /// Whether a create must set this field.
    pub fn is_required(&self) -> bool {
        !self.optional && self.default.is_none()
    }

    pub fn default_value(&self) -> Option<Value> {
        self.default.as_ref().map(FieldDefault::get)
    }

    pub fn update_default_value(&self) -> Option<Value> {
        self.update_default.as_ref().map(FieldDefault::get)
    }

    pub fn enum_values(&self) -> &[String] {
        &self.enum_values
    }

    /// Raw DDL type override for `dialect`.
    pub fn schema_type(&self, dialect: Dialect) -> Option<&str> {
        self.schema_type.get(&dialect).map(String::as_str)
    }

    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    /// Run the validator chain. NULL is never passed to validators.
    pub fn validate(&self, value: &Value) -> Result<(), Error> {
        if value.is_null() {
            if self.is_nullable() {
                return Ok(());
            }
            return Err(Error::validation(&self.name, "field is not nullable"));
        }
        for validator in &self.validators {
            validator(value).map_err(|cause| Error::validation(&self.name, cause))?;
        }
        Ok(())
    }
}

impl fmt::Debug for FieldDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDescriptor")
            .field("name", &self.name)
            .field("field_type", &self.field_type)
            .field("storage_key", &self.storage_key)
            .field("unique", &self.unique)
            .field("optional", &self.optional)
            .field("nillable", &self.nillable)
            .field("immutable", &self.immutable)
            .field("default", &self.default)
            .field("validators", &self.validators.len())
            .finish()
    }
}

// Setters shared by every builder.
macro_rules! common_setters {
    () => {
        /// Add a unique constraint.
        pub fn unique(mut self) -> Self {
            self.desc.unique = true;
            self
        }

        /// The field may be omitted on create; the column is nullable.
        pub fn optional(mut self) -> Self {
            self.desc.optional = true;
            self
        }

        /// The field may hold NULL.
        pub fn nillable(mut self) -> Self {
            self.desc.nillable = true;
            self
        }

        /// The field may only be set on create.
        pub fn immutable(mut self) -> Self {
            self.desc.immutable = true;
            self
        }

        pub fn comment(mut self, comment: impl Into<String>) -> Self {
            self.desc.comment = Some(comment.into());
            self
        }

        /// Store the field under a different column name.
        pub fn storage_key(mut self, key: impl Into<String>) -> Self {
            self.desc.storage_key = Some(key.into());
            self
        }

        /// Override the DDL type per dialect.
        pub fn schema_type<S: Into<String>>(
            mut self,
            types: impl IntoIterator<Item = (Dialect, S)>,
        ) -> Self {
            self.desc
                .schema_type
                .extend(types.into_iter().map(|(d, t)| (d, t.into())));
            self
        }

        /// Compute the default at insert time.
        pub fn default_fn(mut self, f: impl Fn() -> Value + Send + Sync + 'static) -> Self {
            self.desc.default = Some(FieldDefault::Func(Arc::new(f)));
            self
        }

        /// Compute a value on every update that does not set the field.
        pub fn update_default_fn(mut self, f: impl Fn() -> Value + Send + Sync + 'static) -> Self {
            self.desc.update_default = Some(FieldDefault::Func(Arc::new(f)));
            self
        }

        /// Freeze the descriptor.
        pub fn build(self) -> FieldDescriptor {
            self.desc
        }
    };
}

/// Numeric kinds accepted by [`NumericBuilder`].
pub trait Numeric:
    Copy + PartialOrd + fmt::Display + Into<Value> + FromValue + Send + Sync + 'static
{
    const ZERO: Self;
}

/// Numeric kinds that can be negative.
pub trait Signed: Numeric {}

macro_rules! numeric {
    ($zero:expr => $($t:ty),*) => {
        $(impl Numeric for $t {
            const ZERO: Self = $zero;
        })*
    };
}

numeric!(0 => i8, i16, i32, i64, u8, u16, u32, u64);
numeric!(0.0 => f32, f64);

impl Signed for i8 {}
impl Signed for i16 {}
impl Signed for i32 {}
impl Signed for i64 {}
impl Signed for f32 {}
impl Signed for f64 {}

/// Builder for every numeric field kind.
pub struct NumericBuilder<T> {
    desc: FieldDescriptor,
    _kind: PhantomData<T>,
}

impl<T: Numeric> NumericBuilder<T> {
    fn new(name: &str, field_type: FieldType) -> Self {
        Self {
            desc: FieldDescriptor::new(name, field_type),
            _kind: PhantomData,
        }
    }

    common_setters!();

    pub fn default(mut self, value: T) -> Self {
        self.desc.default = Some(FieldDefault::Value(value.into()));
        self
    }

    /// Add a validator over the typed value.
    pub fn validate(mut self, f: impl Fn(T) -> Result<(), String> + Send + Sync + 'static) -> Self {
        self.desc.validators.push(Arc::new(move |v: &Value| {
            let n = T::from_value(v.clone()).map_err(|e| e.to_string())?;
            f(n)
        }));
        self
    }

    /// Accept values in `[lo, hi]`.
    pub fn range(self, lo: T, hi: T) -> Self {
        self.validate(move |v| {
            if v < lo || v > hi {
                Err(format!("value {v} out of range [{lo}, {hi}]"))
            } else {
                Ok(())
            }
        })
    }

    pub fn min(self, lo: T) -> Self {
        self.validate(move |v| {
            if v < lo {
                Err(format!("value {v} is less than the required min {lo}"))
            } else {
                Ok(())
            }
        })
    }

    pub fn max(self, hi: T) -> Self {
        self.validate(move |v| {
            if v > hi {
                Err(format!("value {v} is greater than the required max {hi}"))
            } else {
                Ok(())
            }
        })
    }

    pub fn positive(self) -> Self {
        self.validate(|v| {
            if v > T::ZERO {
                Ok(())
            } else {
                Err(format!("value {v} is not positive"))
            }
        })
    }
}

impl<T: Signed> NumericBuilder<T> {
    pub fn negative(self) -> Self {
        self.validate(|v| {
            if v < T::ZERO {
                Ok(())
            } else {
                Err(format!("value {v} is not negative"))
            }
        })
    }

    pub fn non_negative(self) -> Self {
        self.validate(|v| {
            if v >= T::ZERO {
                Ok(())
            } else {
                Err(format!("value {v} is negative"))
            }
        })
    }
}

/// Builder for the non-numeric field kinds.
pub struct FieldBuilder {
    desc: FieldDescriptor,
}

impl FieldBuilder {
    fn new(name: &str, field_type: FieldType) -> Self {
        Self {
            desc: FieldDescriptor::new(name, field_type),
        }
    }

    common_setters!();

    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.desc.default = Some(FieldDefault::Value(value.into()));
        self
    }

    /// Default time fields to the current time.
    pub fn default_now(self) -> Self {
        self.default_fn(|| Value::Time(Utc::now()))
    }

    /// Refresh time fields to the current time on update.
    pub fn update_default_now(self) -> Self {
        self.update_default_fn(|| Value::Time(Utc::now()))
    }

    /// Add a validator over the raw value.
    pub fn validate(mut self, f: impl Fn(&Value) -> Result<(), String> + Send + Sync + 'static) -> Self {
        self.desc.validators.push(Arc::new(f));
        self
    }

    /// Minimum length in characters (strings) or bytes.
    pub fn min_len(self, n: usize) -> Self {
        self.validate(move |v| match length(v) {
            Some(len) if len < n => Err(format!("value is less than the required length {n}")),
            _ => Ok(()),
        })
    }

    /// Maximum length in characters (strings) or bytes.
    pub fn max_len(self, n: usize) -> Self {
        self.validate(move |v| match length(v) {
            Some(len) if len > n => Err(format!("value is greater than the required length {n}")),
            _ => Ok(()),
        })
    }

    pub fn not_empty(self) -> Self {
        self.min_len(1)
    }

    /// Allowed values of an enum field.
    pub fn values<S: Into<String>>(mut self, values: impl IntoIterator<Item = S>) -> Self {
        self.desc.enum_values = values.into_iter().map(Into::into).collect();
        let allowed = self.desc.enum_values.clone();
        self.validate(move |v| match v.as_str() {
            Some(s) if allowed.iter().any(|a| a == s) => Ok(()),
            _ => Err(format!("invalid enum value {v}")),
        })
    }
}

fn length(v: &Value) -> Option<usize> {
    match v {
        Value::String(s) => Some(s.chars().count()),
        Value::Bytes(b) => Some(b.len()),
        _ => None,
    }
}

macro_rules! numeric_ctor {
    ($($fn:ident => $t:ty, $ft:expr;)*) => {
        $(
            #[doc = concat!("A `", stringify!($t), "` field.")]
            pub fn $fn(name: &str) -> NumericBuilder<$t> {
                NumericBuilder::new(name, $ft)
            }
        )*
    };
}

numeric_ctor! {
    int => i64, FieldType::Int;
    int8 => i8, FieldType::Int8;
    int16 => i16, FieldType::Int16;
    int32 => i32, FieldType::Int32;
    int64 => i64, FieldType::Int64;
    uint => u64, FieldType::Uint;
    uint8 => u8, FieldType::Uint8;
    uint16 => u16, FieldType::Uint16;
    uint32 => u32, FieldType::Uint32;
    uint64 => u64, FieldType::Uint64;
    float => f64, FieldType::Float64;
    float32 => f32, FieldType::Float32;
}

pub fn boolean(name: &str) -> FieldBuilder {
    FieldBuilder::new(name, FieldType::Bool)
}

pub fn string(name: &str) -> FieldBuilder {
    FieldBuilder::new(name, FieldType::String)
}

/// A string field stored as unbounded text.
pub fn text(name: &str) -> FieldBuilder {
    FieldBuilder::new(name, FieldType::String).schema_type([
        (Dialect::MySql, "longtext"),
        (Dialect::Postgres, "text"),
        (Dialect::Sqlite, "text"),
    ])
}

pub fn bytes(name: &str) -> FieldBuilder {
    FieldBuilder::new(name, FieldType::Bytes)
}

pub fn time(name: &str) -> FieldBuilder {
    FieldBuilder::new(name, FieldType::Time)
}

pub fn json(name: &str) -> FieldBuilder {
    FieldBuilder::new(name, FieldType::Json)
}

/// An enum field; declare its members with [`FieldBuilder::values`].
pub fn enumeration(name: &str) -> FieldBuilder {
    FieldBuilder::new(name, FieldType::Enum)
}

pub fn uuid(name: &str) -> FieldBuilder {
    FieldBuilder::new(name, FieldType::Uuid)
}

/// A field of a custom type; give it a schema type per dialect.
pub fn other(name: &str) -> FieldBuilder {
    FieldBuilder::new(name, FieldType::Other)
}
