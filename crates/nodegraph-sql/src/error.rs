//! Value conversion errors.

use thiserror::Error;

use crate::types::FieldType;

/// Errors raised while converting between runtime values and host types.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValueError {
    /// The value kind cannot represent the requested type.
    #[error("cannot convert {from} value to {to}")]
    Conversion {
        /// Kind of the source value.
        from: &'static str,
        /// Requested target.
        to: String,
    },

    /// The value does not fit into the declared width.
    #[error("value {value} out of range for {to}")]
    OutOfRange { value: String, to: FieldType },

    /// Text could not be parsed into the requested type.
    #[error("cannot parse {input:?} as {to}: {message}")]
    Parse {
        input: String,
        to: FieldType,
        message: String,
    },
}

impl ValueError {
    pub(crate) fn conversion(from: &'static str, to: impl Into<String>) -> Self {
        ValueError::Conversion {
            from,
            to: to.into(),
        }
    }
}
