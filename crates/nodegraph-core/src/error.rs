//! Core error types.

use nodegraph_sql::{Dialect, ValueError};
use thiserror::Error;

use crate::driver::DriverError;

/// Errors returned by queries and mutations.
///
/// The first five variants are the ones callers are expected to branch on;
/// use the `is_*` helpers rather than matching on messages.
#[derive(Debug, Error)]
pub enum Error {
    /// A query, update or delete matched no row where one was required.
    #[error("nodegraph: {label} not found")]
    NotFound { label: String },

    /// An `only` query matched more than one row.
    #[error("nodegraph: {label} not singular")]
    NotSingular { label: String },

    /// Input rejected before reaching the database.
    #[error("nodegraph: validator failed for field \"{field}\": {cause}")]
    Validation { field: String, cause: String },

    /// The database reported a uniqueness, foreign-key or check violation.
    #[error("nodegraph: constraint failed: {message}")]
    Constraint { message: String },

    /// An edge was read without being eager-loaded.
    #[error("nodegraph: {edge} edge was not loaded")]
    NotLoaded { edge: String },

    /// Row width does not match the requested columns.
    #[error("nodegraph: mismatch number of scan values: {values} != {columns}")]
    ColumnMismatch { columns: usize, values: usize },

    /// An eager-load returned a neighbor no owner asked for.
    #[error("nodegraph: unexpected foreign-key \"{column}\" returned {value}")]
    UnexpectedForeignKey { column: String, value: String },

    /// An eager-loaded neighbor is missing its foreign key.
    #[error("nodegraph: foreign-key \"{column}\" is nil for node {node}")]
    MissingForeignKey { column: String, node: String },

    /// The caller cancelled the operation.
    #[error("nodegraph: operation cancelled")]
    Cancelled,

    /// The caller's deadline passed.
    #[error("nodegraph: deadline exceeded")]
    DeadlineExceeded,

    /// `detach` was called on a handle that is not transaction-scoped.
    #[error("nodegraph: handle is not transactional")]
    NotTransactional,

    /// A spec that cannot be executed as described.
    #[error("nodegraph: invalid spec: {0}")]
    InvalidSpec(String),

    /// Value conversion error.
    #[error("nodegraph: {0}")]
    Value(#[from] ValueError),

    /// Any other driver failure.
    #[error("driver error: {0}")]
    Driver(#[from] DriverError),
}

impl Error {
    pub(crate) fn validation(field: impl Into<String>, cause: impl Into<String>) -> Self {
        Error::Validation {
            field: field.into(),
            cause: cause.into(),
        }
    }

    pub(crate) fn not_found(label: impl Into<String>) -> Self {
        Error::NotFound {
            label: label.into(),
        }
    }

    /// Translate a driver error, recognizing constraint violations.
    pub fn from_driver(dialect: Dialect, err: DriverError) -> Self {
        if dialect.is_constraint_violation(&err.message) {
            Error::Constraint {
                message: err.message,
            }
        } else {
            Error::Driver(err)
        }
    }

    /// Replace the label of a not-found or not-singular error.
    ///
    /// The executor labels these with the table name; typed builders call
    /// this to report the node label instead.
    pub fn with_label(self, label: &str) -> Self {
        match self {
            Error::NotFound { .. } => Error::not_found(label),
            Error::NotSingular { .. } => Error::NotSingular {
                label: label.to_string(),
            },
            other => other,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }

    pub fn is_not_singular(&self) -> bool {
        matches!(self, Error::NotSingular { .. })
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Error::Validation { .. })
    }

    pub fn is_constraint(&self) -> bool {
        matches!(self, Error::Constraint { .. })
    }

    pub fn is_not_loaded(&self) -> bool {
        matches!(self, Error::NotLoaded { .. })
    }

    /// True for cancellation and deadline errors.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled | Error::DeadlineExceeded)
    }
}

/// Turns a `Result` into its value, panicking on error.
///
/// A convenience for scripts and tests; the library itself always
/// returns errors.
pub trait MustExt<T> {
    fn must(self) -> T;
}

impl<T> MustExt<T> for Result<T, Error> {
    #[track_caller]
    fn must(self) -> T {
        match self {
            Ok(v) => v,
            Err(e) => panic!("{e}"),
        }
    }
}
