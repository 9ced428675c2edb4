use crate::core::Value;
use thiserror::Error;

/// Failures reported by a storage collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Could not serialize access due to concurrent update: {0}")]
    SerializationFailure(String),

    #[error("Unique constraint violated on {table}.{column}: {value} already exists")]
    UniqueViolation {
        table: String,
        column: String,
        value: Value,
    },

    #[error("Foreign key violated on {table}.{column}: {detail}")]
    ForeignKeyViolation {
        table: String,
        column: String,
        detail: String,
    },

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Table '{0}' not found")]
    TableNotFound(String),

    #[error("Table '{0}' already exists")]
    TableExists(String),

    #[error("Column '{0}' not found in table '{1}'")]
    ColumnNotFound(String, String),

    #[error("Lock wait timeout on {table}/{key}")]
    LockTimeout { table: String, key: String },

    #[error("No active transaction")]
    NoActiveTransaction,

    #[error("Transaction already active")]
    TransactionActive,

    #[error("Invalid connection state: {0}")]
    InvalidState(String),

    #[error("Internal store error: {0}")]
    Internal(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

impl<T> From<std::sync::PoisonError<T>> for StoreError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::Internal(err.to_string())
    }
}
