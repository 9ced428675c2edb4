use crate::storage::StoreError;
use thiserror::Error;

/// Failure taxonomy of the persistence core.
///
/// Every operation of the entity layer and the transaction manager funnels its
/// failures through this type. Callers branch on the variant (or on
/// [`PersistError::class`]) rather than on messages.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PersistError {
    #[error("Capacity exhausted: no connection permit after {attempts} attempts")]
    CapacityExhausted { attempts: u32 },

    #[error("Concurrency conflict: {0}")]
    ConcurrencyConflict(String),

    #[error("Concurrency retries exhausted after {attempts} attempts: {last}")]
    ConcurrencyExhausted { attempts: u32, last: String },

    #[error("Integrity violation: {0}")]
    IntegrityViolation(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("{entity} with {key}={id} not found")]
    NotFound {
        entity: &'static str,
        key: &'static str,
        id: String,
    },

    #[error("Attribute '{attribute}' does not exist on {entity}")]
    UnknownAttribute {
        entity: &'static str,
        attribute: String,
    },

    #[error("Missing required attribute '{attribute}' for {entity}")]
    MissingAttribute {
        entity: &'static str,
        attribute: &'static str,
    },

    #[error("Invalid value for {entity}.{attribute}: {reason}")]
    InvalidValue {
        entity: &'static str,
        attribute: String,
        reason: String,
    },
}

pub type Result<T> = std::result::Result<T, PersistError>;

/// How the transaction manager reacts to a failure raised inside a scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Optimistic version mismatch or serialization failure. Retryable.
    StaleConflict,
    /// Unique / foreign key / not-null violation. Terminal.
    Integrity,
    /// Unclassified storage failure. Terminal.
    Persistence,
    /// Raised by the caller's own logic (not found, validation, ...). Terminal,
    /// propagated unchanged.
    Rejected,
}

impl PersistError {
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::ConcurrencyConflict(message.into())
    }

    pub fn persistence(message: impl Into<String>) -> Self {
        Self::Persistence(message.into())
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            Self::ConcurrencyConflict(_) => ErrorClass::StaleConflict,
            Self::IntegrityViolation(_) => ErrorClass::Integrity,
            Self::Persistence(_) => ErrorClass::Persistence,
            Self::CapacityExhausted { .. }
            | Self::ConcurrencyExhausted { .. }
            | Self::NotFound { .. }
            | Self::UnknownAttribute { .. }
            | Self::MissingAttribute { .. }
            | Self::InvalidValue { .. } => ErrorClass::Rejected,
        }
    }

    /// True for both a single stale-version rejection and an exhausted retry
    /// budget.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            Self::ConcurrencyConflict(_) | Self::ConcurrencyExhausted { .. }
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<StoreError> for PersistError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::SerializationFailure(_) => Self::ConcurrencyConflict(err.to_string()),
            StoreError::UniqueViolation { .. }
            | StoreError::ForeignKeyViolation { .. }
            | StoreError::ConstraintViolation(_) => Self::IntegrityViolation(err.to_string()),
            other => Self::Persistence(other.to_string()),
        }
    }
}
