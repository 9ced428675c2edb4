use crate::core::{ErrorClass, PersistError};
use crate::transaction::ScopeError;
use thiserror::Error;

/// Failures of the domain services.
///
/// Core failures pass through untouched in `Persist`, so callers can still
/// tell an exhausted conflict from an integrity violation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Duplicate user: {0}")]
    DuplicateUser(String),

    #[error("{0} already exists")]
    AlreadyExists(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error(transparent)]
    Persist(#[from] PersistError),
}

pub type ServiceResult<T> = std::result::Result<T, ServiceError>;

/// User-facing class of a failure, one per response family an outer layer
/// would map to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Capacity exhausted; try again later.
    Unavailable,
    /// Stale version or retries exhausted.
    Conflict,
    /// Bad input, duplicates, integrity violations.
    ClientData,
    NotFound,
    Forbidden,
    Unauthorized,
    Internal,
}

impl ServiceError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Forbidden(_) => ErrorKind::Forbidden,
            Self::DuplicateUser(_) | Self::AlreadyExists(_) | Self::Validation(_) => {
                ErrorKind::ClientData
            }
            Self::InvalidCredentials | Self::InvalidToken(_) => ErrorKind::Unauthorized,
            Self::Persist(err) => match err {
                PersistError::CapacityExhausted { .. } => ErrorKind::Unavailable,
                PersistError::ConcurrencyConflict(_) | PersistError::ConcurrencyExhausted { .. } => {
                    ErrorKind::Conflict
                }
                PersistError::IntegrityViolation(_)
                | PersistError::UnknownAttribute { .. }
                | PersistError::MissingAttribute { .. }
                | PersistError::InvalidValue { .. } => ErrorKind::ClientData,
                PersistError::NotFound { .. } => ErrorKind::NotFound,
                PersistError::Persistence(_) => ErrorKind::Internal,
            },
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Persist(err) if err.is_not_found())
    }
}

impl ScopeError for ServiceError {
    fn class(&self) -> ErrorClass {
        match self {
            Self::Persist(err) => err.class(),
            _ => ErrorClass::Rejected,
        }
    }

    fn exhausted(self, attempts: u32) -> Self {
        match self {
            Self::Persist(err) => Self::Persist(err.exhausted(attempts)),
            other => other,
        }
    }
}
