use crate::core::{ErrorClass, PersistError};
use std::fmt;
use std::time::Duration;

/// Error type a scope body may fail with. Infrastructure failures arrive as
/// [`PersistError`]; anything classified `Rejected` passes through unchanged.
pub trait ScopeError: From<PersistError> + fmt::Display + Send {
    fn class(&self) -> ErrorClass;

    /// Error reported when every attempt ended in a conflict like `self`.
    fn exhausted(self, attempts: u32) -> Self;
}

impl ScopeError for PersistError {
    fn class(&self) -> ErrorClass {
        PersistError::class(self)
    }

    fn exhausted(self, attempts: u32) -> Self {
        match self {
            Self::ConcurrencyConflict(last) => Self::ConcurrencyExhausted { attempts, last },
            other => Self::ConcurrencyExhausted {
                attempts,
                last: other.to_string(),
            },
        }
    }
}

/// Configuration for retrying a scope after a stale-version conflict.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempts per scope when the caller does not ask for a specific count.
    pub max_attempts: u32,
    /// Backoff grows linearly: `backoff_step * attempt`.
    pub backoff_step: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_step: Duration::from_millis(100),
        }
    }
}

/// Where a scope stands after an attempt finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptState {
    /// Run the body again as attempt `n` (1-based).
    Attempting(u32),
    Committed,
    Failed(FailureKind),
}

/// Why a scope gave up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Every attempt hit a stale-version conflict.
    Exhausted,
    Integrity,
    Persistence,
    /// The body rejected the operation itself; its error is kept as is.
    Rejected,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff_step: Duration) -> Self {
        Self {
            max_attempts,
            backoff_step,
        }
    }

    /// Sleep before the attempt that follows `attempt`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_step.saturating_mul(attempt)
    }

    /// Transition after attempt number `attempt` out of `budget` finished with
    /// `outcome` (the class of the failure, if any).
    pub fn next_state(
        &self,
        attempt: u32,
        budget: u32,
        outcome: Result<(), ErrorClass>,
    ) -> AttemptState {
        let Err(class) = outcome else {
            return AttemptState::Committed;
        };

        match class {
            ErrorClass::StaleConflict if attempt < budget.max(1) => {
                AttemptState::Attempting(attempt + 1)
            }
            ErrorClass::StaleConflict => AttemptState::Failed(FailureKind::Exhausted),
            ErrorClass::Integrity => AttemptState::Failed(FailureKind::Integrity),
            ErrorClass::Persistence => AttemptState::Failed(FailureKind::Persistence),
            ErrorClass::Rejected => AttemptState::Failed(FailureKind::Rejected),
        }
    }
}

impl FailureKind {
    /// Error surfaced to the caller once the scope failed after `attempts`.
    pub fn into_error<E: ScopeError>(self, attempts: u32, err: E) -> E {
        match self {
            Self::Exhausted => err.exhausted(attempts),
            _ => err,
        }
    }
}
