// ============================================================================
// Transaction Management Module
// ============================================================================
//
// Scoped units of work over pooled store connections:
// - isolation level selection with guaranteed restore
// - commit on success, rollback on every failure path
// - bounded retry of stale-version conflicts with linear backoff
//
// ============================================================================

pub mod isolation;
pub mod manager;
pub mod policy;
pub mod session;

pub use isolation::{IsolationLevel, ParseIsolationLevelError};
pub use manager::{ScopeOptions, TransactionManager};
pub use policy::{AttemptState, FailureKind, RetryPolicy, ScopeError};
pub use session::Session;
