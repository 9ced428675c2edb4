// ============================================================================
// Transaction Manager
// ============================================================================

use super::{AttemptState, IsolationLevel, RetryPolicy, ScopeError, Session};
use crate::connection::{ConnectionGate, ConnectionPool};
use std::future::Future;
use tracing::{debug, warn};

/// Per-scope settings. Unset fields fall back to the connection's current
/// isolation level and the manager's [`RetryPolicy`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScopeOptions {
    pub isolation: Option<IsolationLevel>,
    pub retry_count: Option<u32>,
}

impl ScopeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read_committed() -> Self {
        Self::new().isolation(IsolationLevel::ReadCommitted)
    }

    pub fn repeatable_read() -> Self {
        Self::new().isolation(IsolationLevel::RepeatableRead)
    }

    pub fn isolation(mut self, level: IsolationLevel) -> Self {
        self.isolation = Some(level);
        self
    }

    pub fn retries(mut self, count: u32) -> Self {
        self.retry_count = Some(count);
        self
    }
}

/// Runs units of work inside transaction scopes.
///
/// A scope takes a gate permit, checks out a pooled connection, optionally
/// switches its isolation level, and runs the body in a fresh transaction per
/// attempt. Stale-version conflicts are retried with linear backoff; every
/// other failure rolls back and ends the scope. The connection goes back to the
/// pool with its original isolation level and the permit is released on every
/// exit path.
pub struct TransactionManager {
    gate: ConnectionGate,
    pool: ConnectionPool,
    policy: RetryPolicy,
}

impl TransactionManager {
    pub fn new(gate: ConnectionGate, pool: ConnectionPool, policy: RetryPolicy) -> Self {
        Self { gate, pool, policy }
    }

    pub fn gate(&self) -> &ConnectionGate {
        &self.gate
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Executes `body` inside a transaction scope.
    ///
    /// The body receives a [`Session`] bound to the scope's connection and may
    /// be called more than once, so it must rebuild its work from its captured
    /// inputs on every call. Its error type decides what is retried through
    /// [`ScopeError::class`].
    pub async fn run<F, Fut, T, E>(&self, options: ScopeOptions, mut body: F) -> Result<T, E>
    where
        F: FnMut(Session) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: ScopeError,
    {
        let permit = self.gate.acquire().await?;
        let guard = match self.pool.get_connection().await {
            Ok(guard) => guard,
            Err(err) => {
                permit.release();
                return Err(err.into());
            }
        };
        let session = Session::new(guard);

        if let Some(level) = options.isolation {
            if let Err(err) = session.apply_isolation(level).await {
                session.close().await;
                permit.release();
                return Err(err.into());
            }
        }

        let budget = options
            .retry_count
            .unwrap_or(self.policy.max_attempts)
            .max(1);
        let outcome = self.attempts(&session, budget, &mut body).await;

        session.close().await;
        permit.release();
        outcome
    }

    async fn attempts<F, Fut, T, E>(
        &self,
        session: &Session,
        budget: u32,
        body: &mut F,
    ) -> Result<T, E>
    where
        F: FnMut(Session) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: ScopeError,
    {
        let mut attempt = 1;
        loop {
            let outcome = self.attempt(session, body).await;

            match self
                .policy
                .next_state(attempt, budget, outcome.as_ref().map(|_| ()).map_err(E::class))
            {
                AttemptState::Committed => {
                    debug!(attempt, "scope committed");
                    return outcome;
                }
                AttemptState::Attempting(next) => {
                    let backoff = self.policy.backoff(attempt);
                    if let Err(err) = &outcome {
                        warn!(
                            attempt,
                            budget,
                            backoff_ms = backoff.as_millis() as u64,
                            error = %err,
                            "retrying scope after concurrency conflict"
                        );
                    }
                    tokio::time::sleep(backoff).await;
                    attempt = next;
                }
                AttemptState::Failed(kind) => {
                    debug!(attempt, ?kind, "scope failed");
                    return outcome.map_err(|err| kind.into_error(attempt, err));
                }
            }
        }
    }

    async fn attempt<F, Fut, T, E>(&self, session: &Session, body: &mut F) -> Result<T, E>
    where
        F: FnMut(Session) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: ScopeError,
    {
        session.begin().await?;

        let result = match body(session.clone()).await {
            Ok(value) => session.commit().await.map(|()| value).map_err(E::from),
            Err(err) => Err(err),
        };

        if result.is_err() {
            session.rollback().await;
        }
        result
    }
}
