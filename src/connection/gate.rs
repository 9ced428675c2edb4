use super::ConnectionConfig;
use crate::core::{PersistError, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tracing::{debug, warn};

/// Bounded admission control in front of the connection pool.
///
/// Acquisition never blocks on the semaphore: it tries, sleeps a fixed delay
/// and tries again, up to a fixed number of attempts.
#[derive(Debug, Clone)]
pub struct ConnectionGate {
    semaphore: Arc<Semaphore>,
    capacity: usize,
    attempts: u32,
    retry_delay: Duration,
}

/// Capacity unit held for the lifetime of a transaction scope.
#[derive(Debug)]
pub struct GatePermit {
    _permit: OwnedSemaphorePermit,
}

impl GatePermit {
    /// Gives the capacity back. Dropping the permit does the same.
    pub fn release(self) {}
}

impl ConnectionGate {
    pub fn new(capacity: usize, attempts: u32, retry_delay: Duration) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
            attempts: attempts.max(1),
            retry_delay,
        }
    }

    pub fn from_config(config: &ConnectionConfig) -> Self {
        Self::new(
            config.max_connections,
            config.acquire_attempts,
            config.acquire_retry_delay,
        )
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Permits not currently held.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Rejects every future acquisition. Held permits stay valid.
    pub fn close(&self) {
        self.semaphore.close();
    }

    pub async fn acquire(&self) -> Result<GatePermit> {
        for attempt in 1..=self.attempts {
            match Arc::clone(&self.semaphore).try_acquire_owned() {
                Ok(permit) => {
                    debug!(attempt, available = self.available(), "gate permit acquired");
                    return Ok(GatePermit { _permit: permit });
                }
                Err(TryAcquireError::Closed) => {
                    return Err(PersistError::persistence("connection gate is closed"));
                }
                Err(TryAcquireError::NoPermits) if attempt < self.attempts => {
                    warn!(
                        attempt,
                        attempts = self.attempts,
                        capacity = self.capacity,
                        "connection gate saturated, retrying in {:?}",
                        self.retry_delay
                    );
                    tokio::time::sleep(self.retry_delay).await;
                }
                Err(TryAcquireError::NoPermits) => {}
            }
        }

        warn!(attempts = self.attempts, capacity = self.capacity, "connection gate exhausted");
        Err(PersistError::CapacityExhausted {
            attempts: self.attempts,
        })
    }
}
