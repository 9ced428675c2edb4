use super::config::ConnectionConfig;
use crate::core::{PersistError, Result};
use crate::storage::{Store, StoreConnection, StoreError, StoreResult};
use crate::transaction::IsolationLevel;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::warn;

/// Connection pool
///
/// Reuses store connections across transaction scopes. Connections past their
/// idle timeout or maximum lifetime are closed on the next checkout.
pub struct ConnectionPool {
    config: ConnectionConfig,
    store: Arc<dyn Store>,
    available: Arc<Mutex<VecDeque<PooledConnection>>>,
    total_connections: Arc<AtomicUsize>,
}

struct PooledConnection {
    connection: Box<dyn StoreConnection>,
    created_at: Instant,
    last_used: Instant,
}

impl PooledConnection {
    fn new(connection: Box<dyn StoreConnection>, created_at: Instant) -> Self {
        Self {
            connection,
            created_at,
            last_used: Instant::now(),
        }
    }

    fn is_expired(&self, max_lifetime: Option<Duration>) -> bool {
        if let Some(lifetime) = max_lifetime {
            self.created_at.elapsed() > lifetime
        } else {
            false
        }
    }

    fn is_idle_too_long(&self, idle_timeout: Option<Duration>) -> bool {
        if let Some(timeout) = idle_timeout {
            self.last_used.elapsed() > timeout
        } else {
            false
        }
    }
}

impl ConnectionPool {
    pub async fn new(config: ConnectionConfig, store: Arc<dyn Store>) -> Result<Self> {
        config.validate().map_err(PersistError::Persistence)?;

        let pool = Self {
            config,
            store,
            available: Arc::new(Mutex::new(VecDeque::new())),
            total_connections: Arc::new(AtomicUsize::new(0)),
        };

        pool.ensure_min_connections().await?;

        Ok(pool)
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Get a connection from the pool
    pub async fn get_connection(&self) -> Result<PoolGuard> {
        let start = Instant::now();

        loop {
            if let Some(pooled) = self.try_get_available().await {
                return Ok(self.guard(pooled.connection, pooled.created_at));
            }

            if let Some(conn) = self.try_create_connection().await? {
                return Ok(self.guard(conn, Instant::now()));
            }

            if start.elapsed() > self.config.connect_timeout {
                return Err(PersistError::persistence(
                    "Connection pool timeout: no connections available",
                ));
            }

            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    fn guard(&self, connection: Box<dyn StoreConnection>, created_at: Instant) -> PoolGuard {
        PoolGuard {
            connection: Some(connection),
            created_at,
            restore_isolation: None,
            pool: Arc::clone(&self.available),
            total_connections: Arc::clone(&self.total_connections),
        }
    }

    async fn try_get_available(&self) -> Option<PooledConnection> {
        let mut available = self.available.lock().await;

        let before = available.len();
        available.retain(|pooled| {
            !pooled.is_expired(self.config.max_lifetime)
                && !pooled.is_idle_too_long(self.config.idle_timeout)
        });
        let removed = before - available.len();
        if removed > 0 {
            self.total_connections.fetch_sub(removed, Ordering::SeqCst);
        }

        available.pop_front()
    }

    async fn try_create_connection(&self) -> Result<Option<Box<dyn StoreConnection>>> {
        let reserved = self
            .total_connections
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |total| {
                (total < self.config.max_connections).then_some(total + 1)
            })
            .is_ok();
        if !reserved {
            return Ok(None);
        }

        match self.store.connect().await {
            Ok(conn) => Ok(Some(conn)),
            Err(err) => {
                self.total_connections.fetch_sub(1, Ordering::SeqCst);
                Err(err.into())
            }
        }
    }

    async fn ensure_min_connections(&self) -> Result<()> {
        let mut available = self.available.lock().await;

        while self.total_connections.load(Ordering::SeqCst) < self.config.min_connections {
            let connection = self.store.connect().await?;
            available.push_back(PooledConnection::new(connection, Instant::now()));
            self.total_connections.fetch_add(1, Ordering::SeqCst);
        }

        Ok(())
    }

    /// Get pool statistics
    pub async fn stats(&self) -> PoolStats {
        let available = self.available.lock().await;
        let total = self.total_connections.load(Ordering::SeqCst);

        PoolStats {
            total_connections: total,
            available_connections: available.len(),
            active_connections: total.saturating_sub(available.len()),
            max_connections: self.config.max_connections,
        }
    }
}

/// Connection pool statistics
#[derive(Debug, Clone)]
pub struct PoolStats {
    pub total_connections: usize,
    pub available_connections: usize,
    pub active_connections: usize,
    pub max_connections: usize,
}

impl std::fmt::Display for PoolStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Pool Stats: {}/{} active, {} available, max {}",
            self.active_connections,
            self.total_connections,
            self.available_connections,
            self.max_connections
        )
    }
}

/// RAII guard for pooled connections
///
/// `close()` rolls back any open transaction, restores an isolation level
/// changed through [`PoolGuard::set_isolation`] and returns the connection. A
/// guard dropped without `close()` discards its connection when a transaction
/// or an isolation restore is still pending; otherwise it returns the
/// connection when the pool lock is free.
pub struct PoolGuard {
    connection: Option<Box<dyn StoreConnection>>,
    created_at: Instant,
    /// Level the connection had before `set_isolation` changed it.
    restore_isolation: Option<IsolationLevel>,
    pool: Arc<Mutex<VecDeque<PooledConnection>>>,
    total_connections: Arc<AtomicUsize>,
}

impl PoolGuard {
    pub fn connection(&mut self) -> StoreResult<&mut Box<dyn StoreConnection>> {
        self.connection
            .as_mut()
            .ok_or_else(|| StoreError::InvalidState("connection already returned to pool".into()))
    }

    /// Switches the connection to `level` until the guard is closed and
    /// returns the level it had before.
    pub async fn set_isolation(&mut self, level: IsolationLevel) -> StoreResult<IsolationLevel> {
        let connection = self.connection()?;
        let current = connection.isolation_level().await?;
        if current != level {
            connection.set_isolation_level(level).await?;
        }
        let original = *self.restore_isolation.get_or_insert(current);
        Ok(original)
    }

    /// True while an isolation change has not been undone.
    pub fn restore_pending(&self) -> bool {
        self.restore_isolation.is_some()
    }

    pub async fn close(mut self) -> StoreResult<()> {
        if let Some(mut connection) = self.connection.take() {
            if connection.in_transaction() {
                if let Err(err) = connection.rollback().await {
                    self.total_connections.fetch_sub(1, Ordering::SeqCst);
                    return Err(err);
                }
            }

            if let Some(level) = self.restore_isolation.take() {
                if let Err(err) = connection.set_isolation_level(level).await {
                    self.total_connections.fetch_sub(1, Ordering::SeqCst);
                    return Err(err);
                }
            }

            let mut pool = self.pool.lock().await;
            pool.push_back(PooledConnection::new(connection, self.created_at));
        }
        Ok(())
    }

    /// Closes the connection instead of returning it.
    pub fn discard(mut self) {
        if self.connection.take().is_some() {
            self.total_connections.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl Drop for PoolGuard {
    fn drop(&mut self) {
        let Some(connection) = self.connection.take() else {
            return;
        };

        if connection.in_transaction() {
            warn!(
                connection = connection.id(),
                "PoolGuard dropped inside a transaction, discarding connection"
            );
            self.total_connections.fetch_sub(1, Ordering::SeqCst);
            return;
        }

        if let Some(level) = self.restore_isolation.take() {
            warn!(
                connection = connection.id(),
                isolation = %level,
                "PoolGuard dropped before its isolation level was restored, discarding connection"
            );
            self.total_connections.fetch_sub(1, Ordering::SeqCst);
            return;
        }

        if let Ok(mut pool) = self.pool.try_lock() {
            pool.push_back(PooledConnection::new(connection, self.created_at));
        } else {
            warn!(
                connection = connection.id(),
                "PoolGuard dropped while the pool was busy, discarding connection"
            );
            self.total_connections.fetch_sub(1, Ordering::SeqCst);
        }
    }
}
