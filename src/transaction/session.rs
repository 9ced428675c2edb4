use super::IsolationLevel;
use crate::connection::PoolGuard;
use crate::core::{PersistError, Result, Row};
use crate::storage::{Filter, Query, StoreConnection};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::warn;

/// Unit-of-work handle handed to a transaction scope body.
///
/// A session wraps the pooled connection owned by one scope. Clones share that
/// connection; once the scope ends every clone fails with a persistence error
/// instead of touching a connection that went back to the pool.
#[derive(Clone)]
pub struct Session {
    slot: Arc<Mutex<Option<PoolGuard>>>,
}

fn closed() -> PersistError {
    PersistError::persistence("session is closed: its transaction scope has ended")
}

fn attached(slot: &mut Option<PoolGuard>) -> Result<&mut Box<dyn StoreConnection>> {
    let guard = slot.as_mut().ok_or_else(closed)?;
    Ok(guard.connection()?)
}

impl Session {
    pub(crate) fn new(guard: PoolGuard) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Some(guard))),
        }
    }

    pub async fn is_open(&self) -> bool {
        self.slot.lock().await.is_some()
    }

    pub async fn isolation_level(&self) -> Result<IsolationLevel> {
        let mut slot = self.slot.lock().await;
        Ok(attached(&mut slot)?.isolation_level().await?)
    }

    pub async fn select(&self, table: &str, query: &Query) -> Result<Vec<Row>> {
        let mut slot = self.slot.lock().await;
        Ok(attached(&mut slot)?.select(table, query).await?)
    }

    pub async fn count(&self, table: &str, filters: &[Filter]) -> Result<u64> {
        let mut slot = self.slot.lock().await;
        Ok(attached(&mut slot)?.count(table, filters).await?)
    }

    /// Locks the matching rows until the scope's transaction ends.
    pub async fn select_for_update(&self, table: &str, filters: &[Filter]) -> Result<Vec<Row>> {
        let mut slot = self.slot.lock().await;
        Ok(attached(&mut slot)?
            .select_for_update(table, filters)
            .await?)
    }

    pub async fn insert(&self, table: &str, row: Row) -> Result<()> {
        let mut slot = self.slot.lock().await;
        Ok(attached(&mut slot)?.insert(table, row).await?)
    }

    pub async fn update(&self, table: &str, key: &str, row: Row) -> Result<u64> {
        let mut slot = self.slot.lock().await;
        Ok(attached(&mut slot)?.update(table, key, row).await?)
    }

    pub async fn delete(&self, table: &str, key: &str) -> Result<u64> {
        let mut slot = self.slot.lock().await;
        Ok(attached(&mut slot)?.delete(table, key).await?)
    }

    pub(crate) async fn begin(&self) -> Result<()> {
        let mut slot = self.slot.lock().await;
        Ok(attached(&mut slot)?.begin().await?)
    }

    pub(crate) async fn commit(&self) -> Result<()> {
        let mut slot = self.slot.lock().await;
        Ok(attached(&mut slot)?.commit().await?)
    }

    /// Rolls back the open transaction, if any. A failed rollback is logged;
    /// the connection then gets discarded when the scope closes.
    pub(crate) async fn rollback(&self) {
        let mut slot = self.slot.lock().await;
        let Ok(conn) = attached(&mut slot) else {
            return;
        };
        if !conn.in_transaction() {
            return;
        }
        if let Err(err) = conn.rollback().await {
            warn!(connection = conn.id(), error = %err, "rollback failed");
        }
    }

    /// Switches the connection to `level` for the rest of the scope and
    /// returns the level it had before. The guard restores it on close and
    /// discards the connection if it is dropped first.
    pub(crate) async fn apply_isolation(&self, level: IsolationLevel) -> Result<IsolationLevel> {
        let mut slot = self.slot.lock().await;
        let guard = slot.as_mut().ok_or_else(closed)?;
        Ok(guard.set_isolation(level).await?)
    }

    /// Ends the scope and hands the connection back to the pool. A connection
    /// whose isolation level cannot be restored is discarded rather than
    /// pooled.
    pub(crate) async fn close(&self) {
        let taken = self.slot.lock().await.take();
        let Some(guard) = taken else {
            return;
        };

        if let Err(err) = guard.close().await {
            warn!(error = %err, "connection not returned to pool");
        }
    }
}
