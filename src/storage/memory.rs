// ============================================================================
// In-memory relational store
// ============================================================================
//
// Committed state lives in persistent maps, so taking a repeatable-read
// snapshot is a cheap clone. Each connection buffers its writes until commit.
// Row locks are held per transaction until commit/rollback; a repeatable-read
// transaction that touches a row committed after its snapshot fails with a
// serialization failure (first updater wins).
//
// ============================================================================

use super::query::matches_all;
use super::{Filter, Query, Store, StoreConnection, StoreError, StoreResult, TableSchema};
use crate::core::{Row, Value};
use crate::transaction::IsolationLevel;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// How long a statement waits for a row lock held by another transaction.
    pub lock_timeout: Duration,
    /// Isolation level of freshly opened connections.
    pub default_isolation: IsolationLevel,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_secs(5),
            default_isolation: IsolationLevel::ReadCommitted,
        }
    }
}

impl StoreConfig {
    pub fn lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn default_isolation(mut self, level: IsolationLevel) -> Self {
        self.default_isolation = level;
        self
    }
}

#[derive(Debug, Clone)]
struct StoredRow {
    row: Row,
    /// Commit sequence number of the transaction that wrote this version.
    commit_seq: u64,
}

type TableRows = im::OrdMap<String, StoredRow>;
type RowKey = (String, String);

#[derive(Debug, Clone, Default)]
struct CommittedState {
    seq: u64,
    tables: im::HashMap<String, TableRows>,
}

impl CommittedState {
    fn row(&self, table: &str, key: &str) -> Option<&StoredRow> {
        self.tables.get(table).and_then(|rows| rows.get(key))
    }

    fn contains(&self, table: &str, key: &str) -> bool {
        self.row(table, key).is_some()
    }

    fn with_writes(mut self, writes: &BTreeMap<RowKey, Option<Row>>, seq: u64) -> Self {
        for ((table, key), write) in writes {
            if let Some(rows) = self.tables.get_mut(table) {
                match write {
                    Some(row) => {
                        rows.insert(
                            key.clone(),
                            StoredRow {
                                row: row.clone(),
                                commit_seq: seq,
                            },
                        );
                    }
                    None => {
                        rows.remove(key);
                    }
                }
            }
        }
        self
    }
}

struct LockTable {
    held: Mutex<HashMap<RowKey, u64>>,
    released: Notify,
}

impl LockTable {
    fn new() -> Self {
        Self {
            held: Mutex::new(HashMap::new()),
            released: Notify::new(),
        }
    }

    async fn acquire(&self, key: &RowKey, owner: u64, wait: Duration) -> StoreResult<()> {
        let deadline = Instant::now() + wait;
        loop {
            // Registered before the check so a release in between is not missed.
            let released = self.released.notified();
            {
                let mut held = self.held.lock()?;
                match held.get(key) {
                    Some(holder) if *holder != owner => {}
                    _ => {
                        held.insert(key.clone(), owner);
                        return Ok(());
                    }
                }
            }

            if tokio::time::timeout_at(deadline, released).await.is_err() {
                return Err(StoreError::LockTimeout {
                    table: key.0.clone(),
                    key: key.1.clone(),
                });
            }
        }
    }

    fn release_all(&self, owner: u64, keys: &HashSet<RowKey>) {
        if keys.is_empty() {
            return;
        }
        {
            let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
            for key in keys {
                if held.get(key) == Some(&owner) {
                    held.remove(key);
                }
            }
        }
        self.released.notify_waiters();
    }
}

struct Shared {
    catalog: RwLock<HashMap<String, Arc<TableSchema>>>,
    committed: RwLock<CommittedState>,
    locks: LockTable,
    config: StoreConfig,
    next_connection_id: AtomicU64,
    next_txn_id: AtomicU64,
}

/// In-memory [`Store`] with read-committed and repeatable-read isolation, row
/// locks, unique and foreign key constraints.
#[derive(Clone)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_config(StoreConfig::default())
    }

    pub fn with_config(config: StoreConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                catalog: RwLock::new(HashMap::new()),
                committed: RwLock::new(CommittedState::default()),
                locks: LockTable::new(),
                config,
                next_connection_id: AtomicU64::new(1),
                next_txn_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.shared.config
    }

    pub fn table_names(&self) -> Vec<String> {
        let catalog = self
            .shared
            .catalog
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = catalog.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of committed rows in `table`.
    pub fn committed_row_count(&self, table: &str) -> StoreResult<usize> {
        let committed = self.shared.committed.read()?;
        committed
            .tables
            .get(table)
            .map(|rows| rows.len())
            .ok_or_else(|| StoreError::TableNotFound(table.to_string()))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_table(&self, schema: TableSchema) -> StoreResult<()> {
        schema.validate()?;

        let mut catalog = self.shared.catalog.write()?;
        let name = schema.name().to_string();
        if catalog.contains_key(&name) {
            return Err(StoreError::TableExists(name));
        }

        self.shared
            .committed
            .write()?
            .tables
            .insert(name.clone(), TableRows::new());
        catalog.insert(name, Arc::new(schema));
        Ok(())
    }

    async fn connect(&self) -> StoreResult<Box<dyn StoreConnection>> {
        Ok(Box::new(MemoryConnection::new(Arc::clone(&self.shared))))
    }
}

struct ActiveTxn {
    id: u64,
    /// Present for snapshot-based levels (repeatable read, serializable).
    snapshot: Option<CommittedState>,
    /// `None` marks a deletion.
    writes: BTreeMap<RowKey, Option<Row>>,
    locked: HashSet<RowKey>,
}

/// Connection to a [`MemoryStore`].
///
/// Dropping a connection with an open transaction discards its writes and
/// releases its row locks.
pub struct MemoryConnection {
    id: u64,
    shared: Arc<Shared>,
    isolation: IsolationLevel,
    txn: Option<ActiveTxn>,
}

impl MemoryConnection {
    fn new(shared: Arc<Shared>) -> Self {
        let id = shared.next_connection_id.fetch_add(1, Ordering::SeqCst);
        let isolation = shared.config.default_isolation;
        Self {
            id,
            shared,
            isolation,
            txn: None,
        }
    }

    fn schema(&self, table: &str) -> StoreResult<Arc<TableSchema>> {
        self.shared
            .catalog
            .read()?
            .get(table)
            .cloned()
            .ok_or_else(|| StoreError::TableNotFound(table.to_string()))
    }

    fn latest(&self) -> StoreResult<CommittedState> {
        Ok(self.shared.committed.read()?.clone())
    }

    fn txn(&self) -> StoreResult<&ActiveTxn> {
        self.txn.as_ref().ok_or(StoreError::NoActiveTransaction)
    }

    fn txn_mut(&mut self) -> StoreResult<&mut ActiveTxn> {
        self.txn.as_mut().ok_or(StoreError::NoActiveTransaction)
    }

    /// The state statements read from: the snapshot when there is one,
    /// otherwise the latest committed state, plus this transaction's writes.
    fn read_view(&self) -> StoreResult<CommittedState> {
        let base = match self.txn.as_ref().and_then(|txn| txn.snapshot.as_ref()) {
            Some(snapshot) => snapshot.clone(),
            None => self.latest()?,
        };
        Ok(self.with_own_writes(base))
    }

    fn with_own_writes(&self, state: CommittedState) -> CommittedState {
        match &self.txn {
            Some(txn) => {
                let seq = state.seq;
                state.with_writes(&txn.writes, seq)
            }
            None => state,
        }
    }

    async fn lock_row(&mut self, table: &str, key: &str) -> StoreResult<()> {
        let txn = self.txn()?;
        let row_key = (table.to_string(), key.to_string());
        if txn.locked.contains(&row_key) {
            return Ok(());
        }

        let owner = txn.id;
        self.shared
            .locks
            .acquire(&row_key, owner, self.shared.config.lock_timeout)
            .await?;
        self.txn_mut()?.locked.insert(row_key);
        Ok(())
    }

    /// Snapshot transactions may not touch a row another transaction committed
    /// after the snapshot was taken.
    fn check_not_stale(&self, latest: &CommittedState, table: &str, key: &str) -> StoreResult<()> {
        let Some(txn) = &self.txn else {
            return Ok(());
        };
        let Some(snapshot) = &txn.snapshot else {
            return Ok(());
        };
        if txn
            .writes
            .contains_key(&(table.to_string(), key.to_string()))
        {
            return Ok(());
        }

        let seen = snapshot.row(table, key).map(|stored| stored.commit_seq);
        let current = latest.row(table, key).map(|stored| stored.commit_seq);
        if seen != current {
            return Err(StoreError::SerializationFailure(format!(
                "{}/{} was changed by a transaction committed after this one started",
                table, key
            )));
        }
        Ok(())
    }

    fn record_write(&mut self, table: &str, key: &str, write: Option<Row>) -> StoreResult<()> {
        self.txn_mut()?
            .writes
            .insert((table.to_string(), key.to_string()), write);
        Ok(())
    }

    fn apply_commit(&self, txn: &ActiveTxn) -> StoreResult<()> {
        if txn.writes.is_empty() {
            return Ok(());
        }

        let catalog = self.shared.catalog.read()?.clone();
        let mut committed = self.shared.committed.write()?;
        let seq = committed.seq + 1;
        let mut next = committed.clone().with_writes(&txn.writes, seq);

        for ((table, key), write) in &txn.writes {
            let schema = catalog
                .get(table)
                .ok_or_else(|| StoreError::TableNotFound(table.clone()))?;
            match write {
                Some(row) => check_row_constraints(&next, schema, key, row)?,
                None => check_delete_constraints(&next, &catalog, table, key)?,
            }
        }

        next.seq = seq;
        *committed = next;
        Ok(())
    }
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        if let Some(txn) = self.txn.take() {
            debug!(connection = self.id, txn = txn.id, "connection dropped inside transaction, discarding writes");
            self.shared.locks.release_all(txn.id, &txn.locked);
        }
    }
}

#[async_trait]
impl StoreConnection for MemoryConnection {
    fn id(&self) -> u64 {
        self.id
    }

    fn in_transaction(&self) -> bool {
        self.txn.is_some()
    }

    async fn isolation_level(&mut self) -> StoreResult<IsolationLevel> {
        Ok(self.isolation)
    }

    async fn set_isolation_level(&mut self, level: IsolationLevel) -> StoreResult<()> {
        if self.txn.is_some() {
            return Err(StoreError::InvalidState(
                "isolation level cannot change inside an open transaction".into(),
            ));
        }
        self.isolation = level;
        Ok(())
    }

    async fn begin(&mut self) -> StoreResult<()> {
        if self.txn.is_some() {
            return Err(StoreError::TransactionActive);
        }

        let snapshot = if self.isolation.uses_snapshot() {
            Some(self.latest()?)
        } else {
            None
        };
        let id = self.shared.next_txn_id.fetch_add(1, Ordering::SeqCst);
        debug!(connection = self.id, txn = id, isolation = %self.isolation, "begin");

        self.txn = Some(ActiveTxn {
            id,
            snapshot,
            writes: BTreeMap::new(),
            locked: HashSet::new(),
        });
        Ok(())
    }

    async fn commit(&mut self) -> StoreResult<()> {
        let txn = self.txn.take().ok_or(StoreError::NoActiveTransaction)?;
        let result = self.apply_commit(&txn);
        self.shared.locks.release_all(txn.id, &txn.locked);

        match &result {
            Ok(()) => debug!(connection = self.id, txn = txn.id, writes = txn.writes.len(), "commit"),
            Err(err) => debug!(connection = self.id, txn = txn.id, error = %err, "commit rejected"),
        }
        result
    }

    async fn rollback(&mut self) -> StoreResult<()> {
        let txn = self.txn.take().ok_or(StoreError::NoActiveTransaction)?;
        self.shared.locks.release_all(txn.id, &txn.locked);
        debug!(connection = self.id, txn = txn.id, "rollback");
        Ok(())
    }

    async fn select(&mut self, table: &str, query: &Query) -> StoreResult<Vec<Row>> {
        self.schema(table)?;
        let view = self.read_view()?;
        let rows = view
            .tables
            .get(table)
            .map(|rows| {
                rows.values()
                    .filter(|stored| matches_all(&query.filters, &stored.row))
                    .map(|stored| stored.row.clone())
                    .collect()
            })
            .unwrap_or_default();
        Ok(query.window(rows))
    }

    async fn count(&mut self, table: &str, filters: &[Filter]) -> StoreResult<u64> {
        self.schema(table)?;
        let view = self.read_view()?;
        let count = view
            .tables
            .get(table)
            .map(|rows| {
                rows.values()
                    .filter(|stored| matches_all(filters, &stored.row))
                    .count()
            })
            .unwrap_or(0);
        Ok(count as u64)
    }

    async fn select_for_update(
        &mut self,
        table: &str,
        filters: &[Filter],
    ) -> StoreResult<Vec<Row>> {
        self.txn()?;
        self.schema(table)?;

        let candidates: Vec<String> = {
            let view = self.read_view()?;
            view.tables
                .get(table)
                .map(|rows| {
                    rows.iter()
                        .filter(|(_, stored)| matches_all(filters, &stored.row))
                        .map(|(key, _)| key.clone())
                        .collect()
                })
                .unwrap_or_default()
        };

        let mut locked = Vec::with_capacity(candidates.len());
        for key in candidates {
            self.lock_row(table, &key).await?;

            // Re-evaluate against the newest version now that the lock is held.
            let latest = self.latest()?;
            self.check_not_stale(&latest, table, &key)?;
            let current = self.with_own_writes(latest);
            if let Some(stored) = current.row(table, &key) {
                if matches_all(filters, &stored.row) {
                    locked.push(stored.row.clone());
                }
            }
        }
        Ok(locked)
    }

    async fn insert(&mut self, table: &str, row: Row) -> StoreResult<()> {
        self.txn()?;
        let schema = self.schema(table)?;
        let key = schema.validate_row(&row)?;

        self.lock_row(table, &key).await?;

        let current = self.with_own_writes(self.latest()?);
        if current.contains(table, &key) {
            return Err(StoreError::UniqueViolation {
                table: table.to_string(),
                column: schema.primary_key().to_string(),
                value: Value::Text(key),
            });
        }
        check_row_constraints(&current, &schema, &key, &row)?;

        self.record_write(table, &key, Some(row))
    }

    async fn update(&mut self, table: &str, key: &str, row: Row) -> StoreResult<u64> {
        self.txn()?;
        let schema = self.schema(table)?;
        if schema.validate_row(&row)? != key {
            return Err(StoreError::ConstraintViolation(format!(
                "primary key of {}/{} cannot change",
                table, key
            )));
        }

        self.lock_row(table, key).await?;

        let latest = self.latest()?;
        self.check_not_stale(&latest, table, key)?;
        let current = self.with_own_writes(latest);
        if !current.contains(table, key) {
            return Ok(0);
        }
        check_row_constraints(&current, &schema, key, &row)?;

        self.record_write(table, key, Some(row))?;
        Ok(1)
    }

    async fn delete(&mut self, table: &str, key: &str) -> StoreResult<u64> {
        self.txn()?;
        self.schema(table)?;

        self.lock_row(table, key).await?;

        let latest = self.latest()?;
        self.check_not_stale(&latest, table, key)?;
        let current = self.with_own_writes(latest);
        if !current.contains(table, key) {
            return Ok(0);
        }

        let catalog = self.shared.catalog.read()?.clone();
        let mut after = current;
        if let Some(rows) = after.tables.get_mut(table) {
            rows.remove(key);
        }
        check_delete_constraints(&after, &catalog, table, key)?;

        self.record_write(table, key, None)?;
        Ok(1)
    }
}

fn check_row_constraints(
    state: &CommittedState,
    schema: &TableSchema,
    key: &str,
    row: &Row,
) -> StoreResult<()> {
    let table = schema.name();

    for column in schema.unique_columns() {
        let Some(value) = row.get(column).filter(|value| !value.is_null()) else {
            continue;
        };
        let taken = state.tables.get(table).is_some_and(|rows| {
            rows.iter()
                .any(|(other, stored)| other != key && stored.row.get(column) == Some(value))
        });
        if taken {
            return Err(StoreError::UniqueViolation {
                table: table.to_string(),
                column: column.clone(),
                value: value.clone(),
            });
        }
    }

    for fk in schema.foreign_keys() {
        let referenced = match row.get(&fk.column) {
            None | Some(Value::Null) => continue,
            Some(Value::Text(referenced)) => referenced,
            Some(other) => {
                return Err(StoreError::ForeignKeyViolation {
                    table: table.to_string(),
                    column: fk.column.clone(),
                    detail: format!("{} is not a valid key", other),
                });
            }
        };
        let rows = state
            .tables
            .get(&fk.ref_table)
            .ok_or_else(|| StoreError::TableNotFound(fk.ref_table.clone()))?;
        if !rows.contains_key(referenced) {
            return Err(StoreError::ForeignKeyViolation {
                table: table.to_string(),
                column: fk.column.clone(),
                detail: format!("key '{}' is not present in {}", referenced, fk.ref_table),
            });
        }
    }

    Ok(())
}

fn check_delete_constraints(
    state: &CommittedState,
    catalog: &HashMap<String, Arc<TableSchema>>,
    table: &str,
    key: &str,
) -> StoreResult<()> {
    let key_value = Value::Text(key.to_string());
    for schema in catalog.values() {
        for fk in schema.foreign_keys().iter().filter(|fk| fk.ref_table == table) {
            let referenced = state.tables.get(schema.name()).is_some_and(|rows| {
                rows.values()
                    .any(|stored| stored.row.get(&fk.column) == Some(&key_value))
            });
            if referenced {
                return Err(StoreError::ForeignKeyViolation {
                    table: schema.name().to_string(),
                    column: fk.column.clone(),
                    detail: format!("key '{}' in {} is still referenced", key, table),
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Column, DataType, ForeignKey};

    async fn store() -> MemoryStore {
        let store = MemoryStore::with_config(
            StoreConfig::default().lock_timeout(Duration::from_millis(200)),
        );
        store
            .create_table(
                TableSchema::new("accounts", "id")
                    .column(Column::new("id", DataType::Text).not_null())
                    .column(Column::new("version", DataType::Integer).not_null())
                    .column(Column::new("owner", DataType::Text).not_null())
                    .unique("owner"),
            )
            .await
            .unwrap();
        store
            .create_table(
                TableSchema::new("entries", "id")
                    .column(Column::new("id", DataType::Text).not_null())
                    .column(Column::new("account_id", DataType::Text))
                    .foreign_key(ForeignKey::new("account_id", "accounts")),
            )
            .await
            .unwrap();
        store
    }

    fn account(id: &str, version: i64, owner: &str) -> Row {
        let mut row = Row::new();
        row.insert("id".into(), Value::from(id));
        row.insert("version".into(), Value::from(version));
        row.insert("owner".into(), Value::from(owner));
        row
    }

    fn entry(id: &str, account_id: &str) -> Row {
        let mut row = Row::new();
        row.insert("id".into(), Value::from(id));
        row.insert("account_id".into(), Value::from(account_id));
        row
    }

    async fn seed(store: &MemoryStore, rows: Vec<Row>) {
        let mut conn = store.connect().await.unwrap();
        conn.begin().await.unwrap();
        for row in rows {
            conn.insert("accounts", row).await.unwrap();
        }
        conn.commit().await.unwrap();
    }

    #[tokio::test]
    async fn test_writes_invisible_until_commit() {
        let store = store().await;
        let mut writer = store.connect().await.unwrap();
        let mut reader = store.connect().await.unwrap();

        writer.begin().await.unwrap();
        writer.insert("accounts", account("a1", 1, "ann")).await.unwrap();

        assert_eq!(writer.count("accounts", &[]).await.unwrap(), 1);
        assert_eq!(reader.count("accounts", &[]).await.unwrap(), 0);

        writer.commit().await.unwrap();
        assert_eq!(reader.count("accounts", &[]).await.unwrap(), 1);
        assert_eq!(store.committed_row_count("accounts").unwrap(), 1);
    }

    #[tokio::test]
    async fn test_rollback_discards_writes() {
        let store = store().await;
        let mut conn = store.connect().await.unwrap();
        conn.begin().await.unwrap();
        conn.insert("accounts", account("a1", 1, "ann")).await.unwrap();
        conn.rollback().await.unwrap();

        assert_eq!(conn.count("accounts", &[]).await.unwrap(), 0);
        assert!(matches!(
            conn.rollback().await,
            Err(StoreError::NoActiveTransaction)
        ));
    }

    #[tokio::test]
    async fn test_repeatable_read_keeps_snapshot() {
        let store = store().await;
        let mut snapshot_reader = store.connect().await.unwrap();
        snapshot_reader
            .set_isolation_level(IsolationLevel::RepeatableRead)
            .await
            .unwrap();
        let mut committed_reader = store.connect().await.unwrap();

        snapshot_reader.begin().await.unwrap();
        committed_reader.begin().await.unwrap();

        seed(&store, vec![account("a1", 1, "ann")]).await;

        assert_eq!(snapshot_reader.count("accounts", &[]).await.unwrap(), 0);
        assert_eq!(committed_reader.count("accounts", &[]).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_isolation_change_rejected_inside_transaction() {
        let store = store().await;
        let mut conn = store.connect().await.unwrap();
        assert_eq!(
            conn.isolation_level().await.unwrap(),
            IsolationLevel::ReadCommitted
        );

        conn.begin().await.unwrap();
        assert!(matches!(
            conn.set_isolation_level(IsolationLevel::RepeatableRead).await,
            Err(StoreError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn test_unique_violation_at_statement_and_commit() {
        let store = store().await;
        seed(&store, vec![account("a1", 1, "ann")]).await;

        let mut conn = store.connect().await.unwrap();
        conn.begin().await.unwrap();
        let err = conn
            .insert("accounts", account("a2", 1, "ann"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::UniqueViolation { ref column, .. } if column == "owner"));
        conn.rollback().await.unwrap();

        // Two transactions racing on the same unique value: the second commit loses.
        let mut first = store.connect().await.unwrap();
        let mut second = store.connect().await.unwrap();
        first.begin().await.unwrap();
        second.begin().await.unwrap();
        first.insert("accounts", account("b1", 1, "bob")).await.unwrap();
        second.insert("accounts", account("b2", 1, "bob")).await.unwrap();
        first.commit().await.unwrap();
        assert!(matches!(
            second.commit().await,
            Err(StoreError::UniqueViolation { .. })
        ));
        assert!(!second.in_transaction());
        assert_eq!(store.committed_row_count("accounts").unwrap(), 2);
    }

    #[tokio::test]
    async fn test_duplicate_primary_key() {
        let store = store().await;
        seed(&store, vec![account("a1", 1, "ann")]).await;

        let mut conn = store.connect().await.unwrap();
        conn.begin().await.unwrap();
        let err = conn
            .insert("accounts", account("a1", 1, "other"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::UniqueViolation { ref column, .. } if column == "id"));
    }

    #[tokio::test]
    async fn test_locked_row_re_evaluated_after_wait() {
        let store = store().await;
        seed(&store, vec![account("a1", 1, "ann")]).await;
        let by_version = [Filter::eq("id", "a1"), Filter::eq("version", 1i64)];

        let mut winner = store.connect().await.unwrap();
        winner.begin().await.unwrap();
        let rows = winner
            .select_for_update("accounts", &by_version)
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);

        let loser_store = store.clone();
        let loser = tokio::spawn(async move {
            let mut conn = loser_store.connect().await.unwrap();
            conn.begin().await.unwrap();
            let rows = conn
                .select_for_update(
                    "accounts",
                    &[Filter::eq("id", "a1"), Filter::eq("version", 1i64)],
                )
                .await
                .unwrap();
            conn.rollback().await.unwrap();
            rows.len()
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        winner
            .update("accounts", "a1", account("a1", 2, "ann"))
            .await
            .unwrap();
        winner.commit().await.unwrap();

        assert_eq!(loser.await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_snapshot_transaction_fails_on_concurrent_update() {
        let store = store().await;
        seed(&store, vec![account("a1", 1, "ann")]).await;

        let mut stale = store.connect().await.unwrap();
        stale
            .set_isolation_level(IsolationLevel::RepeatableRead)
            .await
            .unwrap();
        stale.begin().await.unwrap();

        let mut fresh = store.connect().await.unwrap();
        fresh.begin().await.unwrap();
        fresh
            .update("accounts", "a1", account("a1", 2, "ann"))
            .await
            .unwrap();
        fresh.commit().await.unwrap();

        let err = stale
            .select_for_update("accounts", &[Filter::eq("id", "a1")])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::SerializationFailure(_)));
    }

    #[tokio::test]
    async fn test_lock_timeout_and_release_on_drop() {
        let store = store().await;
        seed(&store, vec![account("a1", 1, "ann")]).await;

        let mut holder = store.connect().await.unwrap();
        holder.begin().await.unwrap();
        holder
            .select_for_update("accounts", &[Filter::eq("id", "a1")])
            .await
            .unwrap();

        let mut waiter = store.connect().await.unwrap();
        waiter.begin().await.unwrap();
        let err = waiter
            .select_for_update("accounts", &[Filter::eq("id", "a1")])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::LockTimeout { .. }));

        drop(holder);
        let rows = waiter
            .select_for_update("accounts", &[Filter::eq("id", "a1")])
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn test_foreign_keys() {
        let store = store().await;
        seed(&store, vec![account("a1", 1, "ann")]).await;

        let mut conn = store.connect().await.unwrap();
        conn.begin().await.unwrap();
        assert!(matches!(
            conn.insert("entries", entry("e0", "missing")).await,
            Err(StoreError::ForeignKeyViolation { .. })
        ));
        conn.insert("entries", entry("e1", "a1")).await.unwrap();
        conn.commit().await.unwrap();

        conn.begin().await.unwrap();
        assert!(matches!(
            conn.delete("accounts", "a1").await,
            Err(StoreError::ForeignKeyViolation { .. })
        ));
        assert_eq!(conn.delete("entries", "e1").await.unwrap(), 1);
        assert_eq!(conn.delete("accounts", "a1").await.unwrap(), 1);
        assert_eq!(conn.delete("accounts", "a1").await.unwrap(), 0);
        conn.commit().await.unwrap();

        assert_eq!(store.committed_row_count("accounts").unwrap(), 0);
    }

    #[tokio::test]
    async fn test_writes_require_transaction() {
        let store = store().await;
        let mut conn = store.connect().await.unwrap();
        assert!(matches!(
            conn.insert("accounts", account("a1", 1, "ann")).await,
            Err(StoreError::NoActiveTransaction)
        ));
        assert!(matches!(
            conn.count("missing", &[]).await,
            Err(StoreError::TableNotFound(_))
        ));
    }
}
