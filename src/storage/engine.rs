use super::{Filter, Query, StoreResult, TableSchema};
use crate::core::Row;
use crate::transaction::IsolationLevel;
use async_trait::async_trait;

/// Relational storage collaborator.
///
/// The persistence core never talks to a database directly; it goes through a
/// `Store` for table registration and connections, and through
/// [`StoreConnection`] for everything transactional.
#[async_trait]
pub trait Store: Send + Sync {
    /// Registers a table. Fails with `TableExists` on a duplicate name.
    async fn create_table(&self, schema: TableSchema) -> StoreResult<()>;

    /// Opens a new connection at the store's default isolation level.
    async fn connect(&self) -> StoreResult<Box<dyn StoreConnection>>;
}

/// One transactional connection.
///
/// Reads outside a transaction run in autocommit mode against the latest
/// committed state. Writes and row locks require an active transaction.
#[async_trait]
pub trait StoreConnection: Send {
    fn id(&self) -> u64;

    fn in_transaction(&self) -> bool;

    async fn isolation_level(&mut self) -> StoreResult<IsolationLevel>;

    /// Changes the level used by subsequent transactions. Not allowed while a
    /// transaction is open.
    async fn set_isolation_level(&mut self, level: IsolationLevel) -> StoreResult<()>;

    async fn begin(&mut self) -> StoreResult<()>;

    async fn commit(&mut self) -> StoreResult<()>;

    async fn rollback(&mut self) -> StoreResult<()>;

    async fn select(&mut self, table: &str, query: &Query) -> StoreResult<Vec<Row>>;

    async fn count(&mut self, table: &str, filters: &[Filter]) -> StoreResult<u64>;

    /// `SELECT ... WHERE filters FOR UPDATE`: locks every matching row until the
    /// transaction ends and returns the rows that still match once locked.
    async fn select_for_update(&mut self, table: &str, filters: &[Filter])
    -> StoreResult<Vec<Row>>;

    async fn insert(&mut self, table: &str, row: Row) -> StoreResult<()>;

    /// Replaces the row stored under `key`. Returns the number of rows written.
    async fn update(&mut self, table: &str, key: &str, row: Row) -> StoreResult<u64>;

    /// Returns the number of rows removed.
    async fn delete(&mut self, table: &str, key: &str) -> StoreResult<u64>;
}
