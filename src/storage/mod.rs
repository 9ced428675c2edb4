pub mod engine;
pub mod error;
pub mod memory;
pub mod query;
pub mod table;

pub use engine::{Store, StoreConnection};
pub use error::{StoreError, StoreResult};
pub use memory::{MemoryConnection, MemoryStore, StoreConfig};
pub use query::{CompareOp, Filter, Query, SortDirection};
pub use table::TableSchema;
