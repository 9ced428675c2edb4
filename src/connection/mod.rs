pub mod config;
pub mod gate;
pub mod pool;

pub use config::ConnectionConfig;
pub use gate::{ConnectionGate, GatePermit};
pub use pool::{ConnectionPool, PoolGuard, PoolStats};
