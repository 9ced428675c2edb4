// ============================================================================
// Activity Tracker Core
// ============================================================================
//
// Optimistic-concurrency persistence for an activity tracking service:
// gated connection acquisition, isolation-controlled transaction scopes with
// conflict retry, a generic entity layer and the domain services on top.
//
// ============================================================================

pub mod auth;
pub mod config;
pub mod connection;
pub mod core;
pub mod entity;
pub mod facade;
pub mod models;
pub mod services;
pub mod storage;
pub mod transaction;

pub use crate::config::AppConfig;
pub use crate::core::{PersistError, Result, Value};
pub use crate::entity::{Entity, EntityRef, Fields, Repository};
pub use crate::facade::Database;
pub use crate::services::{ErrorKind, ServiceError, ServiceResult};
pub use crate::transaction::{IsolationLevel, ScopeOptions, Session, TransactionManager};
