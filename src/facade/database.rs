use crate::auth::{AuthService, BcryptHasher, PasswordHasher, TokenStore};
use crate::config::AppConfig;
use crate::connection::{ConnectionGate, ConnectionPool};
use crate::core::{PersistError, Result};
use crate::entity::{Entity, Repository};
use crate::models::{Activity, ActivityType, User};
use crate::services::{ActivityService, ActivityTypeService, UserService};
use crate::storage::{MemoryStore, Store};
use crate::transaction::TransactionManager;
use std::sync::Arc;
use tracing::debug;

/// Wired-up service core: store, gate, pool and transaction manager, plus
/// the domain services built on them.
pub struct Database {
    config: AppConfig,
    store: Arc<dyn Store>,
    manager: Arc<TransactionManager>,
    hasher: Arc<dyn PasswordHasher>,
}

/// Registers the table of `T`.
async fn register<T: Entity>(store: &dyn Store) -> Result<()> {
    let schema = T::schema().table_schema();
    debug!(table = schema.name(), "registering table");
    Ok(store.create_table(schema).await?)
}

impl Database {
    /// Opens a database backed by a fresh [`MemoryStore`].
    pub async fn open(config: AppConfig) -> Result<Self> {
        let store = Arc::new(MemoryStore::with_config(config.store.clone()));
        Self::with_store(config, store).await
    }

    /// Opens a database over `store`, creating every entity table in
    /// reference order.
    pub async fn with_store(config: AppConfig, store: Arc<dyn Store>) -> Result<Self> {
        config
            .validate()
            .map_err(|err| PersistError::persistence(format!("invalid configuration: {:#}", err)))?;

        register::<User>(store.as_ref()).await?;
        register::<ActivityType>(store.as_ref()).await?;
        register::<Activity>(store.as_ref()).await?;

        let gate = ConnectionGate::from_config(&config.connection);
        let pool = ConnectionPool::new(config.connection.clone(), Arc::clone(&store)).await?;
        let manager = Arc::new(TransactionManager::new(gate, pool, config.retry.clone()));
        let hasher: Arc<dyn PasswordHasher> = Arc::new(BcryptHasher::new(config.auth.bcrypt_cost));

        Ok(Self {
            config,
            store,
            manager,
            hasher,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn transactions(&self) -> &Arc<TransactionManager> {
        &self.manager
    }

    pub fn repository<T: Entity>(&self) -> Repository<T> {
        Repository::new(Arc::clone(&self.manager))
    }

    pub fn users(&self) -> UserService {
        UserService::new(self.repository(), Arc::clone(&self.hasher))
    }

    pub fn activity_types(&self) -> ActivityTypeService {
        ActivityTypeService::new(self.repository())
    }

    pub fn activities(&self) -> ActivityService {
        ActivityService::new(self.repository(), self.repository(), self.activity_types())
    }

    pub fn auth(&self, tokens: Arc<dyn TokenStore>) -> AuthService {
        AuthService::new(self.users(), tokens, self.config.auth.clone())
    }
}
