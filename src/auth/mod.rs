// ============================================================================
// Authentication
// ============================================================================
//
// Password hashing, opaque bearer tokens and the login / refresh flow. Issued
// tokens live in an injected `TokenStore`; nothing here is process-global.
//
// ============================================================================

pub mod password;
pub mod token_store;

pub use password::{BcryptHasher, PasswordHasher};
pub use token_store::{MemoryTokenStore, TokenStore};

use crate::models::User;
use crate::services::{ServiceError, ServiceResult, UserService};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    pub bcrypt_cost: u32,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            access_ttl: Duration::from_secs(30 * 60),
            refresh_ttl: Duration::from_secs(7 * 24 * 60 * 60),
            bcrypt_cost: bcrypt::DEFAULT_COST,
        }
    }
}

impl AuthConfig {
    pub fn access_ttl(mut self, ttl: Duration) -> Self {
        self.access_ttl = ttl;
        self
    }

    pub fn refresh_ttl(mut self, ttl: Duration) -> Self {
        self.refresh_ttl = ttl;
        self
    }

    pub fn bcrypt_cost(mut self, cost: u32) -> Self {
        self.bcrypt_cost = cost;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
}

fn access_key(token: &str) -> String {
    format!("access:{}", token)
}

/// Current refresh token of a user.
fn user_refresh_key(username: &str) -> String {
    format!("refresh:{}", username)
}

/// Owner of a refresh token.
fn refresh_owner_key(token: &str) -> String {
    format!("refresh_token:{}", token)
}

fn new_token() -> String {
    Uuid::new_v4().simple().to_string()
}

#[derive(Clone)]
pub struct AuthService {
    users: UserService,
    tokens: Arc<dyn TokenStore>,
    config: AuthConfig,
}

impl AuthService {
    pub fn new(users: UserService, tokens: Arc<dyn TokenStore>, config: AuthConfig) -> Self {
        Self {
            users,
            tokens,
            config,
        }
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub async fn login(&self, username: &str, password: &str) -> ServiceResult<TokenPair> {
        let user = self.users.authenticate(username, password).await?;
        let pair = self.issue(&user.username).await?;
        info!(user_id = %user.id, "user logged in");
        Ok(pair)
    }

    /// Exchanges the user's current refresh token for a new pair. The
    /// presented token stops working.
    pub async fn refresh(&self, refresh_token: &str) -> ServiceResult<TokenPair> {
        let invalid = || ServiceError::InvalidToken("refresh token is not valid".to_string());

        let username = self
            .tokens
            .get(&refresh_owner_key(refresh_token))
            .await?
            .ok_or_else(invalid)?;
        let current = self.tokens.get(&user_refresh_key(&username)).await?;
        if current.as_deref() != Some(refresh_token) {
            return Err(invalid());
        }
        if self.users.get_by_username(&username).await?.is_none() {
            return Err(invalid());
        }

        let pair = self.issue(&username).await?;
        debug!(username = %username, "refresh token rotated");
        Ok(pair)
    }

    pub async fn current_user(&self, access_token: &str) -> ServiceResult<User> {
        let invalid = || ServiceError::InvalidToken("access token is not valid".to_string());

        let username = self
            .tokens
            .get(&access_key(access_token))
            .await?
            .ok_or_else(invalid)?;
        self.users
            .get_by_username(&username)
            .await?
            .ok_or_else(invalid)
    }

    /// New access and refresh tokens; any earlier refresh token of the user is
    /// revoked.
    async fn issue(&self, username: &str) -> ServiceResult<TokenPair> {
        let access_token = new_token();
        let refresh_token = new_token();

        if let Some(previous) = self.tokens.get(&user_refresh_key(username)).await? {
            self.tokens.delete(&refresh_owner_key(&previous)).await?;
        }

        self.tokens
            .set(&access_key(&access_token), username, self.config.access_ttl)
            .await?;
        self.tokens
            .set(&user_refresh_key(username), &refresh_token, self.config.refresh_ttl)
            .await?;
        self.tokens
            .set(&refresh_owner_key(&refresh_token), username, self.config.refresh_ttl)
            .await?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            token_type: "bearer".to_string(),
        })
    }
}
