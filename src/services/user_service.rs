use super::{ServiceError, ServiceResult};
use crate::auth::PasswordHasher;
use crate::core::PersistError;
use crate::entity::{EntityRef, Fields, Repository};
use crate::fields;
use crate::models::User;
use crate::storage::Filter;
use chrono::Utc;
use lazy_static::lazy_static;
use regex::Regex;
use std::sync::Arc;
use tracing::info;

lazy_static! {
    static ref EMAIL_PATTERN: Regex =
        Regex::new(r"^[a-zA-Z0-9_.+-]+@[a-zA-Z0-9-]+\.[a-zA-Z0-9-.]+$").expect("valid email regex");
}

const MAX_USERNAME_LEN: usize = 20;

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password: String,
    pub is_active: Option<bool>,
    pub is_staff: Option<bool>,
}

impl NewUser {
    pub fn new(
        username: impl Into<String>,
        email: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            email: email.into(),
            password: password.into(),
            is_active: None,
            is_staff: None,
        }
    }
}

/// Partial update of a user; `None` leaves the attribute alone.
#[derive(Debug, Clone, Default)]
pub struct UserUpdate {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub is_active: Option<bool>,
    pub is_staff: Option<bool>,
}

#[derive(Clone)]
pub struct UserService {
    users: Repository<User>,
    hasher: Arc<dyn PasswordHasher>,
}

fn validate_username(username: &str) -> ServiceResult<()> {
    if username.trim().is_empty() {
        return Err(ServiceError::validation("username cannot be empty"));
    }
    if username.chars().count() > MAX_USERNAME_LEN {
        return Err(ServiceError::validation(format!(
            "username too long (max {} characters)",
            MAX_USERNAME_LEN
        )));
    }
    Ok(())
}

fn validate_email(email: &str) -> ServiceResult<()> {
    if !EMAIL_PATTERN.is_match(email) {
        return Err(ServiceError::validation(format!(
            "'{}' is not a valid email address",
            email
        )));
    }
    Ok(())
}

fn validate_password(password: &str) -> ServiceResult<()> {
    if password.is_empty() {
        return Err(ServiceError::validation("password is required"));
    }
    Ok(())
}

/// Unique constraint violations on users surface as duplicates.
fn duplicate_on_integrity(err: PersistError) -> ServiceError {
    match err {
        PersistError::IntegrityViolation(_) => ServiceError::DuplicateUser(
            "email or username is already in use".to_string(),
        ),
        other => other.into(),
    }
}

impl UserService {
    pub fn new(users: Repository<User>, hasher: Arc<dyn PasswordHasher>) -> Self {
        Self { users, hasher }
    }

    /// Registers a user. The email and username pre-checks are best effort;
    /// the unique constraints decide under concurrency.
    pub async fn create_user(&self, new_user: NewUser) -> ServiceResult<User> {
        validate_password(&new_user.password)?;
        validate_username(&new_user.username)?;
        validate_email(&new_user.email)?;

        if self.get_by_email(&new_user.email).await?.is_some() {
            return Err(ServiceError::DuplicateUser(
                "email is already registered".to_string(),
            ));
        }
        if self.get_by_username(&new_user.username).await?.is_some() {
            return Err(ServiceError::DuplicateUser(
                "username is not available".to_string(),
            ));
        }

        let hashed_password = self.hasher.hash(&new_user.password)?;
        let fields = fields! {
            "username" => new_user.username,
            "email" => new_user.email,
            "hashed_password" => hashed_password,
            "is_active" => new_user.is_active.unwrap_or(true),
            "is_staff" => new_user.is_staff.unwrap_or(false),
            "last_login" => Utc::now(),
        };

        let user = self
            .users
            .create(fields)
            .await
            .map_err(duplicate_on_integrity)?;
        info!(user_id = %user.id, username = %user.username, "user created");
        Ok(user)
    }

    pub async fn get_user(&self, user_id: &str) -> ServiceResult<User> {
        Ok(self.users.read_by_id(user_id).await?)
    }

    pub async fn get_by_email(&self, email: &str) -> ServiceResult<Option<User>> {
        if email.is_empty() {
            return Ok(None);
        }
        Ok(self
            .users
            .find_one_by(vec![Filter::eq("email", email)])
            .await?)
    }

    pub async fn get_by_username(&self, username: &str) -> ServiceResult<Option<User>> {
        if username.is_empty() {
            return Ok(None);
        }
        Ok(self
            .users
            .find_one_by(vec![Filter::eq("username", username)])
            .await?)
    }

    pub async fn list_users(
        &self,
        page: Option<i64>,
        page_size: Option<i64>,
    ) -> ServiceResult<(Vec<User>, u64)> {
        Ok(self.users.read_all(page, page_size, Vec::new()).await?)
    }

    pub async fn update_user(&self, user_id: &str, update: UserUpdate) -> ServiceResult<User> {
        let mut fields = Fields::new();
        if let Some(username) = update.username {
            validate_username(&username)?;
            fields.insert("username".into(), username.into());
        }
        if let Some(email) = update.email {
            validate_email(&email)?;
            fields.insert("email".into(), email.into());
        }
        if let Some(password) = update.password {
            validate_password(&password)?;
            fields.insert("hashed_password".into(), self.hasher.hash(&password)?.into());
        }
        if let Some(is_active) = update.is_active {
            fields.insert("is_active".into(), is_active.into());
        }
        if let Some(is_staff) = update.is_staff {
            fields.insert("is_staff".into(), is_staff.into());
        }

        self.users
            .update(user_id, fields)
            .await
            .map_err(duplicate_on_integrity)
    }

    pub async fn delete_user(&self, user_id: &str) -> ServiceResult<()> {
        Ok(self.users.delete(user_id).await?)
    }

    /// Checks the credentials and records the login time.
    pub async fn authenticate(&self, username: &str, password: &str) -> ServiceResult<User> {
        let Some(user) = self.get_by_username(username).await? else {
            return Err(ServiceError::InvalidCredentials);
        };
        if !self.hasher.verify(password, &user.hashed_password) {
            return Err(ServiceError::InvalidCredentials);
        }

        let user = self
            .users
            .update(EntityRef::Id(user.id), fields! { "last_login" => Utc::now() })
            .await?;
        Ok(user)
    }
}
