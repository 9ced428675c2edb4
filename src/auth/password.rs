use crate::core::PersistError;
use crate::services::ServiceResult;

/// One-way password hashing.
pub trait PasswordHasher: Send + Sync {
    fn hash(&self, password: &str) -> ServiceResult<String>;

    /// `false` for a wrong password and for a malformed hash alike.
    fn verify(&self, password: &str, hash: &str) -> bool;
}

/// bcrypt with a configurable cost factor.
#[derive(Debug, Clone)]
pub struct BcryptHasher {
    cost: u32,
}

impl BcryptHasher {
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }

    pub fn cost(&self) -> u32 {
        self.cost
    }
}

impl Default for BcryptHasher {
    fn default() -> Self {
        Self::new(bcrypt::DEFAULT_COST)
    }
}

impl PasswordHasher for BcryptHasher {
    fn hash(&self, password: &str) -> ServiceResult<String> {
        bcrypt::hash(password, self.cost).map_err(|err| {
            PersistError::persistence(format!("password could not be hashed: {}", err)).into()
        })
    }

    fn verify(&self, password: &str, hash: &str) -> bool {
        bcrypt::verify(password, hash).unwrap_or(false)
    }
}
