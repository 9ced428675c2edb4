use crate::auth::AuthConfig;
use crate::connection::ConnectionConfig;
use crate::storage::StoreConfig;
use crate::transaction::RetryPolicy;
use anyhow::{Context, bail};
use std::str::FromStr;
use std::time::Duration;

/// Every tunable of the service, passed explicitly to [`crate::facade::Database`].
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub connection: ConnectionConfig,
    pub retry: RetryPolicy,
    pub store: StoreConfig,
    pub auth: AuthConfig,
}

/// Parsed value of `name`, or `None` when the variable is unset.
fn env_value<T>(name: &str) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("invalid value {:?} for {}", raw, name)),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(err).with_context(|| format!("cannot read {}", name)),
    }
}

impl AppConfig {
    /// Defaults overridden by any `AT_*` environment variables that are set.
    pub fn from_env() -> anyhow::Result<Self> {
        let mut config = Self::default();

        if let Some(capacity) = env_value::<usize>("AT_GATE_CAPACITY")? {
            config.connection = config.connection.max_connections(capacity);
        }
        if let Some(attempts) = env_value::<u32>("AT_GATE_ATTEMPTS")? {
            config.connection = config.connection.acquire_attempts(attempts);
        }
        if let Some(ms) = env_value::<u64>("AT_GATE_RETRY_DELAY_MS")? {
            config.connection = config
                .connection
                .acquire_retry_delay(Duration::from_millis(ms));
        }
        if let Some(count) = env_value::<u32>("AT_TX_RETRY_COUNT")? {
            config.retry.max_attempts = count;
        }
        if let Some(ms) = env_value::<u64>("AT_TX_BACKOFF_MS")? {
            config.retry.backoff_step = Duration::from_millis(ms);
        }
        if let Some(ms) = env_value::<u64>("AT_LOCK_TIMEOUT_MS")? {
            config.store = config.store.lock_timeout(Duration::from_millis(ms));
        }
        if let Some(minutes) = env_value::<u64>("AT_ACCESS_TOKEN_TTL_MINUTES")? {
            let ttl = scaled_secs("AT_ACCESS_TOKEN_TTL_MINUTES", minutes, 60)?;
            config.auth = config.auth.access_ttl(ttl);
        }
        if let Some(days) = env_value::<u64>("AT_REFRESH_TOKEN_TTL_DAYS")? {
            let ttl = scaled_secs("AT_REFRESH_TOKEN_TTL_DAYS", days, 24 * 60 * 60)?;
            config.auth = config.auth.refresh_ttl(ttl);
        }
        if let Some(cost) = env_value::<u32>("AT_BCRYPT_COST")? {
            config.auth = config.auth.bcrypt_cost(cost);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if let Err(reason) = self.connection.validate() {
            bail!("connection settings: {}", reason);
        }
        if self.retry.max_attempts == 0 {
            bail!("retry count must be at least 1");
        }
        if !(4..=31).contains(&self.auth.bcrypt_cost) {
            bail!("bcrypt cost must be between 4 and 31");
        }
        Ok(())
    }
}

/// Converts `value` units of `unit_secs` seconds each, rejecting overflow.
fn scaled_secs(name: &str, value: u64, unit_secs: u64) -> anyhow::Result<Duration> {
    match value.checked_mul(unit_secs) {
        Some(secs) => Ok(Duration::from_secs(secs)),
        None => bail!("{} is too large: {}", name, value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.connection.max_connections, 20);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.store.lock_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let mut config = AppConfig::default();
        config.retry.max_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.auth.bcrypt_cost = 2;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_value_parsing() {
        assert_eq!(
            env_value::<u32>("AT_TEST_SURELY_UNSET_VARIABLE").unwrap(),
            None
        );
    }

    #[test]
    fn test_ttl_overflow_rejected() {
        assert_eq!(
            scaled_secs("AT_ACCESS_TOKEN_TTL_MINUTES", 30, 60).unwrap(),
            Duration::from_secs(1800)
        );
        let err = scaled_secs("AT_REFRESH_TOKEN_TTL_DAYS", u64::MAX, 24 * 60 * 60).unwrap_err();
        assert!(err.to_string().contains("AT_REFRESH_TOKEN_TTL_DAYS"));
        assert!(scaled_secs("AT_ACCESS_TOKEN_TTL_MINUTES", u64::MAX / 60 + 1, 60).is_err());
    }
}
