use crate::services::ServiceResult;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

/// Key-value capability with per-entry expiry, used for issued tokens.
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> ServiceResult<()>;

    /// `None` for missing and expired keys.
    async fn get(&self, key: &str) -> ServiceResult<Option<String>>;

    async fn delete(&self, key: &str) -> ServiceResult<()>;
}

/// Process-local [`TokenStore`].
#[derive(Default)]
pub struct MemoryTokenStore {
    entries: RwLock<HashMap<String, (String, Instant)>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Live entries; expired ones are dropped first.
    pub async fn len(&self) -> usize {
        let mut entries = self.entries.write().await;
        let now = Instant::now();
        entries.retain(|_, (_, expires_at)| *expires_at > now);
        entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> ServiceResult<()> {
        let expires_at = Instant::now() + ttl;
        self.entries
            .write()
            .await
            .insert(key.to_string(), (value.to_string(), expires_at));
        Ok(())
    }

    async fn get(&self, key: &str) -> ServiceResult<Option<String>> {
        let mut entries = self.entries.write().await;
        match entries.get(key) {
            Some((value, expires_at)) if *expires_at > Instant::now() => {
                return Ok(Some(value.clone()));
            }
            Some(_) => {}
            None => return Ok(None),
        }
        entries.remove(key);
        Ok(None)
    }

    async fn delete(&self, key: &str) -> ServiceResult<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_delete() {
        let store = MemoryTokenStore::new();
        store.set("refresh:alice", "t1", Duration::from_secs(60)).await.unwrap();

        assert_eq!(store.get("refresh:alice").await.unwrap().as_deref(), Some("t1"));
        store.delete("refresh:alice").await.unwrap();
        assert_eq!(store.get("refresh:alice").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_entries_expire() {
        let store = MemoryTokenStore::new();
        store.set("access:t", "alice", Duration::from_millis(10)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(store.get("access:t").await.unwrap(), None);
        assert!(store.is_empty().await);
    }
}
