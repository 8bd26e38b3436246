// src/cache.rs
//! TTL key/value cache: an external REST cache service in front, an
//! in-process store behind it for when the service is absent or failing.

use crate::core::ServiceClient;
use crate::error::CacheError;
use crate::types::response::CacheRestResponse;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, warn};

const DEFAULT_MAX_ENTRIES: usize = 10_000;
const REST_TIMEOUT: Duration = Duration::from_secs(2);

#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;
    async fn delete(&self, key: &str) -> Result<(), CacheError>;
}

/// In-process store with per-entry expiry
pub struct MemoryCache {
    entries: Mutex<HashMap<String, (String, Instant)>>,
    max_entries: usize,
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_MAX_ENTRIES)
    }
}

impl MemoryCache {
    pub fn with_capacity(max_entries: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            max_entries: max_entries.max(1),
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}

#[async_trait]
impl CacheBackend for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some((value, expires_at)) if *expires_at > Instant::now() => Ok(Some(value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();

        if entries.len() >= self.max_entries && !entries.contains_key(key) {
            entries.retain(|_, (_, expires_at)| *expires_at > now);
        }
        if entries.len() >= self.max_entries && !entries.contains_key(key) {
            // still full of live entries: drop the one closest to expiry
            if let Some(oldest) = entries
                .iter()
                .min_by_key(|(_, (_, expires_at))| *expires_at)
                .map(|(k, _)| k.clone())
            {
                entries.remove(&oldest);
            }
        }

        entries.insert(key.to_string(), (value.to_string(), now + ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.entries.lock().await.remove(key);
        Ok(())
    }
}

/// Redis-over-REST cache service (command arrays POSTed to the base URL)
pub struct RestCache {
    client: ServiceClient,
}

impl RestCache {
    pub fn new(client: ServiceClient) -> Self {
        Self { client }
    }

    async fn command(&self, command: Value) -> Result<Option<Value>, CacheError> {
        let response: CacheRestResponse = self
            .client
            .post_json("", &command, REST_TIMEOUT)
            .await
            .map_err(|e| CacheError::Unavailable(e.to_string()))?;

        if let Some(error) = response.error {
            return Err(CacheError::Unavailable(error));
        }
        Ok(response.result)
    }
}

#[async_trait]
impl CacheBackend for RestCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        match self.command(json!(["GET", key])).await? {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(value)) => Ok(Some(value)),
            Some(other) => Err(CacheError::Decode(format!("unexpected GET result: {}", other))),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let seconds = ttl.as_secs().max(1);
        self.command(json!(["SET", key, value, "EX", seconds])).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.command(json!(["DEL", key])).await?;
        Ok(())
    }
}

/// Cache facade used by the rest of the crate
#[derive(Clone)]
pub struct Cache {
    primary: Option<Arc<dyn CacheBackend>>,
    fallback: Arc<MemoryCache>,
}

impl Default for Cache {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl Cache {
    pub fn in_memory() -> Self {
        Self {
            primary: None,
            fallback: Arc::new(MemoryCache::default()),
        }
    }

    pub fn with_primary(primary: Arc<dyn CacheBackend>) -> Self {
        Self {
            primary: Some(primary),
            fallback: Arc::new(MemoryCache::default()),
        }
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        if let Some(primary) = &self.primary {
            match primary.get(key).await {
                Ok(Some(value)) => return Some(value),
                Ok(None) => {}
                Err(e) => warn!("Primary cache get failed for {}, using fallback: {}", key, e),
            }
        }

        match self.fallback.get(key).await {
            Ok(value) => value,
            Err(e) => {
                debug!("Fallback cache get failed for {}: {}", key, e);
                None
            }
        }
    }

    pub async fn set(&self, key: &str, value: &str, ttl: Duration) {
        if let Some(primary) = &self.primary {
            match primary.set(key, value, ttl).await {
                Ok(()) => return,
                Err(e) => warn!("Primary cache set failed for {}, using fallback: {}", key, e),
            }
        }

        if let Err(e) = self.fallback.set(key, value, ttl).await {
            debug!("Fallback cache set failed for {}: {}", key, e);
        }
    }

    pub async fn delete(&self, key: &str) {
        if let Some(primary) = &self.primary {
            if let Err(e) = primary.delete(key).await {
                warn!("Primary cache delete failed for {}: {}", key, e);
            }
        }
        let _ = self.fallback.delete(key).await;
    }

    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.get(key).await?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                debug!("Discarding undecodable cache entry {}: {}", key, e);
                None
            }
        }
    }

    pub async fn set_json<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        match serde_json::to_string(value) {
            Ok(raw) => self.set(key, &raw, ttl).await,
            Err(e) => debug!("Not caching {}: {}", key, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingBackend;

    #[async_trait]
    impl CacheBackend for FailingBackend {
        async fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
            Err(CacheError::Unavailable("down".to_string()))
        }
        async fn set(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<(), CacheError> {
            Err(CacheError::Unavailable("down".to_string()))
        }
        async fn delete(&self, _key: &str) -> Result<(), CacheError> {
            Err(CacheError::Unavailable("down".to_string()))
        }
    }

    #[tokio::test]
    async fn test_memory_cache_expires_entries() {
        let cache = MemoryCache::default();
        cache.set("a", "1", Duration::from_millis(20)).await.unwrap();
        assert_eq!(cache.get("a").await.unwrap().as_deref(), Some("1"));

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(cache.get("a").await.unwrap(), None);
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test]
    async fn test_memory_cache_respects_capacity() {
        let cache = MemoryCache::with_capacity(2);
        cache.set("a", "1", Duration::from_secs(10)).await.unwrap();
        cache.set("b", "2", Duration::from_secs(20)).await.unwrap();
        cache.set("c", "3", Duration::from_secs(30)).await.unwrap();

        assert_eq!(cache.len().await, 2);
        assert_eq!(cache.get("a").await.unwrap(), None);
        assert_eq!(cache.get("c").await.unwrap().as_deref(), Some("3"));
    }

    #[tokio::test]
    async fn test_facade_falls_back_when_primary_fails() {
        let cache = Cache::with_primary(Arc::new(FailingBackend));
        cache.set("k", "v", Duration::from_secs(60)).await;
        assert_eq!(cache.get("k").await.as_deref(), Some("v"));

        cache.delete("k").await;
        assert_eq!(cache.get("k").await, None);
    }

    #[tokio::test]
    async fn test_json_helpers() {
        let cache = Cache::in_memory();
        cache
            .set_json("path", &"documents/file_1.pdf".to_string(), Duration::from_secs(60))
            .await;
        let path: Option<String> = cache.get_json("path").await;
        assert_eq!(path.as_deref(), Some("documents/file_1.pdf"));

        cache.set("broken", "{not json", Duration::from_secs(60)).await;
        assert_eq!(cache.get_json::<Vec<u8>>("broken").await, None);
    }

    #[tokio::test]
    async fn test_rest_cache_commands() {
        let mut server = mockito::Server::new_async().await;
        let set = server
            .mock("POST", "/")
            .match_header("authorization", "Bearer cache-token")
            .match_body(mockito::Matcher::Json(json!(["SET", "k", "v", "EX", 60])))
            .with_status(200)
            .with_body(r#"{"result": "OK"}"#)
            .create_async()
            .await;
        let get = server
            .mock("POST", "/")
            .match_body(mockito::Matcher::Json(json!(["GET", "k"])))
            .with_status(200)
            .with_body(r#"{"result": "v"}"#)
            .create_async()
            .await;

        let client = ServiceClient::with_client(
            ServiceClient::build_http_client().unwrap(),
            server.url(),
            "cache",
        )
        .with_bearer_token("cache-token");
        let cache = RestCache::new(client);

        cache.set("k", "v", Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("v"));

        set.assert_async().await;
        get.assert_async().await;
    }
}
