//! Short-term retention of processed events for replay.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use pulse_config::{CacheBackend, Config, RedisConnection};
use pulse_redis::redis::{self, FromRedisValue};
use pulse_redis::{AsyncRedisPool, RedisClientStats, RedisError};
use tokio::time::Instant;

use crate::constants::CACHE_TTL;
use crate::event::Event;

/// The replay cache could not complete an operation.
///
/// Every variant means the cache is unavailable to the caller.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// The store could not be reached or rejected the command.
    #[error("replay cache unavailable")]
    Unavailable(#[from] RedisError),

    /// The store did not reply in time.
    #[error("replay cache did not reply within {0:?}")]
    Timeout(Duration),

    /// The value could not be serialized.
    #[error("failed to serialize cache value")]
    Serialize(#[from] serde_json::Error),
}

/// A replay cache backed by Redis.
#[derive(Clone, Debug)]
pub struct RedisCache {
    pool: AsyncRedisPool,
    read_timeout: Duration,
    write_timeout: Duration,
}

impl RedisCache {
    /// Creates a cache over an existing pool.
    pub fn new(pool: AsyncRedisPool, read_timeout: Duration, write_timeout: Duration) -> Self {
        Self {
            pool,
            read_timeout,
            write_timeout,
        }
    }

    /// Runs a single command. Acquiring the connection is bounded by the pool timeouts, the
    /// command itself by `timeout`.
    async fn query<T: FromRedisValue>(
        &self,
        cmd: &redis::Cmd,
        timeout: Duration,
    ) -> Result<T, CacheError> {
        let mut connection = self.pool.get_connection().await?;

        match tokio::time::timeout(timeout, cmd.query_async(&mut connection)).await {
            Ok(result) => Ok(result.map_err(RedisError::from)?),
            Err(_) => Err(CacheError::Timeout(timeout)),
        }
    }
}

#[derive(Debug)]
struct MemoryEntry {
    value: String,
    expires_at: Instant,
}

impl MemoryEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// A process-local replay cache for development without Redis.
///
/// Expired entries are treated as absent and purged on the next write.
#[derive(Clone, Debug, Default)]
pub struct MemoryCache {
    entries: Arc<Mutex<HashMap<String, MemoryEntry>>>,
}

impl MemoryCache {
    fn put(&self, key: &str, value: &str, ttl: Duration) {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        entries.retain(|_, entry| entry.is_live(now));
        entries.insert(
            key.to_owned(),
            MemoryEntry {
                value: value.to_owned(),
                expires_at: now + ttl,
            },
        );
    }

    fn get(&self, key: &str) -> Option<String> {
        let now = Instant::now();
        let entries = self.entries.lock();
        entries
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value.clone())
    }

    fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        let entries = self.entries.lock();
        entries
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.expires_at - now)
    }
}

/// Key-value store with per-key expiry retaining a copy of each processed event.
///
/// Values are stored with a time to live, after which they are removed. The backing store may
/// evict values earlier under memory pressure, so a value is not guaranteed to survive its full
/// time to live.
///
/// All operations are asynchronous and suspend only the calling task.
#[derive(Clone, Debug)]
pub enum ReplayCache {
    /// Backed by a Redis server or cluster.
    Redis(RedisCache),
    /// Backed by process memory.
    Memory(MemoryCache),
}

impl ReplayCache {
    /// Creates the replay cache configured in `config`.
    ///
    /// No connection is opened until the first operation.
    pub fn from_config(config: &Config) -> Result<Self, CacheError> {
        if config.cache_backend() == CacheBackend::Memory {
            return Ok(Self::memory());
        }

        let options = config.cache_pool_options();
        let pool = match config.cache_connection() {
            RedisConnection::Cluster(servers) => {
                AsyncRedisPool::cluster(servers.iter().map(String::as_str), &options)?
            }
            RedisConnection::Single(server) => AsyncRedisPool::single(&server, &options)?,
        };

        Ok(Self::Redis(RedisCache::new(
            pool,
            config.cache_read_timeout(),
            config.cache_write_timeout(),
        )))
    }

    /// Creates an empty in-memory cache.
    pub fn memory() -> Self {
        Self::Memory(MemoryCache::default())
    }

    /// Stores `value` under `key`, replacing any existing value, for the duration of `ttl`.
    pub async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        match self {
            Self::Redis(cache) => {
                let mut cmd = redis::cmd("SET");
                cmd.arg(key).arg(value).arg("EX").arg(ttl.as_secs().max(1));
                cache.query::<()>(&cmd, cache.write_timeout).await
            }
            Self::Memory(cache) => {
                cache.put(key, value, ttl);
                Ok(())
            }
        }
    }

    /// Stores the serialized event under its cache key for one hour.
    pub async fn put_event(&self, event: &Event) -> Result<(), CacheError> {
        let value = serde_json::to_string(event)?;
        self.put(&event.cache_key(), &value, CACHE_TTL).await
    }

    /// Checks that the store is reachable.
    pub async fn ping(&self) -> Result<(), CacheError> {
        match self {
            Self::Redis(cache) => {
                cache
                    .query::<String>(&redis::cmd("PING"), cache.read_timeout)
                    .await?;
                Ok(())
            }
            Self::Memory(_) => Ok(()),
        }
    }

    /// Returns the value stored under `key`, if it has not expired.
    pub async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        match self {
            Self::Redis(cache) => {
                let mut cmd = redis::cmd("GET");
                cmd.arg(key);
                cache.query(&cmd, cache.read_timeout).await
            }
            Self::Memory(cache) => Ok(cache.get(key)),
        }
    }

    /// Returns the remaining time to live of `key`, or `None` if there is no expiring value.
    pub async fn ttl(&self, key: &str) -> Result<Option<Duration>, CacheError> {
        match self {
            Self::Redis(cache) => {
                let mut cmd = redis::cmd("TTL");
                cmd.arg(key);
                let secs: i64 = cache.query(&cmd, cache.read_timeout).await?;
                Ok(u64::try_from(secs).ok().map(Duration::from_secs))
            }
            Self::Memory(cache) => Ok(cache.ttl(key)),
        }
    }

    /// Returns connection pool statistics for Redis backed caches.
    pub fn stats(&self) -> Option<RedisClientStats> {
        match self {
            Self::Redis(cache) => Some(cache.pool.stats()),
            Self::Memory(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutils::{test_event, unreachable_cache};

    #[tokio::test(start_paused = true)]
    async fn test_memory_put_get() {
        let cache = ReplayCache::memory();
        cache
            .put("event:1", "{}", Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(cache.get("event:1").await.unwrap().as_deref(), Some("{}"));
        assert_eq!(
            cache.ttl("event:1").await.unwrap(),
            Some(Duration::from_secs(60))
        );
        assert_eq!(cache.get("event:2").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_memory_expiry() {
        let cache = ReplayCache::memory();
        cache
            .put("event:1", "{}", Duration::from_secs(60))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(59)).await;
        assert_eq!(
            cache.ttl("event:1").await.unwrap(),
            Some(Duration::from_secs(1))
        );

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(cache.get("event:1").await.unwrap(), None);
        assert_eq!(cache.ttl("event:1").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_memory_overwrite() {
        let cache = ReplayCache::memory();
        cache.put("k", "a", Duration::from_secs(10)).await.unwrap();
        tokio::time::advance(Duration::from_secs(5)).await;
        cache.put("k", "b", Duration::from_secs(10)).await.unwrap();

        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("b"));
        assert_eq!(cache.ttl("k").await.unwrap(), Some(Duration::from_secs(10)));
    }

    #[tokio::test]
    async fn test_put_event() {
        let event = test_event("abc");

        let cache = ReplayCache::memory();
        cache.put_event(&event).await.unwrap();

        let stored = cache.get("event:abc").await.unwrap().unwrap();
        let stored: Event = serde_json::from_str(&stored).unwrap();
        assert_eq!(stored, event);

        let ttl = cache.ttl("event:abc").await.unwrap().unwrap();
        assert!(ttl <= CACHE_TTL);
    }

    #[tokio::test]
    async fn test_memory_ping() {
        assert!(ReplayCache::memory().ping().await.is_ok());
        assert!(ReplayCache::memory().stats().is_none());
    }

    #[tokio::test]
    async fn test_unreachable_redis() {
        let cache = unreachable_cache();

        let error = cache
            .put("event:1", "{}", Duration::from_secs(60))
            .await
            .unwrap_err();
        assert!(matches!(error, CacheError::Unavailable(_)));
        assert!(cache.ping().await.is_err());
        assert!(cache.stats().is_some());
    }
}
