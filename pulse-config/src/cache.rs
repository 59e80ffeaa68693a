use std::time::Duration;

use pulse_redis::RedisConfigOptions;
use serde::{Deserialize, Serialize};

/// The storage backing the replay cache.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    /// A Redis server or cluster.
    #[default]
    Redis,
    /// A process-local map, for development without a Redis server.
    Memory,
}

/// Redis connection parameters.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RedisConnection {
    /// Connect to a Redis cluster through the given `redis://` urls.
    Cluster(Vec<String>),
    /// Connect to a single Redis instance at the given `redis://` url.
    Single(String),
}

/// Connection pool and command timeouts for the replay cache.
#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
#[serde(default)]
pub struct CacheOptions {
    /// Maximum number of connections managed by the pool.
    pub max_connections: u32,
    /// Time in seconds to wait for a pooled connection or a new connection.
    pub connection_timeout: u64,
    /// Time in seconds to wait for the reply to a read command.
    pub read_timeout: u64,
    /// Time in seconds to wait for the reply to a write command.
    pub write_timeout: u64,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            max_connections: 24,
            connection_timeout: 5,
            read_timeout: 3,
            write_timeout: 3,
        }
    }
}

fn default_cache_host() -> String {
    "localhost".to_owned()
}

fn default_cache_port() -> u16 {
    6379
}

/// The `cache` section of the configuration file.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct CacheConfig {
    pub backend: CacheBackend,
    pub host: String,
    pub port: u16,
    /// Full `redis://` url, takes precedence over host and port.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Cluster node urls, takes precedence over all other connection settings.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub cluster_nodes: Vec<String>,
    #[serde(flatten)]
    pub options: CacheOptions,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::default(),
            host: default_cache_host(),
            port: default_cache_port(),
            url: None,
            cluster_nodes: Vec::new(),
            options: CacheOptions::default(),
        }
    }
}

impl CacheConfig {
    pub fn connection(&self) -> RedisConnection {
        if !self.cluster_nodes.is_empty() {
            return RedisConnection::Cluster(self.cluster_nodes.clone());
        }

        match self.url {
            Some(ref url) => RedisConnection::Single(url.clone()),
            None => RedisConnection::Single(format!("redis://{}:{}", self.host, self.port)),
        }
    }

    pub fn pool_options(&self) -> RedisConfigOptions {
        RedisConfigOptions {
            max_connections: self.options.max_connections,
            connection_timeout: self.options.connection_timeout,
        }
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.options.read_timeout)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.options.write_timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_connection_from_host() {
        let yaml = r#"
host: redis.internal
port: 6380
"#;
        let config: CacheConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(
            config.connection(),
            RedisConnection::Single("redis://redis.internal:6380".to_owned())
        );
        assert_eq!(config.backend, CacheBackend::Redis);
    }

    #[test]
    fn test_cache_url_takes_precedence() {
        let yaml = r#"
host: ignored
url: redis://10.0.0.1:7000/2
"#;
        let config: CacheConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(
            config.connection(),
            RedisConnection::Single("redis://10.0.0.1:7000/2".to_owned())
        );
    }

    #[test]
    fn test_cache_cluster() {
        let yaml = r#"
cluster_nodes:
  - redis://node1:6379
  - redis://node2:6379
max_connections: 8
read_timeout: 1
"#;
        let config: CacheConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(
            config.connection(),
            RedisConnection::Cluster(vec![
                "redis://node1:6379".to_owned(),
                "redis://node2:6379".to_owned()
            ])
        );
        assert_eq!(config.pool_options().max_connections, 8);
        assert_eq!(config.read_timeout(), Duration::from_secs(1));
        assert_eq!(config.write_timeout(), Duration::from_secs(3));
    }

    #[test]
    fn test_memory_backend() {
        let config: CacheConfig = serde_yaml::from_str("backend: memory").unwrap();
        assert_eq!(config.backend, CacheBackend::Memory);
    }
}
