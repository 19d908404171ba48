//! Redis-backed SecretStore adapter (`redis-cache` feature): caches secret
//! material fetched from a backing source, with the same connect-with-retry
//! idiom used by the `nats` EventBus adapter.

#[cfg(feature = "redis-cache")]
use deadpool_redis::{Config as DeadpoolConfig, Pool, Runtime};
use std::time::Duration;

use crate::config::RedisConfig;
use crate::error::Result;

#[cfg(feature = "redis-cache")]
pub use adapter::RedisSecretStore;

/// Create a Redis connection pool with retry logic, per `config.max_retries`.
#[cfg(feature = "redis-cache")]
pub(crate) async fn create_pool(config: &RedisConfig) -> Result<Pool> {
    create_pool_with_retries(config, config.max_retries).await
}

#[cfg(feature = "redis-cache")]
async fn create_pool_with_retries(config: &RedisConfig, max_retries: u32) -> Result<Pool> {
    let mut attempt = 0;
    let base_delay = Duration::from_secs(config.retry_delay_secs);

    loop {
        match try_create_pool(config).await {
            Ok(pool) => {
                if attempt > 0 {
                    tracing::info!("Redis connection established after {} attempt(s)", attempt + 1);
                } else {
                    tracing::info!("Redis connection pool created: max_connections={}", config.max_connections);
                }
                return Ok(pool);
            }
            Err(e) => {
                attempt += 1;

                if attempt > max_retries {
                    tracing::error!("Failed to connect to Redis after {} attempts: {}", max_retries + 1, e);
                    return Err(e);
                }

                let delay_multiplier = 2_u32.pow(attempt.saturating_sub(1));
                let delay = base_delay * delay_multiplier;

                tracing::warn!("Redis connection attempt {} failed: {}. Retrying in {:?}...", attempt, e, delay);
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(feature = "redis-cache")]
async fn try_create_pool(config: &RedisConfig) -> Result<Pool> {
    use crate::error::Error;

    let cfg = DeadpoolConfig::from_url(&config.url);
    let pool = cfg
        .builder()
        .map_err(|e| Error::Internal(format!("failed to build Redis pool: {e}")))?
        .max_size(config.max_connections)
        .runtime(Runtime::Tokio1)
        .build()
        .map_err(|e| Error::Internal(format!("failed to create Redis pool: {e}")))?;

    let conn = pool
        .get()
        .await
        .map_err(|e| Error::Internal(format!("failed to get Redis connection: {e}")))?;
    drop(conn);

    Ok(pool)
}

#[cfg(feature = "redis-cache")]
mod adapter {
    use async_trait::async_trait;
    use deadpool_redis::redis::AsyncCommands;

    use super::{create_pool, Pool};
    use crate::config::{RedisConfig, SecretStoreConfig};
    use crate::error::{Error, Result};
    use crate::ports::SecretStore;

    /// SecretStore backed by Redis, caching resolved secrets for
    /// [`SecretStoreConfig::cache_ttl_seconds`]. Falls through to a
    /// wrapped [`SecretStore`] on cache miss and repopulates the cache.
    pub struct RedisSecretStore {
        pool: Pool,
        ttl_seconds: u64,
        inner: Box<dyn SecretStore>,
    }

    impl RedisSecretStore {
        pub async fn connect(redis_config: &RedisConfig, cache_config: &SecretStoreConfig, inner: Box<dyn SecretStore>) -> Result<Self> {
            Ok(Self {
                pool: create_pool(redis_config).await?,
                ttl_seconds: cache_config.cache_ttl_seconds,
                inner,
            })
        }
    }

    #[async_trait]
    impl SecretStore for RedisSecretStore {
        async fn resolve(&self, secret_ref: &str) -> Result<Vec<u8>> {
            let mut conn = self.pool.get().await.map_err(|e| Error::StoreUnavailable(e.to_string()))?;
            let cache_key = format!("formbridge:secret:{secret_ref}");

            if let Ok(Some(cached)) = conn.get::<_, Option<Vec<u8>>>(&cache_key).await {
                return Ok(cached);
            }

            let secret = self.inner.resolve(secret_ref).await?;
            let _: std::result::Result<(), deadpool_redis::redis::RedisError> =
                conn.set_ex(&cache_key, secret.clone(), self.ttl_seconds).await;

            Ok(secret)
        }

        async fn is_ready(&self) -> bool {
            self.pool.get().await.is_ok()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redis_config_fields() {
        let config = RedisConfig {
            url: "redis://localhost:6379".to_string(),
            max_connections: 20,
            connection_timeout_secs: 10,
            max_retries: 5,
            retry_delay_secs: 2,
        };

        assert_eq!(config.max_connections, 20);
        assert_eq!(config.max_retries, 5);
    }
}
