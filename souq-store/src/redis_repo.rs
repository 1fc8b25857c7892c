use std::sync::Arc;

use async_trait::async_trait;
use redis::{AsyncCommands, RedisResult};
use uuid::Uuid;

use souq_catalog::product::{Product, ProductStore};
use souq_core::error::Result;

#[derive(Clone)]
pub struct RedisClient {
    client: redis::Client,
}

impl RedisClient {
    pub async fn new(connection_string: &str) -> std::result::Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        Ok(Self { client })
    }

    /// Short-lived product snapshot used for advisory cart-time checks; the
    /// products table stays authoritative
    pub async fn cache_product(&self, product: &Product, ttl_seconds: u64) -> RedisResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let key = format!("product:{}", product.id);
        let payload = serde_json::to_string(product).unwrap_or_default();
        conn.set_ex(key, payload, ttl_seconds).await
    }

    pub async fn get_cached_product(&self, product_id: Uuid) -> RedisResult<Option<Product>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let key = format!("product:{product_id}");
        let payload: Option<String> = conn.get(key).await?;
        Ok(payload.and_then(|p| serde_json::from_str(&p).ok()))
    }

    /// Drop the snapshot after a stock movement so the next read re-seeds
    /// from the database
    pub async fn invalidate_product(&self, product_id: Uuid) -> RedisResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let key = format!("product:{product_id}");
        conn.del(key).await
    }

    pub async fn check_rate_limit(
        &self,
        key: &str,
        limit: i64,
        window_seconds: i64,
    ) -> RedisResult<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let (count,): (i64,) = redis::pipe()
            .atomic()
            .incr(key, 1)
            .expire(key, window_seconds)
            .query_async(&mut conn)
            .await?;

        Ok(count <= limit)
    }
}

/// Read-through cache in front of the authoritative product store.
///
/// Serves the cart's advisory stock checks; cache failures fall through to
/// the database.
pub struct CachedProductStore {
    inner: Arc<dyn ProductStore>,
    redis: Arc<RedisClient>,
    ttl_seconds: u64,
}

impl CachedProductStore {
    pub fn new(inner: Arc<dyn ProductStore>, redis: Arc<RedisClient>, ttl_seconds: u64) -> Self {
        Self {
            inner,
            redis,
            ttl_seconds,
        }
    }
}

#[async_trait]
impl ProductStore for CachedProductStore {
    async fn get(&self, id: Uuid) -> Result<Option<Product>> {
        match self.redis.get_cached_product(id).await {
            Ok(Some(product)) => return Ok(Some(product)),
            Ok(None) => {}
            Err(e) => tracing::warn!("product cache read failed: {e}"),
        }

        let product = self.inner.get(id).await?;
        if let Some(product) = &product {
            if let Err(e) = self.redis.cache_product(product, self.ttl_seconds).await {
                tracing::warn!("product cache write failed: {e}");
            }
        }
        Ok(product)
    }
}
