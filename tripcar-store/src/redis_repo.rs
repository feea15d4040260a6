use async_trait::async_trait;
use redis::{AsyncCommands, RedisResult};
use std::time::Duration;
use tracing::debug;

use tripcar_core::repository::DedupStore;
use tripcar_core::{CoreError, CoreResult};

#[derive(Clone)]
pub struct RedisClient {
    client: redis::Client,
}

impl RedisClient {
    pub async fn new(connection_string: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        Ok(Self { client })
    }

    pub async fn ping(&self) -> RedisResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        redis::cmd("PING").query_async::<String>(&mut conn).await?;
        Ok(())
    }

    pub async fn check_rate_limit(&self, key: &str, limit: i64, window_seconds: i64) -> RedisResult<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let (count,): (i64,) = redis::pipe()
            .atomic()
            .incr(key, 1)
            .expire(key, window_seconds)
            .ignore()
            .query_async(&mut conn)
            .await?;

        Ok(count <= limit)
    }
}

fn redis_error(err: redis::RedisError) -> CoreError {
    tracing::error!(error = %err, "redis error");
    CoreError::Internal(err.to_string())
}

/// Processed-event records live as `SET NX EX` keys, so expiry is Redis' job.
#[async_trait]
impl DedupStore for RedisClient {
    async fn recall(&self, key: &str) -> CoreResult<Option<String>> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(redis_error)?;
        conn.get(key).await.map_err(redis_error)
    }

    async fn remember(&self, key: &str, value: &str, ttl: Duration) -> CoreResult<String> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(redis_error)?;

        let stored: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async(&mut conn)
            .await
            .map_err(redis_error)?;

        if stored.is_some() {
            return Ok(value.to_string());
        }

        debug!(key, "dedup key already present");
        let existing: Option<String> = conn.get(key).await.map_err(redis_error)?;
        // Expired between SET and GET: ours is as good as any.
        Ok(existing.unwrap_or_else(|| value.to_string()))
    }
}
