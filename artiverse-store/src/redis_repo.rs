use std::time::Duration;

use async_trait::async_trait;
use redis::RedisResult;
use tracing::{info, warn};
use uuid::Uuid;

use artiverse_core::ratelimit::{RateLimitDecision, RateLimitPolicy, RateLimiter};
use artiverse_core::CoreResult;

/// Sliding log: one sorted-set member per hit, scored by its millisecond
/// timestamp. Returns `{allowed, remaining, retry_after_ms}`.
const SLIDING_LOG: &str = r#"
    local key = KEYS[1]
    local now = tonumber(ARGV[1])
    local window = tonumber(ARGV[2])
    local limit = tonumber(ARGV[3])
    redis.call("ZREMRANGEBYSCORE", key, 0, now - window)
    local count = redis.call("ZCARD", key)
    if count < limit then
        redis.call("ZADD", key, now, ARGV[4])
        redis.call("PEXPIRE", key, window)
        return {1, limit - count - 1, 0}
    end
    local oldest = redis.call("ZRANGE", key, 0, 0, "WITHSCORES")
    local retry = window
    if oldest[2] then
        retry = tonumber(oldest[2]) + window - now
    end
    return {0, 0, retry}
"#;

/// Shared limiter state for multi-instance deployments
#[derive(Clone)]
pub struct RedisClient {
    client: redis::Client,
}

impl RedisClient {
    pub async fn new(connection_string: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        let mut conn = client.get_multiplexed_async_connection().await?;
        redis::cmd("PING").query_async::<()>(&mut conn).await?;
        info!("Connected to Redis");
        Ok(Self { client })
    }

    async fn hit(&self, key: &str, policy: &RateLimitPolicy) -> RedisResult<(bool, u32, u64)> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let now_ms = chrono::Utc::now().timestamp_millis();
        let window_ms = policy.window.as_millis() as i64;

        let (allowed, remaining, retry_ms): (i64, i64, i64) = redis::Script::new(SLIDING_LOG)
            .key(format!("ratelimit:{}", key))
            .arg(now_ms)
            .arg(window_ms)
            .arg(policy.limit)
            .arg(format!("{}-{}", now_ms, Uuid::new_v4().simple()))
            .invoke_async(&mut conn)
            .await?;

        Ok((allowed == 1, remaining.max(0) as u32, retry_ms.max(0) as u64))
    }
}

#[async_trait]
impl RateLimiter for RedisClient {
    async fn check(&self, key: &str, policy: &RateLimitPolicy) -> CoreResult<RateLimitDecision> {
        match self.hit(key, policy).await {
            Ok((allowed, remaining, retry_ms)) => Ok(RateLimitDecision {
                allowed,
                limit: policy.limit,
                remaining,
                retry_after: (!allowed).then(|| Duration::from_millis(retry_ms.max(1000))),
            }),
            Err(e) => {
                // Availability over strictness
                warn!("Rate limiter backend unavailable, allowing request: {}", e);
                Ok(RateLimitDecision::fail_open(policy.limit))
            }
        }
    }
}
