use redis::RedisResult;

/// Redis backs request throttling only. Seat inventory is never cached here;
/// the database is the single source of truth for availability.
#[derive(Clone)]
pub struct RedisClient {
    client: redis::Client,
}

impl RedisClient {
    pub fn new(connection_string: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        Ok(Self { client })
    }

    /// Fixed-window counter. `true` while the caller is within `limit` for
    /// the current window.
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

/// Rate-limit bucket for a client and minute.
pub fn rate_limit_key(client: &str, minute: i64) -> String {
    format!("ratelimit:{}:{}", client, minute)
}
