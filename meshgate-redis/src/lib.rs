//! Redis window store for `meshgate` (companion crate).
//!
//! Each key is a sorted set of event timestamps (score = Unix millis). One Lua
//! script trims, counts, and conditionally records, so the check is atomic
//! across every process sharing the Redis instance.

use async_trait::async_trait;
use meshgate::rate_limit::{WindowStore, WindowVerdict};
use meshgate::StoreError;
use redis::aio::ConnectionManager;
use redis::{Client, Script};
use std::time::Duration;

const SLIDING_WINDOW_LUA: &str = r#"
local key = KEYS[1]
local now = tonumber(ARGV[1])
local window = tonumber(ARGV[2])
local threshold = tonumber(ARGV[3])

redis.call('ZREMRANGEBYSCORE', key, '-inf', now - window)
local count = redis.call('ZCARD', key)
if count < threshold then
    redis.call('ZADD', key, now, ARGV[4])
    redis.call('PEXPIRE', key, window)
    return {1, count + 1}
end
return {0, count}
"#;

/// Sliding-window store backed by a Redis sorted set per key.
pub struct RedisWindowStore {
    conn: ConnectionManager,
    script: Script,
    key_prefix: String,
}

impl std::fmt::Debug for RedisWindowStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisWindowStore")
            .field("key_prefix", &self.key_prefix)
            .field("conn", &"<redis::aio::ConnectionManager>")
            .finish()
    }
}

impl RedisWindowStore {
    /// Connect to `url`, giving up after `connect_timeout`.
    ///
    /// # Errors
    /// [`StoreError::Backend`] if the URL is invalid, the server is unreachable,
    /// or the timeout elapses.
    pub async fn connect(url: &str, connect_timeout: Duration) -> Result<Self, StoreError> {
        let client = Client::open(url).map_err(|e| StoreError::Backend(e.to_string()))?;
        let conn = tokio::time::timeout(connect_timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| StoreError::Backend("connection timed out".to_string()))?
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        tracing::info!(target: "meshgate::redis", "connected to redis window store");
        Ok(Self::from_manager(conn))
    }

    /// Use an existing connection manager.
    pub fn from_manager(conn: ConnectionManager) -> Self {
        Self { conn, script: Script::new(SLIDING_WINDOW_LUA), key_prefix: String::new() }
    }

    /// Namespace every key as `prefix:key`. Trailing colons are trimmed.
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into().trim().trim_end_matches(':').to_string();
        self
    }

    /// The Redis key holding `key`'s window.
    pub fn redis_key(&self, key: &str) -> String {
        redis_key(&self.key_prefix, key)
    }
}

fn redis_key(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}:{key}")
    }
}

/// Sorted-set members must be unique, or two events in the same millisecond
/// would collapse into one.
fn event_member(now_millis: u64) -> String {
    format!("{}-{}", now_millis, uuid::Uuid::new_v4())
}

fn parse_reply(reply: &[i64]) -> Result<WindowVerdict, StoreError> {
    match reply {
        [allowed @ (0 | 1), count] => {
            let in_window = u32::try_from(*count)
                .map_err(|_| StoreError::Protocol(format!("window count out of range: {count}")))?;
            Ok(WindowVerdict { allowed: *allowed == 1, in_window })
        }
        other => Err(StoreError::Protocol(format!("expected [allowed, count], got {other:?}"))),
    }
}

#[async_trait]
impl WindowStore for RedisWindowStore {
    async fn evaluate_window(
        &self,
        key: &str,
        window: Duration,
        threshold: u32,
        now_millis: u64,
    ) -> Result<WindowVerdict, StoreError> {
        let redis_key = self.redis_key(key);
        let window_ms = u64::try_from(window.as_millis()).unwrap_or(u64::MAX);
        let mut conn = self.conn.clone();

        let reply: Vec<i64> = self
            .script
            .key(&redis_key)
            .arg(now_millis)
            .arg(window_ms)
            .arg(threshold)
            .arg(event_member(now_millis))
            .invoke_async(&mut conn)
            .await
            .map_err(|e| {
                tracing::warn!(
                    target: "meshgate::redis",
                    key = %redis_key,
                    error = %e,
                    "sliding window script failed"
                );
                StoreError::Backend(e.to_string())
            })?;

        parse_reply(&reply)
    }
}
