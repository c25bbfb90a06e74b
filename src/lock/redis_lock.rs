use async_trait::async_trait;
use redis::Script;
use tokio::time::{sleep, Instant};

use super::{DistributedLock, LockError, LockGuard, LockSettings};

const LOCK_PREFIX: &str = "lock:";

// Deletes the key only if it still carries our token.
const RELEASE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

/// Single-instance Redis lock: `SET NX PX` to take, compare-and-delete to give back.
#[derive(Clone)]
pub struct RedisLock {
    redis_client: redis::Client,
    settings: LockSettings,
}

impl RedisLock {
    pub fn new(redis_url: &str, settings: LockSettings) -> anyhow::Result<Self> {
        let redis_client = redis::Client::open(redis_url)?;
        Ok(Self {
            redis_client,
            settings,
        })
    }

    fn redis_key(key: &str) -> String {
        format!("{}{}", LOCK_PREFIX, key)
    }
}

#[async_trait]
impl DistributedLock for RedisLock {
    async fn acquire(&self, key: &str) -> Result<LockGuard, LockError> {
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
        let guard = LockGuard::new(key.to_string());
        let redis_key = Self::redis_key(key);
        let ttl_ms = self.settings.ttl.as_millis() as u64;
        let deadline = Instant::now() + self.settings.acquire_timeout;

        loop {
            let acquired: Option<String> = redis::cmd("SET")
                .arg(&redis_key)
                .arg(guard.token())
                .arg("NX")
                .arg("PX")
                .arg(ttl_ms)
                .query_async(&mut conn)
                .await?;

            if acquired.is_some() {
                tracing::debug!("Acquired lock {}", key);
                return Ok(guard);
            }

            if Instant::now() + self.settings.retry_delay > deadline {
                return Err(LockError::Timeout(key.to_string()));
            }
            sleep(self.settings.retry_delay).await;
        }
    }

    async fn release(&self, guard: LockGuard) -> Result<(), LockError> {
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
        let deleted: i32 = Script::new(RELEASE_SCRIPT)
            .key(Self::redis_key(guard.key()))
            .arg(guard.token())
            .invoke_async(&mut conn)
            .await?;

        if deleted == 0 {
            return Err(LockError::NotHeld(guard.key().to_string()));
        }
        tracing::debug!("Released lock {}", guard.key());
        Ok(())
    }
}
