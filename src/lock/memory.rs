use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

use super::{DistributedLock, LockError, LockGuard, LockSettings};

#[derive(Debug)]
struct Held {
    token: String,
    expires_at: Instant,
}

/// Lock table for a single process. Same contract as `RedisLock`, including TTL expiry.
#[derive(Clone)]
pub struct InMemoryLock {
    held: Arc<Mutex<HashMap<String, Held>>>,
    settings: LockSettings,
}

impl InMemoryLock {
    pub fn new(settings: LockSettings) -> Self {
        Self {
            held: Arc::new(Mutex::new(HashMap::new())),
            settings,
        }
    }

    pub async fn is_locked(&self, key: &str) -> bool {
        let held = self.held.lock().await;
        held.get(key)
            .map(|h| h.expires_at > Instant::now())
            .unwrap_or(false)
    }

    async fn try_acquire(&self, guard: &LockGuard) -> bool {
        let mut held = self.held.lock().await;
        let now = Instant::now();
        match held.get(guard.key()) {
            Some(current) if current.expires_at > now => false,
            _ => {
                held.insert(
                    guard.key().to_string(),
                    Held {
                        token: guard.token().to_string(),
                        expires_at: now + self.settings.ttl,
                    },
                );
                true
            }
        }
    }
}

impl Default for InMemoryLock {
    fn default() -> Self {
        Self::new(LockSettings::default())
    }
}

#[async_trait]
impl DistributedLock for InMemoryLock {
    async fn acquire(&self, key: &str) -> Result<LockGuard, LockError> {
        let guard = LockGuard::new(key.to_string());
        let deadline = Instant::now() + self.settings.acquire_timeout;

        loop {
            if self.try_acquire(&guard).await {
                return Ok(guard);
            }
            if Instant::now() + self.settings.retry_delay > deadline {
                return Err(LockError::Timeout(key.to_string()));
            }
            sleep(self.settings.retry_delay).await;
        }
    }

    async fn release(&self, guard: LockGuard) -> Result<(), LockError> {
        let mut held = self.held.lock().await;
        match held.get(guard.key()) {
            Some(current) if current.token == guard.token() => {
                held.remove(guard.key());
                Ok(())
            }
            _ => Err(LockError::NotHeld(guard.key().to_string())),
        }
    }
}
