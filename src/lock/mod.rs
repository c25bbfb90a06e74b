//! Per-key mutual exclusion across processes.
//!
//! Every read-modify-write of a transaction's status happens between an
//! `acquire` and a `release` on `transaction:<id>`. Locks expire after their
//! TTL so a crashed holder cannot wedge a transaction forever.

pub mod memory;
pub mod redis_lock;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

pub use memory::InMemoryLock;
pub use redis_lock::RedisLock;

pub const TRANSACTION_DOMAIN: &str = "transaction";

pub fn lock_key(domain: &str, id: &str) -> String {
    format!("{}:{}", domain, id)
}

pub fn transaction_lock_key(id: &str) -> String {
    lock_key(TRANSACTION_DOMAIN, id)
}

#[derive(Error, Debug)]
pub enum LockError {
    #[error("Timed out acquiring lock {0}")]
    Timeout(String),

    #[error("Lock {0} is no longer held by this owner")]
    NotHeld(String),

    #[error("Lock backend error: {0}")]
    Backend(String),
}

impl From<redis::RedisError> for LockError {
    fn from(e: redis::RedisError) -> Self {
        LockError::Backend(e.to_string())
    }
}

/// Proof of ownership returned by `acquire`. The token is unique per
/// acquisition, so a stale guard cannot release someone else's lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockGuard {
    key: String,
    token: String,
}

impl LockGuard {
    pub(crate) fn new(key: String) -> Self {
        Self {
            key,
            token: uuid::Uuid::new_v4().to_string(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn token(&self) -> &str {
        &self.token
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LockSettings {
    /// How long a held lock survives without being released.
    pub ttl: Duration,
    /// How long `acquire` keeps retrying before giving up.
    pub acquire_timeout: Duration,
    pub retry_delay: Duration,
}

impl Default for LockSettings {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(8),
            acquire_timeout: Duration::from_secs(5),
            retry_delay: Duration::from_millis(50),
        }
    }
}

#[async_trait]
pub trait DistributedLock: Send + Sync {
    async fn acquire(&self, key: &str) -> Result<LockGuard, LockError>;

    async fn release(&self, guard: LockGuard) -> Result<(), LockError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_lock_key() {
        assert_eq!(transaction_lock_key("t1"), "transaction:t1");
    }

    #[test]
    fn test_guards_have_distinct_tokens() {
        let a = LockGuard::new("k".to_string());
        let b = LockGuard::new("k".to_string());
        assert_ne!(a.token(), b.token());
        assert_eq!(a.key(), "k");
    }
}
