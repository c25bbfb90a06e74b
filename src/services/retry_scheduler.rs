use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::domain::Transaction;
use crate::queue::{publish_json, MessageBus};

/// `base * 2^attempt`, saturating instead of overflowing.
pub fn next_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt))
}

/// Decides whether a failed attempt is retried and re-publishes it after a backoff.
#[derive(Clone)]
pub struct RetryScheduler {
    bus: Arc<dyn MessageBus>,
    topic: String,
    base: Duration,
    max_retries: u32,
}

impl RetryScheduler {
    pub fn new(
        bus: Arc<dyn MessageBus>,
        topic: impl Into<String>,
        base: Duration,
        max_retries: u32,
    ) -> Self {
        Self {
            bus,
            topic: topic.into(),
            base,
            max_retries,
        }
    }

    pub fn next_delay(&self, attempt: u32) -> Duration {
        next_delay(self.base, attempt)
    }

    pub fn should_retry(&self, retry_count: u32) -> bool {
        retry_count < self.max_retries
    }

    /// Publishes `tx` to the transaction topic once the backoff for `attempt`
    /// has elapsed. Returns immediately.
    pub fn schedule(&self, tx: Transaction, attempt: u32) -> JoinHandle<()> {
        let delay = self.next_delay(attempt);
        let bus = self.bus.clone();
        let topic = self.topic.clone();

        info!(
            "Scheduling retry {} for transaction {} in {:?}",
            tx.retry_count, tx.id, delay
        );

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            match publish_json(bus.as_ref(), &topic, &tx).await {
                Ok(()) => info!("Re-published transaction {} to {}", tx.id, topic),
                Err(e) => error!("Failed to re-publish transaction {}: {}", tx.id, e),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TransactionType;
    use crate::queue::InMemoryBus;
    use bigdecimal::BigDecimal;

    #[test]
    fn test_backoff_doubles_per_attempt() {
        let base = Duration::from_secs(1);
        let delays: Vec<u64> = (0..5).map(|a| next_delay(base, a).as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 16]);
    }

    #[test]
    fn test_backoff_saturates() {
        assert_eq!(next_delay(Duration::from_secs(1), 200), Duration::from_secs(u64::from(u32::MAX)));
    }

    #[test]
    fn test_should_retry_below_max() {
        let scheduler = RetryScheduler::new(
            Arc::new(InMemoryBus::new()),
            "transactions",
            Duration::from_secs(1),
            4,
        );
        assert!(scheduler.should_retry(1));
        assert!(scheduler.should_retry(3));
        assert!(!scheduler.should_retry(4));
        assert!(!scheduler.should_retry(5));
    }

    #[tokio::test]
    async fn test_schedule_publishes_after_delay() {
        let bus = InMemoryBus::new();
        let scheduler = RetryScheduler::new(
            Arc::new(bus.clone()),
            "transactions",
            Duration::from_millis(20),
            4,
        );
        let tx = Transaction::new(
            TransactionType::Deposit,
            "acc-1".to_string(),
            "user-1".to_string(),
            "a".to_string(),
            BigDecimal::from(10),
            "USD".to_string(),
            None,
        );

        let handle = scheduler.schedule(tx.clone(), 1);
        assert_eq!(bus.published_count("transactions"), 0);

        handle.await.unwrap();
        let published = bus.published("transactions");
        assert_eq!(published.len(), 1);
        let republished: Transaction = serde_json::from_slice(&published[0]).unwrap();
        assert_eq!(republished.id, tx.id);
    }
}
