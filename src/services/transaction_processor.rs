use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::retry_scheduler::RetryScheduler;
use super::update_under_lock;
use crate::domain::{Transaction, TransactionStatus};
use crate::error::ProcessingError;
use crate::gateways::{GatewayError, GatewayRegistry, PaymentGateway};
use crate::lock::DistributedLock;
use crate::ports::TransactionRepository;
use crate::queue::{Delivery, MessageHandler};
use crate::resilience::{BreakerError, CircuitBreakerRegistry};

/// What `process` did with a message.
#[derive(Debug)]
pub enum ProcessOutcome {
    /// The transaction was not pending; nothing was touched.
    Skipped,
    /// The gateway call is running in the background.
    Dispatched(JoinHandle<AttemptResult>),
}

/// How a background gateway attempt ended.
#[derive(Debug)]
pub enum AttemptResult {
    /// Accepted by the gateway; the outcome arrives as a callback.
    Accepted,
    /// Put back to pending; the handle resolves once it is re-published.
    Requeued(JoinHandle<()>),
    /// Retries exhausted.
    Failed,
    /// The failure could not be recorded, or the transaction moved on meanwhile.
    Abandoned,
}

#[derive(Deserialize)]
struct TransactionRef {
    #[serde(rename = "transaction_id")]
    id: String,
}

#[derive(Clone)]
pub struct TransactionProcessor {
    repository: Arc<dyn TransactionRepository>,
    lock: Arc<dyn DistributedLock>,
    gateways: GatewayRegistry,
    breakers: Arc<CircuitBreakerRegistry>,
    retry: RetryScheduler,
}

impl TransactionProcessor {
    pub fn new(
        repository: Arc<dyn TransactionRepository>,
        lock: Arc<dyn DistributedLock>,
        gateways: GatewayRegistry,
        breakers: Arc<CircuitBreakerRegistry>,
        retry: RetryScheduler,
    ) -> Self {
        Self {
            repository,
            lock,
            gateways,
            breakers,
            retry,
        }
    }

    /// Advances a pending transaction to processing and submits it to its
    /// gateway without waiting for the gateway call.
    pub async fn process(&self, transaction_id: &str) -> Result<ProcessOutcome, ProcessingError> {
        let current = self.repository.get_by_id(transaction_id).await?;
        if current.status != TransactionStatus::Pending {
            debug!(
                "Transaction {} is {}, skipping",
                transaction_id, current.status
            );
            return Ok(ProcessOutcome::Skipped);
        }

        let gateway = self
            .gateways
            .get(&current.gateway)
            .ok_or_else(|| ProcessingError::UnknownGateway(current.gateway.clone()))?;

        let begun = update_under_lock(
            self.repository.as_ref(),
            self.lock.as_ref(),
            transaction_id,
            |tx| tx.begin_attempt().is_ok(),
        )
        .await?;

        let Some(tx) = begun else {
            debug!("Transaction {} left pending before it was locked", transaction_id);
            return Ok(ProcessOutcome::Skipped);
        };

        info!(
            "Processing transaction {} attempt {} via gateway {}",
            tx.id, tx.retry_count, tx.gateway
        );

        let processor = self.clone();
        let handle = tokio::spawn(async move { processor.attempt(gateway, tx).await });
        Ok(ProcessOutcome::Dispatched(handle))
    }

    async fn attempt(self, gateway: Arc<dyn PaymentGateway>, tx: Transaction) -> AttemptResult {
        let transaction_id = tx.id.clone();
        let destination = tx.gateway.clone();

        let command = async move { gateway.submit(&tx).await };
        let fallback_id = transaction_id.clone();
        let accepted = self
            .breakers
            .run(&destination, command, |e: BreakerError<GatewayError>| async move {
                warn!("Gateway call for transaction {} failed: {}", fallback_id, e);
            })
            .await;

        match accepted {
            Some(()) => {
                info!("Transaction {} awaiting gateway callback", transaction_id);
                AttemptResult::Accepted
            }
            None => self.record_failure(&transaction_id).await,
        }
    }

    async fn record_failure(&self, transaction_id: &str) -> AttemptResult {
        let retry = &self.retry;
        let updated = update_under_lock(
            self.repository.as_ref(),
            self.lock.as_ref(),
            transaction_id,
            |tx| {
                let moved = if retry.should_retry(tx.retry_count) {
                    tx.requeue()
                } else {
                    tx.fail()
                };
                moved.is_ok()
            },
        )
        .await;

        match updated {
            Ok(Some(tx)) if tx.status == TransactionStatus::Pending => {
                let attempt = tx.retry_count.saturating_sub(1);
                AttemptResult::Requeued(self.retry.schedule(tx, attempt))
            }
            Ok(Some(tx)) => {
                warn!(
                    "Transaction {} failed after {} attempts",
                    tx.id, tx.retry_count
                );
                AttemptResult::Failed
            }
            Ok(None) => {
                info!(
                    "Transaction {} is no longer processing, not recording failure",
                    transaction_id
                );
                AttemptResult::Abandoned
            }
            Err(e) => {
                error!(
                    "Could not record gateway failure for transaction {}: {}",
                    transaction_id, e
                );
                AttemptResult::Abandoned
            }
        }
    }
}

#[async_trait]
impl MessageHandler for TransactionProcessor {
    async fn handle(&self, delivery: &Delivery) -> Result<(), ProcessingError> {
        let tx: TransactionRef = serde_json::from_slice(&delivery.payload)
            .map_err(|e| ProcessingError::Malformed(e.to_string()))?;

        self.process(&tx.id).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemoryTransactionRepository;
    use crate::domain::TransactionType;
    use crate::gateways::GatewayResponse;
    use crate::lock::InMemoryLock;
    use crate::queue::InMemoryBus;
    use crate::resilience::BreakerConfig;
    use bigdecimal::BigDecimal;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct StubGateway {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl PaymentGateway for StubGateway {
        async fn deposit(&self, _tx: &Transaction) -> Result<(), GatewayError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(GatewayError::Status(503))
            } else {
                Ok(())
            }
        }

        async fn withdraw(&self, tx: &Transaction) -> Result<(), GatewayError> {
            self.deposit(tx).await
        }

        fn handle_callback(&self, _payload: &[u8]) -> Result<GatewayResponse, GatewayError> {
            Err(GatewayError::Decode("unused".to_string()))
        }
    }

    struct Fixture {
        repository: InMemoryTransactionRepository,
        gateway: Arc<StubGateway>,
        processor: TransactionProcessor,
    }

    fn fixture(fail: bool) -> Fixture {
        let repository = InMemoryTransactionRepository::default();
        let gateway = Arc::new(StubGateway {
            calls: AtomicUsize::new(0),
            fail,
        });
        let bus = Arc::new(InMemoryBus::new());
        let processor = TransactionProcessor::new(
            Arc::new(repository.clone()),
            Arc::new(InMemoryLock::default()),
            GatewayRegistry::new().with("a", gateway.clone()),
            Arc::new(CircuitBreakerRegistry::new(BreakerConfig::default(), ["a"])),
            RetryScheduler::new(bus, "transactions", Duration::from_millis(1), 4),
        );
        Fixture {
            repository,
            gateway,
            processor,
        }
    }

    async fn seed(repository: &InMemoryTransactionRepository, gateway: &str) -> Transaction {
        let tx = Transaction::new(
            TransactionType::Deposit,
            "acc-1".to_string(),
            "user-1".to_string(),
            gateway.to_string(),
            BigDecimal::from(100),
            "USD".to_string(),
            None,
        );
        repository.insert(&tx).await.unwrap()
    }

    #[tokio::test]
    async fn test_accepted_attempt_stays_processing() {
        let f = fixture(false);
        let tx = seed(&f.repository, "a").await;

        let outcome = f.processor.process(&tx.id).await.unwrap();
        let ProcessOutcome::Dispatched(handle) = outcome else {
            panic!("expected dispatch");
        };
        assert!(matches!(handle.await.unwrap(), AttemptResult::Accepted));

        let stored = f.repository.get_by_id(&tx.id).await.unwrap();
        assert_eq!(stored.status, TransactionStatus::Processing);
        assert_eq!(stored.retry_count, 1);
        assert_eq!(f.gateway.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unknown_gateway_is_rejected() {
        let f = fixture(false);
        let tx = seed(&f.repository, "z").await;

        let err = f.processor.process(&tx.id).await.unwrap_err();
        assert!(matches!(err, ProcessingError::UnknownGateway(ref g) if g == "z"));

        let stored = f.repository.get_by_id(&tx.id).await.unwrap();
        assert_eq!(stored.status, TransactionStatus::Pending);
    }

    #[tokio::test]
    async fn test_failed_attempt_is_requeued() {
        let f = fixture(true);
        let tx = seed(&f.repository, "a").await;

        let ProcessOutcome::Dispatched(handle) = f.processor.process(&tx.id).await.unwrap() else {
            panic!("expected dispatch");
        };
        let AttemptResult::Requeued(retry) = handle.await.unwrap() else {
            panic!("expected requeue");
        };
        retry.await.unwrap();

        let stored = f.repository.get_by_id(&tx.id).await.unwrap();
        assert_eq!(stored.status, TransactionStatus::Pending);
        assert_eq!(stored.retry_count, 1);
    }

    #[tokio::test]
    async fn test_missing_transaction_is_not_found() {
        let f = fixture(false);
        let err = f.processor.process("missing").await.unwrap_err();
        assert!(matches!(err, ProcessingError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_handle_rejects_malformed_payload() {
        let f = fixture(false);
        let delivery = Delivery {
            topic: "transactions".to_string(),
            id: "1".to_string(),
            payload: b"not json".to_vec(),
        };
        let err = f.processor.handle(&delivery).await.unwrap_err();
        assert!(matches!(err, ProcessingError::Malformed(_)));
    }
}
