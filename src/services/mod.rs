pub mod callback_correlator;
pub mod callback_dispatcher;
pub mod retry_scheduler;
pub mod transaction_processor;

pub use callback_correlator::{CallbackCorrelator, CallbackEnvelope, CorrelationOutcome};
pub use callback_dispatcher::{CallbackDispatcher, DispatchOutcome, PaymentResponse};
pub use retry_scheduler::RetryScheduler;
pub use transaction_processor::{AttemptResult, ProcessOutcome, TransactionProcessor};

use tracing::warn;

use crate::domain::Transaction;
use crate::error::ProcessingError;
use crate::lock::{transaction_lock_key, DistributedLock};
use crate::ports::TransactionRepository;

/// Reloads the transaction under its lock, lets `apply` mutate it and persists
/// the result. `apply` returns false to leave the record untouched, in which
/// case `Ok(None)` is returned and nothing is written.
pub(crate) async fn update_under_lock<F>(
    repository: &dyn TransactionRepository,
    lock: &dyn DistributedLock,
    transaction_id: &str,
    apply: F,
) -> Result<Option<Transaction>, ProcessingError>
where
    F: FnOnce(&mut Transaction) -> bool + Send,
{
    let guard = lock.acquire(&transaction_lock_key(transaction_id)).await?;

    let result = reload_and_apply(repository, transaction_id, apply).await;

    if let Err(e) = lock.release(guard).await {
        warn!("Failed to release lock for transaction {}: {}", transaction_id, e);
    }
    result
}

async fn reload_and_apply<F>(
    repository: &dyn TransactionRepository,
    transaction_id: &str,
    apply: F,
) -> Result<Option<Transaction>, ProcessingError>
where
    F: FnOnce(&mut Transaction) -> bool + Send,
{
    let mut tx = repository.get_by_id(transaction_id).await?;
    if !apply(&mut tx) {
        return Ok(None);
    }
    repository.update(&tx).await?;
    Ok(Some(tx))
}
