//! In-process implementation of TransactionRepository.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::Transaction;
use crate::ports::{RepositoryError, RepositoryResult, TransactionRepository};

/// Map-backed ledger. Clones share the same records.
#[derive(Clone, Default)]
pub struct InMemoryTransactionRepository {
    records: Arc<RwLock<HashMap<String, Transaction>>>,
    writes: Arc<AtomicU64>,
}

impl InMemoryTransactionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful `update` calls so far.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TransactionRepository for InMemoryTransactionRepository {
    async fn insert(&self, tx: &Transaction) -> RepositoryResult<Transaction> {
        let mut records = self.records.write().await;
        if records.contains_key(&tx.id) {
            return Err(RepositoryError::Database(format!(
                "duplicate transaction id {}",
                tx.id
            )));
        }
        records.insert(tx.id.clone(), tx.clone());
        Ok(tx.clone())
    }

    async fn get_by_id(&self, id: &str) -> RepositoryResult<Transaction> {
        self.records
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))
    }

    async fn update(&self, tx: &Transaction) -> RepositoryResult<()> {
        let mut records = self.records.write().await;
        let stored = records
            .get_mut(&tx.id)
            .ok_or_else(|| RepositoryError::NotFound(tx.id.clone()))?;

        stored.status = tx.status;
        stored.retry_count = tx.retry_count;
        stored.updated_at = tx.updated_at;
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{TransactionStatus, TransactionType};
    use bigdecimal::BigDecimal;

    fn sample() -> Transaction {
        Transaction::new(
            TransactionType::Withdraw,
            "acc".to_string(),
            "u".to_string(),
            "b".to_string(),
            BigDecimal::from(5),
            "USD".to_string(),
            None,
        )
        .with_id("m1")
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let repo = InMemoryTransactionRepository::new();
        repo.insert(&sample()).await.unwrap();

        let loaded = repo.get_by_id("m1").await.unwrap();
        assert_eq!(loaded.gateway, "b");
    }

    #[tokio::test]
    async fn test_duplicate_insert_fails() {
        let repo = InMemoryTransactionRepository::new();
        repo.insert(&sample()).await.unwrap();
        assert!(repo.insert(&sample()).await.is_err());
    }

    #[tokio::test]
    async fn test_update_only_touches_mutable_fields() {
        let repo = InMemoryTransactionRepository::new();
        repo.insert(&sample()).await.unwrap();

        let mut changed = sample();
        changed.begin_attempt().unwrap();
        changed.currency = "EUR".to_string();
        repo.update(&changed).await.unwrap();

        let loaded = repo.get_by_id("m1").await.unwrap();
        assert_eq!(loaded.status, TransactionStatus::Processing);
        assert_eq!(loaded.retry_count, 1);
        assert_eq!(loaded.currency, "USD");
        assert_eq!(repo.write_count(), 1);
    }

    #[tokio::test]
    async fn test_missing_records() {
        let repo = InMemoryTransactionRepository::new();
        assert!(matches!(
            repo.get_by_id("nope").await,
            Err(RepositoryError::NotFound(_))
        ));
        assert!(matches!(
            repo.update(&sample()).await,
            Err(RepositoryError::NotFound(_))
        ));
        assert_eq!(repo.write_count(), 0);
    }

    #[tokio::test]
    async fn test_clones_share_write_count() {
        let repo = InMemoryTransactionRepository::new();
        let handle = repo.clone();
        repo.insert(&sample()).await.unwrap();

        let mut changed = sample();
        changed.begin_attempt().unwrap();
        handle.update(&changed).await.unwrap();
        changed.requeue().unwrap();
        repo.update(&changed).await.unwrap();

        assert_eq!(repo.write_count(), 2);
        assert_eq!(handle.write_count(), 2);
    }
}
