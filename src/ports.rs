//! Ports the pipeline depends on. Adapters live in `crate::adapters`.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::Transaction;

#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("Transaction not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => RepositoryError::NotFound("row not found".to_string()),
            other => RepositoryError::Database(other.to_string()),
        }
    }
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// The ledger: authoritative store of transaction records.
#[async_trait]
pub trait TransactionRepository: Send + Sync {
    async fn insert(&self, tx: &Transaction) -> RepositoryResult<Transaction>;

    async fn get_by_id(&self, id: &str) -> RepositoryResult<Transaction>;

    /// Persists status, retry count and updated-at of an existing record.
    async fn update(&self, tx: &Transaction) -> RepositoryResult<()>;
}
