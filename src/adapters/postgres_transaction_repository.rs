//! Postgres implementation of TransactionRepository.

use async_trait::async_trait;
use sqlx::PgPool;

use crate::domain::Transaction;
use crate::ports::{RepositoryError, RepositoryResult, TransactionRepository};

const SELECT_COLUMNS: &str = r#"
    transaction_id, type, account_id, user_id, gateway, amount, currency,
    created_at, updated_at, status, retry_count, client_callback
"#;

/// Postgres-backed transaction repository.
#[derive(Clone)]
pub struct PostgresTransactionRepository {
    pool: PgPool,
}

impl PostgresTransactionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TransactionRepository for PostgresTransactionRepository {
    async fn insert(&self, tx: &Transaction) -> RepositoryResult<Transaction> {
        let query = format!(
            r#"
            INSERT INTO transactions (
                transaction_id, type, account_id, user_id, gateway, amount, currency,
                created_at, updated_at, status, retry_count, client_callback
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING {}
            "#,
            SELECT_COLUMNS
        );

        let row = sqlx::query_as::<_, TransactionRow>(&query)
            .bind(&tx.id)
            .bind(tx.transaction_type.as_str())
            .bind(&tx.account_id)
            .bind(&tx.user_id)
            .bind(&tx.gateway)
            .bind(&tx.amount)
            .bind(&tx.currency)
            .bind(tx.created_at)
            .bind(tx.updated_at)
            .bind(tx.status.as_str())
            .bind(retry_count_to_db(tx.retry_count)?)
            .bind(&tx.client_callback)
            .fetch_one(&self.pool)
            .await
            .map_err(RepositoryError::from)?;

        row.into_domain()
    }

    async fn get_by_id(&self, id: &str) -> RepositoryResult<Transaction> {
        let query = format!(
            "SELECT {} FROM transactions WHERE transaction_id = $1",
            SELECT_COLUMNS
        );

        let row = sqlx::query_as::<_, TransactionRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(RepositoryError::from)?;

        row.map(|r| r.into_domain())
            .unwrap_or_else(|| Err(RepositoryError::NotFound(id.to_string())))
    }

    async fn update(&self, tx: &Transaction) -> RepositoryResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE transactions
            SET status = $2, retry_count = $3, updated_at = $4
            WHERE transaction_id = $1
            "#,
        )
        .bind(&tx.id)
        .bind(tx.status.as_str())
        .bind(retry_count_to_db(tx.retry_count)?)
        .bind(tx.updated_at)
        .execute(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(tx.id.clone()));
        }

        Ok(())
    }
}

fn retry_count_to_db(count: u32) -> RepositoryResult<i32> {
    i32::try_from(count)
        .map_err(|_| RepositoryError::InvalidRecord(format!("retry_count {} out of range", count)))
}

/// Internal row type for SQLx. Not exposed outside the adapter.
#[derive(Debug, sqlx::FromRow)]
struct TransactionRow {
    transaction_id: String,
    #[sqlx(rename = "type")]
    transaction_type: String,
    account_id: String,
    user_id: String,
    gateway: String,
    amount: bigdecimal::BigDecimal,
    currency: String,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: Option<chrono::DateTime<chrono::Utc>>,
    status: String,
    retry_count: i32,
    client_callback: Option<String>,
}

impl TransactionRow {
    fn into_domain(self) -> RepositoryResult<Transaction> {
        let transaction_type = self
            .transaction_type
            .parse()
            .map_err(RepositoryError::InvalidRecord)?;
        let status = self.status.parse().map_err(RepositoryError::InvalidRecord)?;
        let retry_count = u32::try_from(self.retry_count).map_err(|_| {
            RepositoryError::InvalidRecord(format!("negative retry_count {}", self.retry_count))
        })?;

        Ok(Transaction {
            id: self.transaction_id,
            transaction_type,
            account_id: self.account_id,
            user_id: self.user_id,
            gateway: self.gateway,
            amount: self.amount,
            currency: self.currency,
            created_at: self.created_at,
            updated_at: self.updated_at,
            status,
            retry_count,
            client_callback: self.client_callback,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{TransactionStatus, TransactionType};
    use chrono::Utc;

    fn row(status: &str, retry_count: i32) -> TransactionRow {
        TransactionRow {
            transaction_id: "t1".to_string(),
            transaction_type: "deposit".to_string(),
            account_id: "acc".to_string(),
            user_id: "u".to_string(),
            gateway: "a".to_string(),
            amount: bigdecimal::BigDecimal::from(100),
            currency: "USD".to_string(),
            created_at: Utc::now(),
            updated_at: None,
            status: status.to_string(),
            retry_count,
            client_callback: Some("http://client/cb".to_string()),
        }
    }

    #[test]
    fn test_row_into_domain() {
        let tx = row("processing", 2).into_domain().unwrap();
        assert_eq!(tx.id, "t1");
        assert_eq!(tx.transaction_type, TransactionType::Deposit);
        assert_eq!(tx.status, TransactionStatus::Processing);
        assert_eq!(tx.retry_count, 2);
    }

    #[test]
    fn test_row_with_unknown_status_is_rejected() {
        let err = row("settled", 0).into_domain().unwrap_err();
        assert!(matches!(err, RepositoryError::InvalidRecord(_)));
    }

    #[test]
    fn test_row_with_negative_retry_count_is_rejected() {
        let err = row("pending", -1).into_domain().unwrap_err();
        assert!(matches!(err, RepositoryError::InvalidRecord(_)));
    }
}
