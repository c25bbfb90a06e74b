//! Transaction domain entity.
//! Framework-agnostic representation of a deposit or withdrawal and the
//! lifecycle rules that govern its status.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Deposit,
    Withdraw,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Deposit => "deposit",
            TransactionType::Withdraw => "withdraw",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deposit" => Ok(TransactionType::Deposit),
            "withdraw" => Ok(TransactionType::Withdraw),
            other => Err(format!("unknown transaction type: {}", other)),
        }
    }
}

/// ```text
/// pending -> processing -> (pending | successful | failed)
/// ```
/// `successful` and `failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Processing,
    Successful,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Processing => "processing",
            TransactionStatus::Successful => "successful",
            TransactionStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TransactionStatus::Successful | TransactionStatus::Failed)
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TransactionStatus::Pending),
            "processing" => Ok(TransactionStatus::Processing),
            "successful" => Ok(TransactionStatus::Successful),
            "failed" => Ok(TransactionStatus::Failed),
            other => Err(format!("unknown transaction status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition for {id}: {from} -> {to}")]
pub struct TransitionError {
    pub id: String,
    pub from: TransactionStatus,
    pub to: TransactionStatus,
}

/// Domain entity representing a transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(rename = "transaction_id")]
    pub id: String,
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    pub account_id: String,
    pub user_id: String,
    #[serde(alias = "gate_way")]
    pub gateway: String,
    pub amount: BigDecimal,
    pub currency: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    pub status: TransactionStatus,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_callback: Option<String>,
}

impl Transaction {
    pub fn new(
        transaction_type: TransactionType,
        account_id: String,
        user_id: String,
        gateway: String,
        amount: BigDecimal,
        currency: String,
        client_callback: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            transaction_type,
            account_id,
            user_id,
            gateway,
            amount,
            currency,
            created_at: Utc::now(),
            updated_at: None,
            status: TransactionStatus::Pending,
            retry_count: 0,
            client_callback,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Moves a pending transaction into `processing` and counts the attempt.
    pub fn begin_attempt(&mut self) -> Result<(), TransitionError> {
        self.transition(TransactionStatus::Pending, TransactionStatus::Processing)?;
        self.retry_count += 1;
        Ok(())
    }

    /// Returns a processing transaction to `pending` so it can be redelivered.
    pub fn requeue(&mut self) -> Result<(), TransitionError> {
        self.transition(TransactionStatus::Processing, TransactionStatus::Pending)
    }

    /// Gives up on a processing transaction.
    pub fn fail(&mut self) -> Result<(), TransitionError> {
        self.transition(TransactionStatus::Processing, TransactionStatus::Failed)
    }

    /// Applies the gateway-confirmed outcome. Any non-terminal status may be
    /// settled; a terminal one never changes again.
    pub fn settle(&mut self, outcome: TransactionStatus) -> Result<(), TransitionError> {
        if self.status.is_terminal() || !outcome.is_terminal() {
            return Err(self.invalid(outcome));
        }
        self.status = outcome;
        self.updated_at = Some(Utc::now());
        Ok(())
    }

    fn transition(
        &mut self,
        expected: TransactionStatus,
        next: TransactionStatus,
    ) -> Result<(), TransitionError> {
        if self.status != expected {
            return Err(self.invalid(next));
        }
        self.status = next;
        self.updated_at = Some(Utc::now());
        Ok(())
    }

    fn invalid(&self, to: TransactionStatus) -> TransitionError {
        TransitionError {
            id: self.id.clone(),
            from: self.status,
            to,
        }
    }
}
