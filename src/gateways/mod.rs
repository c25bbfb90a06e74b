//! Adapters that translate transactions into each payment gateway's wire
//! protocol and decode the asynchronous callbacks they send back.
//!
//! Adapters never touch the ledger. A 2xx reply only means the gateway
//! accepted the request; the final outcome arrives later as a callback.

pub mod gateway_a;
pub mod gateway_b;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use crate::domain::{Transaction, TransactionStatus, TransactionType};
use crate::utils::join_url;

pub use gateway_a::GatewayA;
pub use gateway_b::GatewayB;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("gateway failed with status code {0}")]
    Status(u16),

    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Encode error: {0}")]
    Encode(String),

    #[error("Decode error: {0}")]
    Decode(String),
}

/// Normalized outbound envelope. Gateway A sends it as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayRequest {
    pub transaction_id: String,
    pub amount: f64,
    pub currency: String,
    pub callback_url: String,
    pub account: String,
}

/// Normalized callback result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayResponse {
    pub transaction_id: String,
    pub status: String,
}

impl GatewayResponse {
    /// Maps the gateway's status string onto a terminal transaction status.
    pub fn outcome(&self) -> Result<TransactionStatus, GatewayError> {
        match self.status.trim().to_ascii_lowercase().as_str() {
            "successful" | "success" => Ok(TransactionStatus::Successful),
            "failed" | "failure" | "fail" => Ok(TransactionStatus::Failed),
            other => Err(GatewayError::Decode(format!(
                "unrecognized gateway status '{}'",
                other
            ))),
        }
    }
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn deposit(&self, tx: &Transaction) -> Result<(), GatewayError>;

    async fn withdraw(&self, tx: &Transaction) -> Result<(), GatewayError>;

    fn handle_callback(&self, payload: &[u8]) -> Result<GatewayResponse, GatewayError>;

    /// Routes to `deposit` or `withdraw` by transaction type.
    async fn submit(&self, tx: &Transaction) -> Result<(), GatewayError> {
        match tx.transaction_type {
            TransactionType::Deposit => self.deposit(tx).await,
            TransactionType::Withdraw => self.withdraw(tx).await,
        }
    }
}

/// URL the gateway calls back on: `<prefix>/<transaction id>`.
pub fn callback_url(prefix: &str, transaction_id: &str) -> Result<String, GatewayError> {
    Ok(join_url(prefix, transaction_id)?)
}

/// Gateway id to adapter, fixed at construction time.
#[derive(Clone, Default)]
pub struct GatewayRegistry {
    gateways: HashMap<String, Arc<dyn PaymentGateway>>,
}

impl GatewayRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, id: impl Into<String>, gateway: Arc<dyn PaymentGateway>) -> Self {
        self.gateways.insert(id.into(), gateway);
        self
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn PaymentGateway>> {
        self.gateways.get(id).cloned()
    }

    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.gateways.keys().cloned().collect();
        ids.sort();
        ids
    }
}
