use async_trait::async_trait;
use bigdecimal::ToPrimitive;
use hmac::{Hmac, Mac};
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::domain::{Transaction, TransactionStatus, TransactionType};
use crate::error::ProcessingError;
use crate::queue::{Delivery, MessageHandler};
use crate::resilience::{BreakerError, CircuitBreakerRegistry};
use crate::utils::extract_host;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "X-Signature";

/// Body POSTed to the client's callback URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentResponse {
    pub transaction_id: String,
    pub amount: f64,
    pub currency: String,
    pub status: TransactionStatus,
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
}

impl TryFrom<&Transaction> for PaymentResponse {
    type Error = ProcessingError;

    fn try_from(tx: &Transaction) -> Result<Self, Self::Error> {
        let amount = tx.amount.to_f64().ok_or_else(|| {
            ProcessingError::Dispatch(format!("amount {} is not representable", tx.amount))
        })?;

        Ok(Self {
            transaction_id: tx.id.clone(),
            amount,
            currency: tx.currency.clone(),
            status: tx.status,
            transaction_type: tx.transaction_type,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Delivered,
    /// No callback URL, or the transaction is not final yet.
    Skipped,
    /// Delivery failed and was dropped.
    Failed,
}

/// Hex HMAC-SHA256 of `body` keyed with `secret`.
pub fn sign_payload(secret: &str, body: &[u8]) -> Result<String, ProcessingError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| ProcessingError::Dispatch(e.to_string()))?;
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Best-effort delivery of final outcomes to client callback URLs, one
/// breaker per client host.
#[derive(Clone)]
pub struct CallbackDispatcher {
    client: Client,
    breakers: Arc<CircuitBreakerRegistry>,
    signing_secret: Option<String>,
}

impl CallbackDispatcher {
    pub fn new(breakers: Arc<CircuitBreakerRegistry>, signing_secret: Option<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        Self {
            client,
            breakers,
            signing_secret,
        }
    }

    pub async fn dispatch(&self, tx: &Transaction) -> Result<DispatchOutcome, ProcessingError> {
        if !tx.status.is_terminal() {
            debug!("Transaction {} is {}, not dispatching", tx.id, tx.status);
            return Ok(DispatchOutcome::Skipped);
        }

        let Some(url) = tx
            .client_callback
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
        else {
            debug!("Transaction {} has no client callback", tx.id);
            return Ok(DispatchOutcome::Skipped);
        };

        let host = extract_host(url).map_err(|e| {
            ProcessingError::Dispatch(format!("invalid callback url for {}: {}", tx.id, e))
        })?;

        let body = serde_json::to_vec(&PaymentResponse::try_from(tx)?)
            .map_err(|e| ProcessingError::Dispatch(e.to_string()))?;

        let mut request = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/json");
        if let Some(secret) = &self.signing_secret {
            request = request.header(SIGNATURE_HEADER, sign_payload(secret, &body)?);
        }
        let request = request.body(body);

        let command = async move {
            let response = request.send().await.map_err(|e| e.to_string())?;
            let status = response.status();
            if !status.is_success() {
                return Err(format!("client failed with status code {}", status.as_u16()));
            }
            Ok(())
        };

        let transaction_id = tx.id.clone();
        let delivered = self
            .breakers
            .run(&host, command, |e: BreakerError<String>| async move {
                warn!("Dropping client callback for transaction {}: {}", transaction_id, e);
            })
            .await;

        if delivered.is_some() {
            info!("Delivered {} outcome for transaction {} to {}", tx.status, tx.id, host);
            Ok(DispatchOutcome::Delivered)
        } else {
            Ok(DispatchOutcome::Failed)
        }
    }
}

#[async_trait]
impl MessageHandler for CallbackDispatcher {
    async fn handle(&self, delivery: &Delivery) -> Result<(), ProcessingError> {
        let tx: Transaction = serde_json::from_slice(&delivery.payload)
            .map_err(|e| ProcessingError::Malformed(e.to_string()))?;

        let dispatcher = self.clone();
        tokio::spawn(async move {
            if let Err(e) = dispatcher.dispatch(&tx).await {
                warn!("Could not dispatch transaction {}: {}", tx.id, e);
            }
        });
        Ok(())
    }
}
