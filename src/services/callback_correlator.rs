use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

use super::update_under_lock;
use crate::domain::Transaction;
use crate::error::ProcessingError;
use crate::gateways::GatewayRegistry;
use crate::lock::DistributedLock;
use crate::ports::TransactionRepository;
use crate::queue::{publish_json, Delivery, MessageBus, MessageHandler};
use crate::utils::mask_account;

/// A raw gateway callback tagged with the transaction it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackEnvelope {
    pub transaction_id: String,
    #[serde(with = "base64_bytes")]
    pub payload: Vec<u8>,
}

mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug)]
pub enum CorrelationOutcome {
    Settled(Transaction),
    /// The transaction was already terminal; nothing written or published.
    AlreadyFinal,
}

#[derive(Clone)]
pub struct CallbackCorrelator {
    repository: Arc<dyn TransactionRepository>,
    lock: Arc<dyn DistributedLock>,
    gateways: GatewayRegistry,
    bus: Arc<dyn MessageBus>,
    transaction_topic: String,
    dispatch_topic: String,
}

impl CallbackCorrelator {
    pub fn new(
        repository: Arc<dyn TransactionRepository>,
        lock: Arc<dyn DistributedLock>,
        gateways: GatewayRegistry,
        bus: Arc<dyn MessageBus>,
        transaction_topic: impl Into<String>,
        dispatch_topic: impl Into<String>,
    ) -> Self {
        Self {
            repository,
            lock,
            gateways,
            bus,
            transaction_topic: transaction_topic.into(),
            dispatch_topic: dispatch_topic.into(),
        }
    }

    /// Decodes the callback with the transaction's own gateway, records the
    /// outcome under the transaction lock and publishes the settled record.
    pub async fn correlate(
        &self,
        envelope: &CallbackEnvelope,
    ) -> Result<CorrelationOutcome, ProcessingError> {
        let current = self.repository.get_by_id(&envelope.transaction_id).await?;
        let gateway = self
            .gateways
            .get(&current.gateway)
            .ok_or_else(|| ProcessingError::UnknownGateway(current.gateway.clone()))?;

        let response = gateway
            .handle_callback(&envelope.payload)
            .map_err(|e| ProcessingError::Decode(e.to_string()))?;

        if !response.transaction_id.is_empty() && response.transaction_id != envelope.transaction_id {
            return Err(ProcessingError::Decode(format!(
                "callback for {} carries transaction id {}",
                envelope.transaction_id, response.transaction_id
            )));
        }

        let outcome = response
            .outcome()
            .map_err(|e| ProcessingError::Decode(e.to_string()))?;

        if current.status.is_terminal() {
            info!(
                "Transaction {} already {}, ignoring callback",
                current.id, current.status
            );
            return Ok(CorrelationOutcome::AlreadyFinal);
        }

        let settled = update_under_lock(
            self.repository.as_ref(),
            self.lock.as_ref(),
            &envelope.transaction_id,
            |tx| tx.settle(outcome).is_ok(),
        )
        .await?;

        let Some(tx) = settled else {
            info!(
                "Transaction {} settled concurrently, ignoring callback",
                envelope.transaction_id
            );
            return Ok(CorrelationOutcome::AlreadyFinal);
        };

        // The record is final now; a redelivered callback will not republish.
        for topic in [&self.transaction_topic, &self.dispatch_topic] {
            if let Err(e) = publish_json(self.bus.as_ref(), topic, &tx).await {
                error!(
                    "Failed to publish settled transaction {} to {}: {}",
                    tx.id, topic, e
                );
            }
        }

        info!(
            "Transaction {} {} {} {} for account {}: {}",
            tx.id,
            tx.transaction_type,
            tx.amount,
            tx.currency,
            mask_account(&tx.account_id),
            tx.status
        );
        Ok(CorrelationOutcome::Settled(tx))
    }
}

#[async_trait]
impl MessageHandler for CallbackCorrelator {
    async fn handle(&self, delivery: &Delivery) -> Result<(), ProcessingError> {
        let envelope: CallbackEnvelope = serde_json::from_slice(&delivery.payload)
            .map_err(|e| ProcessingError::Malformed(e.to_string()))?;

        let correlator = self.clone();
        tokio::spawn(async move {
            if let Err(e) = correlator.correlate(&envelope).await {
                error!(
                    "Dropping callback for transaction {}: {}",
                    envelope.transaction_id, e
                );
            }
        });
        Ok(())
    }
}
