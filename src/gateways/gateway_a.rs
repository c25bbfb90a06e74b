use async_trait::async_trait;
use bigdecimal::ToPrimitive;
use reqwest::Client;
use std::time::Duration;

use super::{callback_url, GatewayError, GatewayRequest, GatewayResponse, PaymentGateway};
use crate::domain::{Transaction, TransactionType};
use crate::utils::{join_url, sanitize_json};

/// Flat JSON gateway: deposits and withdrawals go to separate paths.
#[derive(Clone)]
pub struct GatewayA {
    client: Client,
    base_url: String,
    deposit_path: String,
    withdraw_path: String,
    callback_prefix: String,
}

impl GatewayA {
    pub fn new(
        base_url: impl Into<String>,
        deposit_path: impl Into<String>,
        withdraw_path: impl Into<String>,
        callback_prefix: impl Into<String>,
    ) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        Self {
            client,
            base_url: base_url.into(),
            deposit_path: deposit_path.into(),
            withdraw_path: withdraw_path.into(),
            callback_prefix: callback_prefix.into(),
        }
    }

    pub fn build_request(&self, tx: &Transaction) -> Result<GatewayRequest, GatewayError> {
        let amount = tx
            .amount
            .to_f64()
            .ok_or_else(|| GatewayError::Encode(format!("amount {} is not representable", tx.amount)))?;

        Ok(GatewayRequest {
            transaction_id: tx.id.clone(),
            amount,
            currency: tx.currency.clone(),
            callback_url: callback_url(&self.callback_prefix, &tx.id)?,
            account: tx.account_id.clone(),
        })
    }

    async fn transact(&self, tx: &Transaction) -> Result<(), GatewayError> {
        let path = match tx.transaction_type {
            TransactionType::Deposit => &self.deposit_path,
            TransactionType::Withdraw => &self.withdraw_path,
        };
        let url = join_url(&self.base_url, path)?;
        let request = self.build_request(tx)?;

        if let Ok(body) = serde_json::to_value(&request) {
            tracing::debug!("Gateway A request to {}: {}", url, sanitize_json(&body));
        }

        let response = self.client.post(&url).json(&request).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::Status(status.as_u16()));
        }

        tracing::info!(
            "Gateway A accepted {} {} with status {}",
            tx.transaction_type,
            tx.id,
            status.as_u16()
        );
        Ok(())
    }
}

#[async_trait]
impl PaymentGateway for GatewayA {
    async fn deposit(&self, tx: &Transaction) -> Result<(), GatewayError> {
        self.transact(tx).await
    }

    async fn withdraw(&self, tx: &Transaction) -> Result<(), GatewayError> {
        self.transact(tx).await
    }

    fn handle_callback(&self, payload: &[u8]) -> Result<GatewayResponse, GatewayError> {
        serde_json::from_slice(payload).map_err(|e| GatewayError::Decode(e.to_string()))
    }
}
