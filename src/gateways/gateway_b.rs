use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{callback_url, GatewayError, GatewayResponse, PaymentGateway};
use crate::domain::{Transaction, TransactionType};

const XML_HEADER: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n";
const SOAP_ENV_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";
const WEB_NS: &str = "http://gatewayb.com/ws";

#[derive(Debug, Serialize)]
#[serde(rename = "soapenv:Envelope")]
struct SoapEnvelope {
    #[serde(rename = "@xmlns:soapenv")]
    soap_env: &'static str,
    #[serde(rename = "@xmlns:web")]
    web: &'static str,
    #[serde(rename = "soapenv:Body")]
    body: SoapBody,
}

#[derive(Debug, Serialize)]
struct SoapBody {
    #[serde(rename = "web:Deposit", skip_serializing_if = "Option::is_none")]
    deposit: Option<Operation>,
    #[serde(rename = "web:Withdraw", skip_serializing_if = "Option::is_none")]
    withdraw: Option<Operation>,
}

#[derive(Debug, Serialize)]
struct Operation {
    #[serde(rename = "@account")]
    account: String,
    #[serde(rename = "@transaction")]
    transaction: String,
    #[serde(rename = "@amount")]
    amount: String,
    #[serde(rename = "@currency")]
    currency: String,
    #[serde(rename = "@callback")]
    callback: String,
}

#[derive(Debug, Deserialize)]
struct CallbackEnvelope {
    #[serde(rename = "Body", alias = "soapenv:Body")]
    body: CallbackBody,
}

#[derive(Debug, Deserialize)]
struct CallbackBody {
    #[serde(rename = "TransactionResponse", alias = "web:TransactionResponse")]
    response: TransactionResponse,
}

#[derive(Debug, Deserialize)]
struct TransactionResponse {
    #[serde(rename = "TransactionId")]
    transaction_id: String,
    #[serde(rename = "Status")]
    status: String,
}

/// SOAP-style XML gateway with a single endpoint for both operations.
#[derive(Clone)]
pub struct GatewayB {
    client: Client,
    url: String,
    callback_prefix: String,
}

impl GatewayB {
    pub fn new(url: impl Into<String>, callback_prefix: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        Self {
            client,
            url: url.into(),
            callback_prefix: callback_prefix.into(),
        }
    }

    /// Renders the request document, XML declaration included.
    pub fn build_envelope(&self, tx: &Transaction) -> Result<String, GatewayError> {
        let operation = Operation {
            account: tx.account_id.clone(),
            transaction: tx.id.clone(),
            amount: tx.amount.to_string(),
            currency: tx.currency.clone(),
            callback: callback_url(&self.callback_prefix, &tx.id)?,
        };

        let body = match tx.transaction_type {
            TransactionType::Deposit => SoapBody {
                deposit: Some(operation),
                withdraw: None,
            },
            TransactionType::Withdraw => SoapBody {
                deposit: None,
                withdraw: Some(operation),
            },
        };

        let envelope = SoapEnvelope {
            soap_env: SOAP_ENV_NS,
            web: WEB_NS,
            body,
        };

        let xml = quick_xml::se::to_string(&envelope)
            .map_err(|e| GatewayError::Encode(e.to_string()))?;
        Ok(format!("{}{}", XML_HEADER, xml))
    }

    async fn transact(&self, tx: &Transaction) -> Result<(), GatewayError> {
        let payload = self.build_envelope(tx)?;
        tracing::debug!("Gateway B {} request for {}", tx.transaction_type, tx.id);

        let response = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, "text/xml; charset=utf-8")
            .body(payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::Status(status.as_u16()));
        }

        tracing::info!(
            "Gateway B accepted {} {} with status {}",
            tx.transaction_type,
            tx.id,
            status.as_u16()
        );
        Ok(())
    }
}

#[async_trait]
impl PaymentGateway for GatewayB {
    async fn deposit(&self, tx: &Transaction) -> Result<(), GatewayError> {
        self.transact(tx).await
    }

    async fn withdraw(&self, tx: &Transaction) -> Result<(), GatewayError> {
        self.transact(tx).await
    }

    fn handle_callback(&self, payload: &[u8]) -> Result<GatewayResponse, GatewayError> {
        let text = std::str::from_utf8(payload).map_err(|e| GatewayError::Decode(e.to_string()))?;
        let envelope: CallbackEnvelope =
            quick_xml::de::from_str(text).map_err(|e| GatewayError::Decode(e.to_string()))?;

        Ok(GatewayResponse {
            transaction_id: envelope.body.response.transaction_id,
            status: envelope.body.response.status,
        })
    }
}
