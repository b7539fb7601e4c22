//! MultiBaas REST client implementing the chain gateway
//!
//! Every MultiBaas response is wrapped as `{"status", "message", "result"}`;
//! errors carry the same envelope without `result`.

use std::collections::HashMap;

use alloy::primitives::{Address, TxHash};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::json;

use crate::services::chain_gateway::{
    ChainEvent, ChainGateway, ChainStatus, EventFilter, GatewayError, MethodCallResult,
    SignedTransaction, SubmittedTransaction, TransactionData, quantity,
};

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    result: T,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    status: Option<u16>,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct SubmitResult {
    tx: SubmittedTransaction,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEvent {
    triggered_at: DateTime<Utc>,
    event: RawEventInfo,
    transaction: RawEventTransaction,
}

#[derive(Debug, Deserialize)]
struct RawEventInfo {
    name: String,
    #[serde(default)]
    inputs: Vec<RawEventInput>,
}

#[derive(Debug, Deserialize)]
struct RawEventInput {
    name: String,
    value: serde_json::Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEventTransaction {
    tx_hash: TxHash,
    #[serde(deserialize_with = "quantity")]
    block_number: u64,
}

impl From<RawEvent> for ChainEvent {
    fn from(raw: RawEvent) -> Self {
        let inputs: HashMap<String, serde_json::Value> = raw
            .event
            .inputs
            .into_iter()
            .map(|input| (input.name, input.value))
            .collect();

        Self {
            name: raw.event.name,
            tx_hash: raw.transaction.tx_hash,
            block_number: raw.transaction.block_number,
            triggered_at: raw.triggered_at,
            inputs,
        }
    }
}

#[derive(Clone)]
pub struct MultiBaasClient {
    client: Client,
    base_url: String,
    api_key: String,
    chain: String,
    contract_alias: String,
    contract_label: String,
}

impl MultiBaasClient {
    pub fn new(
        base_url: String,
        api_key: String,
        chain: String,
        contract_alias: String,
        contract_label: String,
    ) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            chain,
            contract_alias,
            contract_label,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v0{}", self.base_url, path)
    }

    async fn read_result<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, GatewayError> {
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorBody>(&body)
                .map(|b| b.message)
                .unwrap_or(body);
            return Err(GatewayError::Api {
                status: status.as_u16(),
                message,
            });
        }

        serde_json::from_str::<Envelope<T>>(&body)
            .map(|envelope| envelope.result)
            .map_err(|e| GatewayError::Decode(e.to_string()))
    }
}

#[async_trait]
impl ChainGateway for MultiBaasClient {
    async fn call_contract_function(
        &self,
        method: &str,
        args: Vec<serde_json::Value>,
        from: Option<Address>,
    ) -> Result<MethodCallResult, GatewayError> {
        let url = self.url(&format!(
            "/chains/{}/addresses/{}/contracts/{}/methods/{}",
            self.chain, self.contract_alias, self.contract_label, method
        ));
        let mut payload = json!({ "args": args });
        if let Some(from) = from {
            payload["from"] = json!(from);
        }

        tracing::debug!(method = %method, "Calling contract function");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await?;

        Self::read_result(response).await
    }

    async fn get_chain_status(&self) -> Result<ChainStatus, GatewayError> {
        let url = self.url(&format!("/chains/{}/status", self.chain));
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        Self::read_result(response).await
    }

    async fn submit_signed_transaction(
        &self,
        signed: &SignedTransaction,
    ) -> Result<SubmittedTransaction, GatewayError> {
        let url = self.url(&format!("/chains/{}/transactions/submit", self.chain));
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&json!({ "signedTx": signed }))
            .send()
            .await?;

        let result: SubmitResult = Self::read_result(response).await?;
        Ok(result.tx)
    }

    async fn get_transaction(
        &self,
        hash: &TxHash,
    ) -> Result<Option<TransactionData>, GatewayError> {
        let url = self.url(&format!("/chains/{}/transactions/{}", self.chain, hash));
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        // Unknown transactions come back as HTTP 404 with `"status": 404` in the body.
        // A bare 404 (wrong base path, proxy) is still an error.
        if response.status() == StatusCode::NOT_FOUND {
            let body = response.text().await?;
            let parsed = serde_json::from_str::<ErrorBody>(&body).ok();
            if parsed.as_ref().and_then(|b| b.status) == Some(404) {
                return Ok(None);
            }
            return Err(GatewayError::Api {
                status: StatusCode::NOT_FOUND.as_u16(),
                message: parsed.map(|b| b.message).unwrap_or(body),
            });
        }

        Self::read_result(response).await.map(Some)
    }

    async fn list_events(&self, filter: &EventFilter) -> Result<Vec<ChainEvent>, GatewayError> {
        let url = self.url("/events");
        let limit = filter.limit.to_string();
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .query(&[
                ("chain", self.chain.as_str()),
                ("contract_label", filter.contract_label.as_str()),
                ("limit", limit.as_str()),
            ])
            .send()
            .await?;

        let events: Vec<RawEvent> = Self::read_result(response).await?;
        Ok(events.into_iter().map(ChainEvent::from).collect())
    }
}
