//! Outbound contract with the blockchain-API gateway
//!
//! The gateway builds contract calls, reports chain identity, accepts signed
//! transactions and answers transaction/event queries. Everything behind it is
//! opaque to the minting pipeline and the status checkers.

use std::collections::HashMap;

use alloy::primitives::{Address, Bytes, TxHash, U256};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// `0x`-prefixed EIP-2718 encoded signed transaction
pub type SignedTransaction = String;

/// Default event page size; the gateway rejects anything larger.
pub const DEFAULT_EVENT_PAGE_LIMIT: u32 = 50;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("gateway transport error")]
    Transport(#[from] reqwest::Error),
    #[error("gateway responded with status {status}: {message}")]
    Api { status: u16, message: String },
    #[error("cannot decode gateway response: {0}")]
    Decode(String),
    #[error("expected {expected}, got {actual}")]
    UnexpectedKind { expected: &'static str, actual: &'static str },
}

/// Unsigned transaction descriptor returned for a state-changing contract call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionToSign {
    pub from: Option<Address>,
    pub to: Option<Address>,
    #[serde(deserialize_with = "quantity")]
    pub nonce: u64,
    #[serde(default)]
    pub data: Bytes,
    #[serde(default)]
    pub value: U256,
    #[serde(deserialize_with = "quantity")]
    pub gas: u64,
    #[serde(default)]
    pub gas_fee_cap: U256,
    #[serde(default)]
    pub gas_tip_cap: U256,
    #[serde(rename = "type", default)]
    pub tx_type: u8,
}

/// Result of a contract function call, discriminated by `kind`.
/// Unknown kinds fail to decode.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind")]
pub enum MethodCallResult {
    #[serde(rename = "TransactionToSignResponse")]
    TransactionToSign { tx: TransactionToSign },
    #[serde(rename = "MethodCallResponse")]
    MethodCall { output: serde_json::Value },
}

impl MethodCallResult {
    pub fn kind(&self) -> &'static str {
        match self {
            MethodCallResult::TransactionToSign { .. } => "TransactionToSignResponse",
            MethodCallResult::MethodCall { .. } => "MethodCallResponse",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ChainStatus {
    #[serde(rename = "chainID")]
    pub chain_id: u64,
}

/// Transaction as echoed back by the gateway after submission.
/// Echoed fields are not reliable; `from` in particular is often absent.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmittedTransaction {
    pub hash: TxHash,
    #[serde(default)]
    pub from: Option<Address>,
    #[serde(default)]
    pub to: Option<Address>,
    #[serde(default)]
    pub value: Option<U256>,
    #[serde(default, deserialize_with = "optional_quantity")]
    pub nonce: Option<u64>,
    #[serde(default, deserialize_with = "optional_quantity")]
    pub gas: Option<u64>,
}

/// On-chain view of a known transaction
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionData {
    pub is_pending: bool,
    #[serde(default, deserialize_with = "optional_quantity")]
    pub block_number: Option<u64>,
    #[serde(default)]
    pub from: Option<Address>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventFilter {
    pub contract_label: String,
    pub limit: u32,
}

impl EventFilter {
    pub fn for_contract(contract_label: impl Into<String>) -> Self {
        Self {
            contract_label: contract_label.into(),
            limit: DEFAULT_EVENT_PAGE_LIMIT,
        }
    }
}

/// Emitted contract event, inputs keyed by parameter name
#[derive(Debug, Clone, PartialEq)]
pub struct ChainEvent {
    pub name: String,
    pub tx_hash: TxHash,
    pub block_number: u64,
    pub triggered_at: DateTime<Utc>,
    pub inputs: HashMap<String, serde_json::Value>,
}

#[async_trait]
pub trait ChainGateway: Send + Sync {
    /// Call `method` on the configured contract. State-changing methods answer
    /// with a transaction to sign, view methods with their output.
    async fn call_contract_function(
        &self,
        method: &str,
        args: Vec<serde_json::Value>,
        from: Option<Address>,
    ) -> Result<MethodCallResult, GatewayError>;

    async fn get_chain_status(&self) -> Result<ChainStatus, GatewayError>;

    async fn submit_signed_transaction(
        &self,
        signed: &SignedTransaction,
    ) -> Result<SubmittedTransaction, GatewayError>;

    /// `Ok(None)` when the gateway does not know the transaction.
    async fn get_transaction(&self, hash: &TxHash)
    -> Result<Option<TransactionData>, GatewayError>;

    /// Most recent events only; there is no pagination.
    async fn list_events(&self, filter: &EventFilter) -> Result<Vec<ChainEvent>, GatewayError>;
}

/// Accepts a JSON number, a decimal string or a `0x` hex string.
pub(crate) fn parse_quantity(value: &serde_json::Value) -> Result<u64, String> {
    match value {
        serde_json::Value::Number(n) => n
            .as_u64()
            .ok_or_else(|| format!("not an unsigned integer: {}", n)),
        serde_json::Value::String(s) => match s.strip_prefix("0x") {
            Some(hex) => u64::from_str_radix(hex, 16).map_err(|e| format!("{}: {}", s, e)),
            None => s.parse::<u64>().map_err(|e| format!("{}: {}", s, e)),
        },
        other => Err(format!("unexpected quantity: {}", other)),
    }
}

pub(crate) fn quantity<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    let value = serde_json::Value::deserialize(deserializer)?;
    parse_quantity(&value).map_err(serde::de::Error::custom)
}

pub(crate) fn optional_quantity<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
    match Option::<serde_json::Value>::deserialize(deserializer)? {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(value) => parse_quantity(&value)
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}
