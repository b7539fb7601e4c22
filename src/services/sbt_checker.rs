//! Status checking from the SBT contract's `Issued` events
//!
//! One event page is fetched per pass and matched against the pending set by
//! transaction hash. The gateway caps the page at 50 events and offers no
//! pagination, so a burst of more than 50 contract events between two passes
//! can hide an issuance until the grace period fails it.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use alloy::primitives::{TxHash, U256};
use async_trait::async_trait;
use chrono::Duration;
use serde_json::{Value, json};
use tracing::{Instrument, Span};

use crate::models::transaction::{TransactionRecord, TransactionStatus};
use crate::services::chain_gateway::{
    ChainEvent, ChainGateway, EventFilter, GatewayError, MethodCallResult,
};
use crate::services::clock::Clock;
use crate::services::status_checker::{
    CheckerError, Evidence, Pass, PassSummary, StatusChecker,
};
use crate::services::transaction_repo::TransactionRepo;

pub const ISSUED_EVENT: &str = "Issued";
pub const TOKEN_URI_METHOD: &str = "tokenURI";

pub struct SbtChecker {
    repo: Arc<dyn TransactionRepo>,
    gateway: Arc<dyn ChainGateway>,
    clock: Arc<dyn Clock>,
    grace_period: Duration,
    event_filter: EventFilter,
    span: Span,
}

impl SbtChecker {
    pub fn new(
        repo: Arc<dyn TransactionRepo>,
        gateway: Arc<dyn ChainGateway>,
        clock: Arc<dyn Clock>,
        grace_period: Duration,
        contract_label: &str,
    ) -> Self {
        Self {
            repo,
            gateway,
            clock,
            grace_period,
            event_filter: EventFilter::for_contract(contract_label),
            span: tracing::info_span!("sbt_checker"),
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// A `null` output means the contract has no URI for the token.
    async fn token_uri(&self, token_id: U256) -> Result<Option<String>, GatewayError> {
        let result = self
            .gateway
            .call_contract_function(TOKEN_URI_METHOD, vec![json!(token_id.to_string())], None)
            .await?;

        match result {
            MethodCallResult::MethodCall { output: Value::String(uri) } => Ok(Some(uri)),
            MethodCallResult::MethodCall { output: Value::Null } => Ok(None),
            MethodCallResult::MethodCall { output } => Err(GatewayError::Decode(format!(
                "tokenURI output is not a string: {}",
                output
            ))),
            other => Err(GatewayError::UnexpectedKind {
                expected: "MethodCallResponse",
                actual: other.kind(),
            }),
        }
    }

    async fn confirmed_by(
        &self,
        record: &TransactionRecord,
        event: &ChainEvent,
    ) -> Result<TransactionRecord, CheckerError> {
        let token_id = event
            .inputs
            .get("tokenId")
            .ok_or_else(|| GatewayError::Decode("Issued event without tokenId".to_string()))
            .and_then(token_id_from)
            .map_err(CheckerError::ApiRetrieval)?;

        let token_uri = self
            .token_uri(token_id)
            .await
            .map_err(CheckerError::ApiRetrieval)?;

        Ok(TransactionRecord {
            status: TransactionStatus::Confirmed,
            block_number: Some(event.block_number),
            token_id: Some(token_id),
            token_uri,
            issued_at: Some(event.triggered_at),
            ..record.clone()
        })
    }

    async fn run_pass(&self) -> Result<PassSummary, CheckerError> {
        let pending = self
            .repo
            .get_all_pending()
            .await
            .map_err(CheckerError::RepoRetrieval)?;

        if pending.is_empty() {
            tracing::info!("No pending SBTs to check");
            return Ok(PassSummary::default());
        }

        tracing::info!("Got {} pending SBTs to check", pending.len());

        let events = self
            .gateway
            .list_events(&self.event_filter)
            .await
            .map_err(CheckerError::ApiRetrieval)?;

        let issued: HashMap<TxHash, &ChainEvent> = events
            .iter()
            .filter(|event| event.name == ISSUED_EVENT)
            .map(|event| (event.tx_hash, event))
            .collect();

        tracing::debug!(events = events.len(), issued = issued.len(), "Listed contract events");

        let mut pass = Pass::new(self.repo.as_ref(), self.clock.as_ref(), self.grace_period);
        for record in &pending {
            let evidence = match issued.get(&record.hash) {
                Some(event) => self.confirmed_by(record, event).await.map(Evidence::Resolved),
                None => Ok(Evidence::Missing),
            };
            pass.settle(record, evidence).await;
        }

        pass.finish()
    }
}

#[async_trait]
impl StatusChecker for SbtChecker {
    async fn update_pending(&self) -> Result<PassSummary, CheckerError> {
        self.run_pass().instrument(self.span.clone()).await
    }
}

fn token_id_from(value: &Value) -> Result<U256, GatewayError> {
    match value {
        Value::String(s) => {
            U256::from_str(s).map_err(|e| GatewayError::Decode(format!("tokenId {}: {}", s, e)))
        }
        Value::Number(n) => n
            .as_u64()
            .map(U256::from)
            .ok_or_else(|| GatewayError::Decode(format!("tokenId {}", n))),
        other => Err(GatewayError::Decode(format!("tokenId {}", other))),
    }
}
