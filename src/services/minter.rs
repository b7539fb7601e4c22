//! Minting pipeline: build → sign → submit → persist
//!
//! The order is fixed. A record is only written once the gateway has accepted
//! the signed transaction, so a failed mint never leaves a pending record
//! behind. The opposite gap (on-chain but unrecorded) is reported as
//! `MintError::StateSaving`.

use std::sync::Arc;

use alloy::primitives::{Address, TxHash};
use async_trait::async_trait;
use serde_json::json;
use tracing::{Instrument, Span};

use crate::models::transaction::TransactionRecord;
use crate::services::chain_gateway::{ChainGateway, GatewayError, MethodCallResult};
use crate::services::clock::Clock;
use crate::services::signer::{SignerError, TransactionSigner};
use crate::services::transaction_repo::{RepoError, TransactionRepo};

pub const MINT_METHOD: &str = "safeMint";

/// Burn authorization passed to `safeMint`: both issuer and owner may burn.
pub const BURN_AUTH_BOTH: &str = "2";

#[derive(Debug, thiserror::Error)]
pub enum MintError {
    #[error("failed to build mint transaction")]
    ContractCall(#[source] GatewayError),
    #[error("failed to query chain status")]
    ChainQuery(#[source] GatewayError),
    #[error("failed to sign mint transaction")]
    Signing(#[source] SignerError),
    #[error("failed to submit mint transaction")]
    Submission(#[source] GatewayError),
    #[error("mint transaction submitted but not recorded")]
    StateSaving(#[source] RepoError),
}

impl MintError {
    /// The transaction is on-chain but this service has no record of it.
    pub fn is_tracking_gap(&self) -> bool {
        matches!(self, MintError::StateSaving(_))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StatusQueryError {
    #[error("transaction {0} not found")]
    NotFound(TxHash),
    #[error("failed to read transaction state")]
    Repo(#[source] RepoError),
}

#[async_trait]
pub trait SbtMint: Send + Sync {
    async fn start_minting(&self, to: Address) -> Result<TxHash, MintError>;

    async fn get_status(&self, hash: &TxHash) -> Result<TransactionRecord, StatusQueryError>;
}

pub struct SbtMinter {
    gateway: Arc<dyn ChainGateway>,
    signer: Arc<dyn TransactionSigner>,
    repo: Arc<dyn TransactionRepo>,
    clock: Arc<dyn Clock>,
    span: Span,
}

impl SbtMinter {
    pub fn new(
        gateway: Arc<dyn ChainGateway>,
        signer: Arc<dyn TransactionSigner>,
        repo: Arc<dyn TransactionRepo>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            gateway,
            signer,
            repo,
            clock,
            span: tracing::info_span!("sbt_minter"),
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    async fn mint(&self, to: Address) -> Result<TxHash, MintError> {
        let from = self.signer.address();

        let tx = match self
            .gateway
            .call_contract_function(
                MINT_METHOD,
                vec![json!(to), json!(BURN_AUTH_BOTH)],
                Some(from),
            )
            .await
            .map_err(MintError::ContractCall)?
        {
            MethodCallResult::TransactionToSign { tx } => tx,
            other => {
                return Err(MintError::ContractCall(GatewayError::UnexpectedKind {
                    expected: "TransactionToSignResponse",
                    actual: other.kind(),
                }));
            }
        };

        let chain = self
            .gateway
            .get_chain_status()
            .await
            .map_err(MintError::ChainQuery)?;

        let signed = self
            .signer
            .sign(&tx, chain.chain_id)
            .await
            .map_err(MintError::Signing)?;

        let submitted = self
            .gateway
            .submit_signed_transaction(&signed)
            .await
            .map_err(MintError::Submission)?;
        let hash = submitted.hash;

        tracing::info!(tx_hash = %hash, to = %to, "Mint transaction submitted");

        // The echo may omit `from`; the local signer is authoritative.
        let mut record = TransactionRecord::pending(hash, Some(from), to, self.clock.now());
        record.value = Some(tx.value);
        record.nonce = Some(tx.nonce);
        record.gas_limit = Some(tx.gas);

        if let Err(e) = self.repo.create(&record).await {
            tracing::error!(
                tx_hash = %hash,
                to = %to,
                error = %e,
                "Mint transaction is on-chain but could not be recorded"
            );
            return Err(MintError::StateSaving(e));
        }

        Ok(hash)
    }
}

#[async_trait]
impl SbtMint for SbtMinter {
    async fn start_minting(&self, to: Address) -> Result<TxHash, MintError> {
        self.mint(to).instrument(self.span.clone()).await
    }

    async fn get_status(&self, hash: &TxHash) -> Result<TransactionRecord, StatusQueryError> {
        let record = self
            .repo
            .get(hash)
            .instrument(self.span.clone())
            .await
            .map_err(StatusQueryError::Repo)?;

        record.ok_or(StatusQueryError::NotFound(*hash))
    }
}
