//! Status checking by direct transaction lookup

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use tracing::{Instrument, Span};

use crate::models::transaction::{TransactionRecord, TransactionStatus};
use crate::services::chain_gateway::ChainGateway;
use crate::services::clock::Clock;
use crate::services::status_checker::{
    CheckerError, Evidence, Pass, PassSummary, StatusChecker,
};
use crate::services::transaction_repo::TransactionRepo;

pub struct TransactionChecker {
    repo: Arc<dyn TransactionRepo>,
    gateway: Arc<dyn ChainGateway>,
    clock: Arc<dyn Clock>,
    grace_period: Duration,
    span: Span,
}

impl TransactionChecker {
    pub fn new(
        repo: Arc<dyn TransactionRepo>,
        gateway: Arc<dyn ChainGateway>,
        clock: Arc<dyn Clock>,
        grace_period: Duration,
    ) -> Self {
        Self {
            repo,
            gateway,
            clock,
            grace_period,
            span: tracing::info_span!("transaction_checker"),
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// A mined transaction confirms the record. A transaction still in the
    /// mempool stays pending however old it is; only an unknown one can expire.
    async fn evidence(&self, record: &TransactionRecord) -> Result<Evidence, CheckerError> {
        let data = self
            .gateway
            .get_transaction(&record.hash)
            .await
            .map_err(CheckerError::ApiRetrieval)?;

        match data {
            None => {
                tracing::warn!(tx_hash = %record.hash, "Transaction not found");
                Ok(Evidence::Missing)
            }
            Some(data) if data.is_pending => {
                tracing::debug!(tx_hash = %record.hash, "Transaction still pending on chain");
                Ok(Evidence::Unresolved)
            }
            Some(data) => Ok(Evidence::Resolved(TransactionRecord {
                status: TransactionStatus::Confirmed,
                block_number: data.block_number.or(record.block_number),
                from: data.from.or(record.from),
                ..record.clone()
            })),
        }
    }

    async fn run_pass(&self) -> Result<PassSummary, CheckerError> {
        let pending = self
            .repo
            .get_all_pending()
            .await
            .map_err(CheckerError::RepoRetrieval)?;

        tracing::info!("Got {} pending transactions to check", pending.len());

        let mut pass = Pass::new(self.repo.as_ref(), self.clock.as_ref(), self.grace_period);
        for record in &pending {
            let evidence = self.evidence(record).await;
            pass.settle(record, evidence).await;
        }

        pass.finish()
    }
}

#[async_trait]
impl StatusChecker for TransactionChecker {
    async fn update_pending(&self) -> Result<PassSummary, CheckerError> {
        self.run_pass().instrument(self.span.clone()).await
    }
}
