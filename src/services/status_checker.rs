//! Shared status-checking machinery
//!
//! A checker walks every pending record once per pass. The strategy decides
//! whether the chain shows the transaction resolved; everything after that
//! (grace period, change detection, persistence, error bookkeeping) lives here
//! so both strategies behave identically.

use alloy::primitives::TxHash;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::models::transaction::{TransactionRecord, TransactionStatus};
use crate::services::chain_gateway::GatewayError;
use crate::services::clock::Clock;
use crate::services::transaction_repo::{RepoError, TransactionRepo};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassSummary {
    pub checked: usize,
    pub confirmed: usize,
    pub failed: usize,
    pub unchanged: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum CheckerError {
    #[error("failed to retrieve pending transactions")]
    RepoRetrieval(#[source] RepoError),
    #[error("failed to retrieve chain data")]
    ApiRetrieval(#[source] GatewayError),
    #[error("failed to update transaction")]
    RepoUpdate(#[source] RepoError),
    /// Some records could not be checked; the rest of the pass was applied.
    #[error("{} of {} pending transactions could not be checked", .failures.len(), .summary.checked)]
    Batch {
        summary: PassSummary,
        failures: Vec<(TxHash, CheckerError)>,
    },
}

#[async_trait]
pub trait StatusChecker: Send + Sync {
    /// Advance every pending record at most once.
    async fn update_pending(&self) -> Result<PassSummary, CheckerError>;
}

/// A record is presumed discarded only strictly after the grace period.
pub fn grace_period_elapsed(
    record: &TransactionRecord,
    now: DateTime<Utc>,
    grace_period: Duration,
) -> bool {
    match record.created_at.checked_add_signed(grace_period) {
        Some(cutoff) => now > cutoff,
        None => false,
    }
}

/// What the chain says about one pending record.
#[derive(Debug)]
pub(crate) enum Evidence {
    /// The transaction is resolved; carries the confirmed record.
    Resolved(TransactionRecord),
    /// The chain knows the transaction but it is not mined yet.
    Unresolved,
    /// The chain has no trace of the transaction.
    Missing,
}

/// Book-keeping for one pass over the pending set.
pub(crate) struct Pass<'a> {
    repo: &'a dyn TransactionRepo,
    clock: &'a dyn Clock,
    grace_period: Duration,
    summary: PassSummary,
    failures: Vec<(TxHash, CheckerError)>,
}

impl<'a> Pass<'a> {
    pub(crate) fn new(repo: &'a dyn TransactionRepo, clock: &'a dyn Clock, grace_period: Duration) -> Self {
        Self {
            repo,
            clock,
            grace_period,
            summary: PassSummary::default(),
            failures: Vec::new(),
        }
    }

    /// Settle one record. Only a `Missing` record is subject to the grace period.
    pub(crate) async fn settle(
        &mut self,
        record: &TransactionRecord,
        evidence: Result<Evidence, CheckerError>,
    ) {
        self.summary.checked += 1;
        let now = self.clock.now();

        let evidence = match evidence {
            Ok(evidence) => evidence,
            Err(e) => {
                tracing::warn!(tx_hash = %record.hash, error = %e, "Could not check transaction");
                self.failures.push((record.hash, e));
                return;
            }
        };

        let next = match evidence {
            Evidence::Resolved(confirmed) => confirmed,
            Evidence::Missing if grace_period_elapsed(record, now, self.grace_period) => {
                tracing::warn!(
                    tx_hash = %record.hash,
                    created_at = %record.created_at,
                    "No chain evidence after grace period, marking transaction failed"
                );
                TransactionRecord {
                    status: TransactionStatus::Failed,
                    ..record.clone()
                }
            }
            Evidence::Missing | Evidence::Unresolved => record.clone(),
        };

        if record.same_state(&next) {
            self.summary.unchanged += 1;
            return;
        }

        let next = TransactionRecord {
            updated_at: now,
            ..next
        };

        match self.repo.update_if_pending(&next).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::info!(tx_hash = %record.hash, "Transaction already resolved elsewhere, leaving it");
                self.summary.unchanged += 1;
                return;
            }
            Err(e) => {
                tracing::error!(tx_hash = %record.hash, error = %e, "Failed to update transaction");
                self.failures.push((record.hash, CheckerError::RepoUpdate(e)));
                return;
            }
        }

        tracing::info!(
            tx_hash = %record.hash,
            from = %record.status,
            to = %next.status,
            "Updated transaction"
        );

        match next.status {
            TransactionStatus::Confirmed => self.summary.confirmed += 1,
            TransactionStatus::Failed => self.summary.failed += 1,
            TransactionStatus::Pending => self.summary.unchanged += 1,
        }
    }

    pub(crate) fn finish(self) -> Result<PassSummary, CheckerError> {
        tracing::info!(
            checked = self.summary.checked,
            confirmed = self.summary.confirmed,
            failed = self.summary.failed,
            unchanged = self.summary.unchanged,
            errors = self.failures.len(),
            "Finished status check pass"
        );

        if self.failures.is_empty() {
            Ok(self.summary)
        } else {
            Err(CheckerError::Batch {
                summary: self.summary,
                failures: self.failures,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::clock::ManualClock;
    use crate::services::transaction_repo::InMemoryTransactionRepo;
    use alloy::primitives::Address;
    use chrono::TimeZone;

    fn record_at(created_at: DateTime<Utc>) -> TransactionRecord {
        TransactionRecord::pending(TxHash::repeat_byte(0x01), None, Address::ZERO, created_at)
    }

    #[test]
    fn test_grace_period_boundary() {
        let t0 = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let grace = Duration::seconds(60);
        let record = record_at(t0);

        assert!(!grace_period_elapsed(&record, t0 + Duration::seconds(59), grace));
        assert!(!grace_period_elapsed(&record, t0 + Duration::seconds(60), grace));
        assert!(grace_period_elapsed(&record, t0 + Duration::seconds(61), grace));
    }

    #[tokio::test]
    async fn test_unresolved_never_expires() {
        let t0 = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let repo = InMemoryTransactionRepo::default();
        let clock = ManualClock::new(t0 + Duration::days(30));
        let record = record_at(t0);
        repo.create(&record).await.unwrap();

        let mut pass = Pass::new(&repo, &clock, Duration::seconds(60));
        pass.settle(&record, Ok(Evidence::Unresolved)).await;
        let summary = pass.finish().unwrap();

        assert_eq!(summary.unchanged, 1);
        assert_eq!(repo.get(&record.hash).await.unwrap(), Some(record));
    }

    #[tokio::test]
    async fn test_stale_expiry_does_not_overwrite_confirmed_row() {
        let t0 = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let repo = InMemoryTransactionRepo::default();
        let clock = ManualClock::new(t0 + Duration::seconds(61));
        let stale = record_at(t0);
        repo.create(&stale).await.unwrap();

        // another instance confirmed it after this pass read the pending set
        let confirmed = TransactionRecord {
            status: TransactionStatus::Confirmed,
            block_number: Some(9),
            ..stale.clone()
        };
        repo.update(&confirmed).await.unwrap();

        let mut pass = Pass::new(&repo, &clock, Duration::seconds(60));
        pass.settle(&stale, Ok(Evidence::Missing)).await;
        let summary = pass.finish().unwrap();

        assert_eq!(summary.failed, 0);
        assert_eq!(summary.unchanged, 1);
        assert_eq!(repo.get(&stale.hash).await.unwrap(), Some(confirmed));
    }

    #[test]
    fn test_batch_error_message() {
        let err = CheckerError::Batch {
            summary: PassSummary {
                checked: 3,
                ..Default::default()
            },
            failures: vec![(
                TxHash::ZERO,
                CheckerError::ApiRetrieval(GatewayError::Decode("bad".to_string())),
            )],
        };
        assert_eq!(err.to_string(), "1 of 3 pending transactions could not be checked");
    }
}
