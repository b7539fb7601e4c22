//! Lifecycle record of a submitted mint transaction
//!
//! Status progresses: pending → confirmed
//!                            ↘ failed
//! `confirmed` and `failed` are terminal.

use alloy::primitives::{Address, TxHash, U256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status of a submitted transaction as tracked by this service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    /// Submitted, no on-chain resolution observed yet
    Pending,
    /// Mined (or issuance event observed)
    Confirmed,
    /// Presumed discarded after the grace period elapsed
    Failed,
}

impl TransactionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Confirmed => "confirmed",
            TransactionStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TransactionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(TransactionStatus::Pending),
            "confirmed" => Ok(TransactionStatus::Confirmed),
            "failed" => Ok(TransactionStatus::Failed),
            _ => Err(format!("Unknown transaction status: {}", s)),
        }
    }
}

/// Persisted state of one minting transaction.
///
/// `from` may be unknown at creation time; chain-specific fields and token
/// metadata stay `None` until the status checker observes them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    pub hash: TxHash,
    pub status: TransactionStatus,
    pub from: Option<Address>,
    pub to: Address,
    pub value: Option<U256>,
    pub nonce: Option<u64>,
    pub gas_limit: Option<u64>,
    pub block_number: Option<u64>,
    pub token_id: Option<U256>,
    pub token_uri: Option<String>,
    pub issued_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TransactionRecord {
    /// New pending record with `created_at == updated_at == now`.
    pub fn pending(hash: TxHash, from: Option<Address>, to: Address, now: DateTime<Utc>) -> Self {
        Self {
            hash,
            status: TransactionStatus::Pending,
            from,
            to,
            value: None,
            nonce: None,
            gas_limit: None,
            block_number: None,
            token_id: None,
            token_uri: None,
            issued_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// True when both records carry the same state, ignoring `updated_at`.
    pub fn same_state(&self, other: &TransactionRecord) -> bool {
        let mut other = other.clone();
        other.updated_at = self.updated_at;
        *self == other
    }
}

/// Response for `GET /status`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub tx_hash: String,
    pub status: TransactionStatus,
    pub from: Option<String>,
    pub to: String,
    pub block_number: Option<u64>,
    pub token_id: Option<String>,
    pub token_uri: Option<String>,
    pub issued_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<TransactionRecord> for StatusResponse {
    fn from(record: TransactionRecord) -> Self {
        Self {
            tx_hash: record.hash.to_string(),
            status: record.status,
            from: record.from.map(|a| a.to_string()),
            to: record.to.to_string(),
            block_number: record.block_number,
            token_id: record.token_id.map(|id| id.to_string()),
            token_uri: record.token_uri,
            issued_at: record.issued_at.map(|t| t.to_rfc3339()),
            created_at: record.created_at.to_rfc3339(),
            updated_at: record.updated_at.to_rfc3339(),
        }
    }
}

/// Response for `POST /claim`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimResponse {
    pub tx_hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record() -> TransactionRecord {
        TransactionRecord::pending(
            TxHash::repeat_byte(0xab),
            None,
            Address::repeat_byte(0x02),
            Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
        )
    }

    #[test]
    fn test_status_parse_and_display() {
        assert_eq!("Confirmed".parse::<TransactionStatus>().unwrap(), TransactionStatus::Confirmed);
        assert_eq!(TransactionStatus::Failed.to_string(), "failed");
        assert!("zombie".parse::<TransactionStatus>().is_err());
    }

    #[test]
    fn test_terminal_states() {
        assert!(!TransactionStatus::Pending.is_terminal());
        assert!(TransactionStatus::Confirmed.is_terminal());
        assert!(TransactionStatus::Failed.is_terminal());
    }

    #[test]
    fn test_pending_record_timestamps_match() {
        let r = record();
        assert_eq!(r.status, TransactionStatus::Pending);
        assert_eq!(r.created_at, r.updated_at);
    }

    #[test]
    fn test_same_state_ignores_updated_at() {
        let a = record();
        let mut b = a.clone();
        b.updated_at = b.updated_at + chrono::Duration::seconds(5);
        assert!(a.same_state(&b));

        b.block_number = Some(7);
        assert!(!a.same_state(&b));
    }

    #[test]
    fn test_status_response_serializes_camel_case() {
        let json = serde_json::to_value(StatusResponse::from(record())).unwrap();
        assert_eq!(json["status"], "pending");
        assert!(json.get("txHash").is_some());
        assert!(json["tokenId"].is_null());
    }
}
