mod common;

use alloy::primitives::{Address, TxHash, U256};
use chrono::{Duration, TimeZone, Utc};

use sbt_issuer::models::transaction::{TransactionRecord, TransactionStatus};
use sbt_issuer::services::transaction_repo::{
    PostgresTransactionRepo, RepoError, TransactionRepo, UpdatePolicy,
};

use crate::common::setup_test_db;

/// Runs only when TEST_DATABASE_URL points at a scratch Postgres database.
#[tokio::test]
async fn test_postgres_repo_lifecycle() {
    let Some(db) = setup_test_db().await else {
        eprintln!("TEST_DATABASE_URL not set, skipping");
        return;
    };
    let repo = PostgresTransactionRepo::new(db.expect("Failed to connect to test DB"), UpdatePolicy::Strict);

    // setup is idempotent
    repo.setup().await.unwrap();
    repo.setup().await.unwrap();

    // random hash so reruns against the same database do not collide
    let hash = TxHash::from(rand::random::<[u8; 32]>());
    let created = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
    let mut record = TransactionRecord::pending(
        hash,
        Some(Address::repeat_byte(0x0b)),
        Address::repeat_byte(0x0a),
        created,
    );
    record.value = Some(U256::ZERO);
    record.nonce = Some(3);

    repo.create(&record).await.unwrap();
    assert!(matches!(
        repo.create(&record).await,
        Err(RepoError::AlreadyExists(h)) if h == hash
    ));

    let pending = repo.get_all_pending().await.unwrap();
    assert!(pending.iter().any(|r| r.hash == hash));

    let confirmed = TransactionRecord {
        status: TransactionStatus::Confirmed,
        block_number: Some(99),
        token_id: Some(U256::from(5)),
        token_uri: Some("https://sbt.example.com/5".to_string()),
        issued_at: Some(created + Duration::seconds(1)),
        updated_at: created + Duration::seconds(2),
        ..record.clone()
    };
    repo.update(&confirmed).await.unwrap();

    assert_eq!(repo.get(&hash).await.unwrap(), Some(confirmed));
    let pending = repo.get_all_pending().await.unwrap();
    assert!(!pending.iter().any(|r| r.hash == hash));

    // terminal rows are not overwritten by a checker write
    let failed = TransactionRecord {
        status: TransactionStatus::Failed,
        ..record.clone()
    };
    assert!(!repo.update_if_pending(&failed).await.unwrap());
    let stored = repo.get(&hash).await.unwrap().unwrap();
    assert_eq!(stored.status, TransactionStatus::Confirmed);

    let unknown = TransactionRecord::pending(TxHash::from(rand::random::<[u8; 32]>()), None, Address::ZERO, created);
    assert!(matches!(repo.update(&unknown).await, Err(RepoError::NotFound(_))));
}
