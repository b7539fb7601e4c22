mod common;

use std::sync::Arc;

use alloy::primitives::{Address, TxHash};
use axum::http::StatusCode;
use chrono::{TimeZone, Utc};

use sbt_issuer::models::transaction::{TransactionRecord, TransactionStatus};
use sbt_issuer::services::clock::SystemClock;
use sbt_issuer::services::minter::SbtMinter;
use sbt_issuer::services::multibaas::MultiBaasClient;
use sbt_issuer::services::signer::{TransactionSigner, WalletSigner};
use sbt_issuer::services::transaction_repo::{InMemoryTransactionRepo, UpdatePolicy};
use sbt_issuer::{AppState, router};

use crate::common::{
    MintBehavior, MockMint, SUBMITTED_TX_HASH, claimant, get_request, post_request, send,
    spawn_fake_multibaas,
};

fn app(mint: &Arc<MockMint>) -> axum::Router {
    router(AppState {
        minter: mint.clone(),
    })
}

#[tokio::test]
async fn test_claim_with_valid_signature() {
    let mint = MockMint::new();
    let (to, signature) = claimant();

    let (status, body) = send(
        app(&mint),
        post_request(&format!("/claim?to={}&signature={}", to, signature)),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["txHash"], SUBMITTED_TX_HASH);
    assert_eq!(*mint.minted_for.lock(), vec![to.parse::<Address>().unwrap()]);
}

#[tokio::test]
async fn test_claim_missing_to() {
    let mint = MockMint::new();

    let (status, body) = send(app(&mint), post_request("/claim?signature=0x1234")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "\"to\" query parameter is required");
    assert!(mint.minted_for.lock().is_empty());
}

#[tokio::test]
async fn test_claim_repeated_to() {
    let mint = MockMint::new();
    let (to, signature) = claimant();

    let (status, _) = send(
        app(&mint),
        post_request(&format!("/claim?to={}&to={}&signature={}", to, to, signature)),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(mint.minted_for.lock().is_empty());
}

#[tokio::test]
async fn test_claim_invalid_address() {
    let mint = MockMint::new();

    let (status, body) = send(app(&mint), post_request("/claim?to=invalid&signature=0x12")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "\"to\" query parameter is not a valid Ethereum address");
}

#[tokio::test]
async fn test_claim_missing_or_repeated_signature() {
    let mint = MockMint::new();
    let (to, signature) = claimant();

    let (status, _) = send(app(&mint), post_request(&format!("/claim?to={}", to))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        app(&mint),
        post_request(&format!(
            "/claim?to={}&signature={}&signature={}",
            to, signature, signature
        )),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(mint.minted_for.lock().is_empty());
}

#[tokio::test]
async fn test_claim_invalid_signature_never_mints() {
    let mint = MockMint::new();
    let (to, _) = claimant();
    // a valid signature by a different claimant
    let (_, other_signature) = claimant();

    for signature in ["invalid", other_signature.as_str()] {
        let (status, body) = send(
            app(&mint),
            post_request(&format!("/claim?to={}&signature={}", to, signature)),
        )
        .await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Could not verify signature");
    }
    assert!(mint.minted_for.lock().is_empty());
}

#[tokio::test]
async fn test_claim_mint_failures_are_opaque() {
    let mint = MockMint::new();
    let (to, signature) = claimant();
    let uri = format!("/claim?to={}&signature={}", to, signature);

    for behavior in [MintBehavior::FailSubmission, MintBehavior::FailStateSaving] {
        *mint.behavior.lock() = behavior;

        let (status, body) = send(app(&mint), post_request(&uri)).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Failed to start minting");
        assert!(body.get("txHash").is_none());
    }
}

#[tokio::test]
async fn test_status_lookup() {
    let mint = MockMint::new();
    let hash: TxHash = SUBMITTED_TX_HASH.parse().unwrap();
    let created = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
    mint.records.lock().insert(
        hash,
        TransactionRecord::pending(hash, None, Address::repeat_byte(0x0a), created),
    );

    let (status, body) = send(
        app(&mint),
        get_request(&format!("/status?txHash={}", SUBMITTED_TX_HASH)),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["txHash"], SUBMITTED_TX_HASH);
    assert_eq!(body["status"], "pending");
    assert_eq!(body["createdAt"], "2025-01-01T00:00:00+00:00");
}

#[tokio::test]
async fn test_status_errors() {
    let mint = MockMint::new();

    let (status, _) = send(app(&mint), get_request("/status")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(app(&mint), get_request("/status?txHash=0x1234")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        app(&mint),
        get_request(&format!("/status?txHash={}", TxHash::repeat_byte(0x77))),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Transaction not found");
}

#[tokio::test]
async fn test_health_and_unknown_route() {
    let mint = MockMint::new();

    let (status, body) = send(app(&mint), get_request("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, body) = send(app(&mint), get_request("/nope")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, serde_json::json!({ "error": "Not found" }));
}

#[tokio::test]
async fn test_claim_end_to_end_against_fake_gateway() {
    let signer = Arc::new(
        WalletSigner::from_private_key(
            "1111111111111111111111111111111111111111111111111111111111111111",
        )
        .unwrap(),
    );
    let base_url = spawn_fake_multibaas(signer.address()).await;
    let gateway = Arc::new(MultiBaasClient::new(
        base_url,
        "test_api_key".to_string(),
        "ethereum".to_string(),
        "sbt".to_string(),
        "sbt".to_string(),
    ));
    let repo = Arc::new(InMemoryTransactionRepo::new(UpdatePolicy::Strict));
    let minter = SbtMinter::new(gateway, signer.clone(), repo.clone(), Arc::new(SystemClock));
    let app = router(AppState {
        minter: Arc::new(minter),
    });
    let (to, signature) = claimant();

    let (status, body) = send(
        app.clone(),
        post_request(&format!("/claim?to={}&signature={}", to, signature)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["txHash"], SUBMITTED_TX_HASH);
    assert_eq!(repo.len(), 1);

    let (status, body) = send(
        app,
        get_request(&format!("/status?txHash={}", SUBMITTED_TX_HASH)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], TransactionStatus::Pending.as_str());
    // the echo carried no sender; the signer fills it in
    assert_eq!(body["from"], signer.address().to_string());
    assert_eq!(body["to"], to);
}
