#![allow(dead_code)]

use std::collections::HashMap;
use std::env;
use std::sync::Arc;

use alloy::primitives::{Address, TxHash, hex};
use alloy::signers::{SignerSync, local::PrivateKeySigner};
use async_trait::async_trait;
use axum::{
    Json, Router,
    body::Body,
    http::{Request, StatusCode},
    routing::{get, post},
};
use http_body_util::BodyExt;
use parking_lot::Mutex;
use sea_orm::{Database, DatabaseConnection, DbErr};
use serde_json::{Value, json};
use tower::ServiceExt;

use sbt_issuer::models::transaction::TransactionRecord;
use sbt_issuer::services::chain_gateway::GatewayError;
use sbt_issuer::services::minter::{MintError, SbtMint, StatusQueryError};
use sbt_issuer::services::transaction_repo::RepoError;

pub const SUBMITTED_TX_HASH: &str =
    "0x3cbc6345a67a276f3ba132b8655dcebd0ca249b5c9b77fc6361f3ae89bd0a928";

/// Test database from TEST_DATABASE_URL, `None` when it is not configured
pub async fn setup_test_db() -> Option<Result<DatabaseConnection, DbErr>> {
    let database_url = env::var("TEST_DATABASE_URL").ok()?;
    Some(Database::connect(&database_url).await)
}

/// Run one request through the router and decode the JSON body.
pub async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

pub fn post_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

pub fn get_request(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

/// A fresh claimant: its checksummed address and its signature over it
pub fn claimant() -> (String, String) {
    let key = PrivateKeySigner::random();
    let address = key.address().to_string();
    let signature = key.sign_message_sync(address.as_bytes()).unwrap();
    (address, hex::encode_prefixed(signature.as_bytes()))
}

pub enum MintBehavior {
    Succeed,
    FailSubmission,
    FailStateSaving,
}

/// Minting double that records every recipient it is asked to mint for
pub struct MockMint {
    pub behavior: Mutex<MintBehavior>,
    pub minted_for: Mutex<Vec<Address>>,
    pub records: Mutex<HashMap<TxHash, TransactionRecord>>,
}

impl MockMint {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            behavior: Mutex::new(MintBehavior::Succeed),
            minted_for: Mutex::new(vec![]),
            records: Mutex::new(HashMap::new()),
        })
    }
}

#[async_trait]
impl SbtMint for MockMint {
    async fn start_minting(&self, to: Address) -> Result<TxHash, MintError> {
        self.minted_for.lock().push(to);
        match *self.behavior.lock() {
            MintBehavior::Succeed => Ok(SUBMITTED_TX_HASH.parse().unwrap()),
            MintBehavior::FailSubmission => Err(MintError::Submission(GatewayError::Api {
                status: 400,
                message: "insufficient funds for gas".to_string(),
            })),
            MintBehavior::FailStateSaving => Err(MintError::StateSaving(RepoError::InvalidRow {
                hash: SUBMITTED_TX_HASH.to_string(),
                reason: "disk full".to_string(),
            })),
        }
    }

    async fn get_status(&self, hash: &TxHash) -> Result<TransactionRecord, StatusQueryError> {
        self.records
            .lock()
            .get(hash)
            .cloned()
            .ok_or(StatusQueryError::NotFound(*hash))
    }
}

/// Minimal MultiBaas stand-in bound to a random local port. Returns its base URL.
pub async fn spawn_fake_multibaas(signer: Address) -> String {
    let app = Router::new()
        .route(
            "/api/v0/chains/{chain}/addresses/{alias}/contracts/{label}/methods/{method}",
            post(move || async move {
                Json(json!({
                    "status": 200,
                    "message": "success",
                    "result": {
                        "kind": "TransactionToSignResponse",
                        "tx": {
                            "from": signer,
                            "to": "0x00000000000000000000000000000000000000aa",
                            "nonce": 3,
                            "data": "0x",
                            "value": "0x0",
                            "gas": 120000,
                            "gasFeeCap": "0x3b9aca00",
                            "gasTipCap": "0x1",
                            "type": 2
                        }
                    }
                }))
            }),
        )
        .route(
            "/api/v0/chains/{chain}/status",
            get(|| async {
                Json(json!({ "status": 200, "message": "success", "result": { "chainID": 1 } }))
            }),
        )
        .route(
            "/api/v0/chains/{chain}/transactions/submit",
            post(|| async {
                Json(json!({
                    "status": 200,
                    "message": "success",
                    "result": { "tx": { "hash": SUBMITTED_TX_HASH, "from": null } }
                }))
            }),
        );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{}", addr)
}
