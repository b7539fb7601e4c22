//! Hand-written doubles for the chain gateway, the signer and the repository

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use alloy::primitives::{Address, Bytes, TxHash, U256};
use async_trait::async_trait;
use parking_lot::Mutex;

use crate::models::transaction::TransactionRecord;
use crate::services::chain_gateway::{
    ChainEvent, ChainGateway, ChainStatus, EventFilter, GatewayError, MethodCallResult,
    SignedTransaction, SubmittedTransaction, TransactionData, TransactionToSign,
};
use crate::services::signer::{SignerError, TransactionSigner};
use crate::services::transaction_repo::{InMemoryTransactionRepo, RepoError, TransactionRepo};

pub const VALID_TX_HASH: &str =
    "0x3cbc6345a67a276f3ba132b8655dcebd0ca249b5c9b77fc6361f3ae89bd0a928";

pub fn gateway_failure(message: &str) -> GatewayError {
    GatewayError::Api {
        status: 500,
        message: message.to_string(),
    }
}

pub fn dummy_tx_to_sign() -> TransactionToSign {
    TransactionToSign {
        from: Some(Address::repeat_byte(0x0b)),
        to: Some(Address::repeat_byte(0x0a)),
        nonce: 7,
        data: Bytes::new(),
        value: U256::ZERO,
        gas: 90_000,
        gas_fee_cap: U256::ZERO,
        gas_tip_cap: U256::ZERO,
        tx_type: 2,
    }
}

/// Gateway whose answers are set per test. Errors are given as messages and
/// turned into `GatewayError::Api` on every call.
pub struct MockGateway {
    pub contract_calls: Mutex<HashMap<String, Result<MethodCallResult, String>>>,
    pub chain_status: Mutex<Result<ChainStatus, String>>,
    pub submit: Mutex<Result<SubmittedTransaction, String>>,
    pub transactions: Mutex<HashMap<TxHash, Result<Option<TransactionData>, String>>>,
    pub events: Mutex<Result<Vec<ChainEvent>, String>>,
    pub calls: Mutex<Vec<String>>,
    pub submitted: Mutex<Vec<SignedTransaction>>,
}

impl Default for MockGateway {
    fn default() -> Self {
        let mut contract_calls = HashMap::new();
        contract_calls.insert(
            "safeMint".to_string(),
            Ok(MethodCallResult::TransactionToSign {
                tx: dummy_tx_to_sign(),
            }),
        );

        Self {
            contract_calls: Mutex::new(contract_calls),
            chain_status: Mutex::new(Ok(ChainStatus { chain_id: 1 })),
            submit: Mutex::new(Ok(SubmittedTransaction {
                hash: VALID_TX_HASH.parse().unwrap(),
                from: None,
                to: Some(Address::repeat_byte(0x0a)),
                value: Some(U256::ZERO),
                nonce: Some(7),
                gas: Some(90_000),
            })),
            transactions: Mutex::new(HashMap::new()),
            events: Mutex::new(Ok(vec![])),
            calls: Mutex::new(vec![]),
            submitted: Mutex::new(vec![]),
        }
    }
}

impl MockGateway {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls.lock().iter().filter(|c| c.as_str() == call).count()
    }

    fn record(&self, call: &str) {
        self.calls.lock().push(call.to_string());
    }
}

#[async_trait]
impl ChainGateway for MockGateway {
    async fn call_contract_function(
        &self,
        method: &str,
        _args: Vec<serde_json::Value>,
        _from: Option<Address>,
    ) -> Result<MethodCallResult, GatewayError> {
        self.record(method);
        match self.contract_calls.lock().get(method) {
            Some(Ok(result)) => Ok(result.clone()),
            Some(Err(message)) => Err(gateway_failure(message)),
            None => Err(gateway_failure("no such method")),
        }
    }

    async fn get_chain_status(&self) -> Result<ChainStatus, GatewayError> {
        self.record("getChainStatus");
        self.chain_status.lock().clone().map_err(|m| gateway_failure(&m))
    }

    async fn submit_signed_transaction(
        &self,
        signed: &SignedTransaction,
    ) -> Result<SubmittedTransaction, GatewayError> {
        self.record("submitSignedTransaction");
        self.submitted.lock().push(signed.clone());
        self.submit.lock().clone().map_err(|m| gateway_failure(&m))
    }

    async fn get_transaction(
        &self,
        hash: &TxHash,
    ) -> Result<Option<TransactionData>, GatewayError> {
        self.record("getTransaction");
        match self.transactions.lock().get(hash) {
            Some(Ok(data)) => Ok(data.clone()),
            Some(Err(message)) => Err(gateway_failure(message)),
            None => Ok(None),
        }
    }

    async fn list_events(&self, _filter: &EventFilter) -> Result<Vec<ChainEvent>, GatewayError> {
        self.record("listEvents");
        self.events.lock().clone().map_err(|m| gateway_failure(&m))
    }
}

pub struct MockSigner {
    pub address: Address,
    pub fail: Mutex<bool>,
    pub chain_ids: Mutex<Vec<u64>>,
}

impl MockSigner {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            fail: Mutex::new(false),
            chain_ids: Mutex::new(vec![]),
        }
    }
}

#[async_trait]
impl TransactionSigner for MockSigner {
    fn address(&self) -> Address {
        self.address
    }

    async fn sign(
        &self,
        _tx: &TransactionToSign,
        chain_id: u64,
    ) -> Result<SignedTransaction, SignerError> {
        self.chain_ids.lock().push(chain_id);
        if *self.fail.lock() {
            return Err(SignerError::Build("signing failed".to_string()));
        }
        Ok("0x02f8".to_string())
    }
}

/// In-memory repository with switchable failures and a write counter.
#[derive(Default)]
pub struct FlakyRepo {
    pub inner: InMemoryTransactionRepo,
    pub fail_create: Mutex<bool>,
    pub fail_get_all_pending: Mutex<bool>,
    pub fail_update_for: Mutex<Vec<TxHash>>,
    pub updates: AtomicUsize,
}

impl FlakyRepo {
    pub fn update_count(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }
}

fn injected() -> RepoError {
    RepoError::InvalidRow {
        hash: "-".to_string(),
        reason: "injected failure".to_string(),
    }
}

#[async_trait]
impl TransactionRepo for FlakyRepo {
    async fn setup(&self) -> Result<(), RepoError> {
        Ok(())
    }

    async fn create(&self, record: &TransactionRecord) -> Result<(), RepoError> {
        if *self.fail_create.lock() {
            return Err(injected());
        }
        self.inner.create(record).await
    }

    async fn update(&self, record: &TransactionRecord) -> Result<(), RepoError> {
        if self.fail_update_for.lock().contains(&record.hash) {
            return Err(injected());
        }
        self.updates.fetch_add(1, Ordering::SeqCst);
        self.inner.update(record).await
    }

    async fn update_if_pending(&self, record: &TransactionRecord) -> Result<bool, RepoError> {
        if self.fail_update_for.lock().contains(&record.hash) {
            return Err(injected());
        }
        self.updates.fetch_add(1, Ordering::SeqCst);
        self.inner.update_if_pending(record).await
    }

    async fn get(&self, hash: &TxHash) -> Result<Option<TransactionRecord>, RepoError> {
        self.inner.get(hash).await
    }

    async fn get_all_pending(&self) -> Result<Vec<TransactionRecord>, RepoError> {
        if *self.fail_get_all_pending.lock() {
            return Err(injected());
        }
        self.inner.get_all_pending().await
    }
}
