//! Local key material: transaction signing and claimant signature checks

use std::str::FromStr;

use alloy::{
    eips::eip2718::Encodable2718,
    network::{EthereumWallet, TransactionBuilder},
    primitives::{Address, PrimitiveSignature, U256, hex},
    rpc::types::TransactionRequest,
    signers::local::PrivateKeySigner,
};
use async_trait::async_trait;

use crate::services::chain_gateway::{SignedTransaction, TransactionToSign};

#[derive(Debug, thiserror::Error)]
pub enum SignerError {
    #[error("invalid private key: {0}")]
    InvalidKey(String),
    #[error("fee value out of range: {0}")]
    FeeOutOfRange(U256),
    #[error("cannot build signed transaction: {0}")]
    Build(String),
}

#[async_trait]
pub trait TransactionSigner: Send + Sync {
    /// Address the signed transactions are sent from
    fn address(&self) -> Address;

    async fn sign(
        &self,
        tx: &TransactionToSign,
        chain_id: u64,
    ) -> Result<SignedTransaction, SignerError>;
}

/// Signs with a private key held in process memory.
#[derive(Clone)]
pub struct WalletSigner {
    wallet: EthereumWallet,
    address: Address,
}

impl WalletSigner {
    /// `private_key` is a hex string, with or without `0x`.
    pub fn from_private_key(private_key: &str) -> Result<Self, SignerError> {
        let signer: PrivateKeySigner = private_key
            .parse()
            .map_err(|e| SignerError::InvalidKey(format!("{}", e)))?;
        let address = signer.address();

        Ok(Self {
            wallet: EthereumWallet::from(signer),
            address,
        })
    }
}

fn fee(value: U256) -> Result<u128, SignerError> {
    u128::try_from(value).map_err(|_| SignerError::FeeOutOfRange(value))
}

#[async_trait]
impl TransactionSigner for WalletSigner {
    fn address(&self) -> Address {
        self.address
    }

    async fn sign(
        &self,
        tx: &TransactionToSign,
        chain_id: u64,
    ) -> Result<SignedTransaction, SignerError> {
        let mut request = TransactionRequest::default()
            .with_from(self.address)
            .with_nonce(tx.nonce)
            .with_chain_id(chain_id)
            .with_value(tx.value)
            .with_gas_limit(tx.gas)
            .with_input(tx.data.clone());

        if let Some(to) = tx.to {
            request = request.with_to(to);
        }

        // Type 0 descriptors carry the gas price in the fee cap field
        request = match tx.tx_type {
            0 => request.with_gas_price(fee(tx.gas_fee_cap)?),
            _ => request
                .with_max_fee_per_gas(fee(tx.gas_fee_cap)?)
                .with_max_priority_fee_per_gas(fee(tx.gas_tip_cap)?),
        };

        let envelope = request
            .build(&self.wallet)
            .await
            .map_err(|e| SignerError::Build(e.to_string()))?;

        Ok(hex::encode_prefixed(envelope.encoded_2718()))
    }
}

/// True if `signature` is an EIP-191 personal signature of `message` made by
/// `address`. Malformed input never verifies.
pub fn verify_signature(message: &str, signature: &str, address: &str) -> bool {
    let Ok(expected) = Address::from_str(address) else {
        return false;
    };
    let Ok(signature) = PrimitiveSignature::from_str(signature) else {
        return false;
    };

    match signature.recover_address_from_msg(message) {
        Ok(recovered) => recovered == expected,
        Err(_) => false,
    }
}
