use std::str::FromStr;

use alloy::primitives::Address;
use axum::{Json, extract::State};

use crate::AppState;
use crate::handlers::error::ApiError;
use crate::handlers::params::{QueryPairs, single_param};
use crate::models::transaction::ClaimResponse;
use crate::services::signer::verify_signature;

/// `POST /claim?to=<address>&signature=<signature>`
///
/// `signature` must be the recipient's personal signature over its own
/// address string exactly as sent in `to`. Nothing is minted otherwise.
pub async fn claim(
    State(state): State<AppState>,
    query: QueryPairs,
) -> Result<Json<ClaimResponse>, ApiError> {
    let to = single_param(&query, "to")?;
    let recipient = Address::from_str(&to).map_err(|_| {
        ApiError::BadRequest("\"to\" query parameter is not a valid Ethereum address".to_string())
    })?;
    let signature = single_param(&query, "signature")?;

    if !verify_signature(&to, &signature, &to) {
        tracing::warn!(to = %to, "Could not verify signature");
        return Err(ApiError::Unauthorized("Could not verify signature".to_string()));
    }

    let tx_hash = state.minter.start_minting(recipient).await?;

    tracing::info!(to = %recipient, tx_hash = %tx_hash, "Claim accepted");

    Ok(Json(ClaimResponse {
        tx_hash: tx_hash.to_string(),
    }))
}
