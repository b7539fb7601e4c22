use alloy::primitives::TxHash;
use axum::{Json, extract::State};

use crate::AppState;
use crate::handlers::error::ApiError;
use crate::handlers::params::{QueryPairs, single_param};
use crate::models::transaction::StatusResponse;

// GET /status?txHash=<hash>
pub async fn get_status(
    State(state): State<AppState>,
    query: QueryPairs,
) -> Result<Json<StatusResponse>, ApiError> {
    let tx_hash: TxHash = single_param(&query, "txHash")?.parse().map_err(|_| {
        ApiError::BadRequest("\"txHash\" query parameter is not a valid transaction hash".to_string())
    })?;

    let record = state.minter.get_status(&tx_hash).await?;

    Ok(Json(StatusResponse::from(record)))
}
