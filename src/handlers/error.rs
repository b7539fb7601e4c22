use axum::{
    Json,
    http::{Method, StatusCode, Uri},
    response::{IntoResponse, Response},
};

use crate::models::transaction::ErrorResponse;
use crate::services::minter::{MintError, StatusQueryError};

/// Error returned by HTTP handlers. Only `message` reaches the client; the
/// cause of an internal error is logged and dropped.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Unauthorized(String),
    NotFound(String),
    Internal {
        message: String,
        cause: anyhow::Error,
    },
}

impl ApiError {
    pub fn internal(message: impl Into<String>, cause: impl Into<anyhow::Error>) -> Self {
        ApiError::Internal {
            message: message.into(),
            cause: cause.into(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ApiError::BadRequest(message)
            | ApiError::Unauthorized(message)
            | ApiError::NotFound(message)
            | ApiError::Internal { message, .. } => message,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        match &self {
            ApiError::Internal { message, cause } => {
                let cause = format!("{:#}", cause);
                tracing::error!(status = status.as_u16(), cause = %cause, "{}", message);
            }
            _ => {
                tracing::warn!(status = status.as_u16(), "{}", self.message());
            }
        }

        let body = ErrorResponse {
            error: self.message().to_string(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<MintError> for ApiError {
    fn from(err: MintError) -> Self {
        if err.is_tracking_gap() {
            tracing::error!("Minted transaction is missing from the repository");
        }
        ApiError::internal("Failed to start minting", err)
    }
}

impl From<StatusQueryError> for ApiError {
    fn from(err: StatusQueryError) -> Self {
        match err {
            StatusQueryError::NotFound(_) => ApiError::NotFound("Transaction not found".to_string()),
            StatusQueryError::Repo(_) => ApiError::internal("Failed to get transaction status", err),
        }
    }
}

pub async fn not_found(method: Method, uri: Uri) -> Response {
    tracing::warn!(method = %method, path = %uri.path(), "Unknown route");
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: "Not found".to_string(),
        }),
    )
        .into_response()
}
