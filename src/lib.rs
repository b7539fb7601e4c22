// src/lib.rs

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use services::minter::SbtMint;

#[derive(Clone)]
pub struct AppState {
    pub minter: Arc<dyn SbtMint>,
}

pub mod entities {
    pub mod transactions;
}

pub mod services {
    pub mod chain_gateway;
    pub mod clock;
    pub mod minter;
    pub mod multibaas;
    pub mod sbt_checker;
    pub mod signer;
    pub mod status_checker;
    pub mod transaction_checker;
    pub mod transaction_repo;

    #[cfg(test)]
    pub(crate) mod testing;
}

pub mod config;
pub mod handlers;
pub mod jobs;
pub mod models;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/claim", post(handlers::claim::claim))
        .route("/status", get(handlers::status::get_status))
        .route("/health", get(handlers::health::health))
        .fallback(handlers::error::not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
