use std::sync::Arc;

use anyhow::Context;
use sea_orm::Database;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sbt_issuer::{
    AppState,
    config::{Config, StatusCheckStrategy},
    jobs::status_poll::StatusPoll,
    router,
    services::{
        chain_gateway::ChainGateway,
        clock::{Clock, SystemClock},
        minter::SbtMinter,
        multibaas::MultiBaasClient,
        sbt_checker::SbtChecker,
        signer::{TransactionSigner, WalletSigner},
        status_checker::StatusChecker,
        transaction_checker::TransactionChecker,
        transaction_repo::{
            InMemoryTransactionRepo, PostgresTransactionRepo, TransactionRepo, UpdatePolicy,
        },
    },
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,sbt_issuer=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();

    let config = Config::from_env().context("invalid configuration")?;
    tracing::debug!(?config, "Loaded configuration");

    let repo: Arc<dyn TransactionRepo> = match &config.database_url {
        Some(database_url) => {
            tracing::info!("Connecting to database...");
            let db = Database::connect(database_url)
                .await
                .context("failed to connect to database")?;
            Arc::new(PostgresTransactionRepo::new(db, UpdatePolicy::Strict))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, transactions are kept in memory only");
            Arc::new(InMemoryTransactionRepo::new(UpdatePolicy::Strict))
        }
    };

    repo.setup().await.context("failed to set up transaction repository")?;

    let gateway: Arc<dyn ChainGateway> = Arc::new(MultiBaasClient::new(
        config.multibaas_base_url.clone(),
        config.multibaas_api_key.clone(),
        config.chain.clone(),
        config.contract_alias.clone(),
        config.contract_label.clone(),
    ));
    let signer = Arc::new(
        WalletSigner::from_private_key(&config.wallet_private_key)
            .context("invalid WALLET_PRIVATE_KEY")?,
    );
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    tracing::info!(address = %signer.address(), "Loaded minting wallet");

    let minter = SbtMinter::new(gateway.clone(), signer, repo.clone(), clock.clone());

    let checker: Arc<dyn StatusChecker> = match config.status_check_strategy {
        StatusCheckStrategy::Events => Arc::new(SbtChecker::new(
            repo.clone(),
            gateway.clone(),
            clock.clone(),
            config.grace_period,
            &config.contract_label,
        )),
        StatusCheckStrategy::Transaction => Arc::new(TransactionChecker::new(
            repo.clone(),
            gateway.clone(),
            clock.clone(),
            config.grace_period,
        )),
    };

    let poll = StatusPoll::new(checker, config.polling_interval);
    let poll_handle = poll.start();

    let app = router(AppState {
        minter: Arc::new(minter),
    });

    // Start server
    let listener = tokio::net::TcpListener::bind(config.server_addr())
        .await
        .with_context(|| format!("failed to bind {}", config.server_addr()))?;

    tracing::info!("Server listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("Shutting down status poll");
    poll.stop();
    poll_handle.await.ok();

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for ctrl-c: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
