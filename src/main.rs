//! CashAI backend
//!
//! Backend-for-frontend that links users' bank accounts through Plaid,
//! relays balances and transactions, and serves an operator dashboard.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cashai_backend::aggregator::PlaidClient;
use cashai_backend::crypto::CredentialCipher;
use cashai_backend::session::SessionTokens;
use cashai_backend::store::CredentialStore;
use cashai_backend::{build_router, db, AppState, Config};

/// Initialize tracing/logging; `LOG_FORMAT=json` selects structured output
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "cashai_backend=debug,tower_http=debug".into());
    let json = std::env::var("LOG_FORMAT").is_ok_and(|format| format.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    init_tracing();

    let config = Config::from_env()?;

    tracing::info!(
        environment = %config.environment,
        plaid_env = %config.plaid_env,
        "Starting CashAI backend"
    );
    tracing::info!("Connecting to database...");

    let pool = db::create_pool(&config.database_url, config.database_max_connections).await?;
    db::run_migrations(&pool).await?;

    tracing::info!("Database connected successfully");

    let cipher = match config.credential_key.as_deref() {
        Some(key) => CredentialCipher::from_encoded_key(key)?,
        None => {
            tracing::warn!("CREDENTIAL_ENCRYPTION_KEY not set; deriving key from JWT_SECRET");
            CredentialCipher::derived_from(&config.jwt_secret)
        }
    };

    let addr = config.server_address();
    let state = AppState::new(
        CredentialStore::new(pool.clone(), cipher),
        SessionTokens::new(config.jwt_secret.as_bytes()),
        Arc::new(PlaidClient::from_config(&config)),
        config,
    );
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(addr.as_str()).await?;
    tracing::info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutting down...");
    pool.close().await;
    tracing::info!("Database connections closed. Goodbye!");

    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
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
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }
}
