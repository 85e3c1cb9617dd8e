mod auth;
mod config;
mod error;
mod routes;

use std::sync::Arc;

use config::{AppConfig, DatabaseTarget};
use routes::{app_router, AppState};
use trailsync_core::services::spawn_quota_reconciliation;
use trailsync_core::Database;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Only load .env in development; production uses platform-native env injection.
    #[cfg(debug_assertions)]
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("trailsync_api=info".parse()?)
                .add_directive("trailsync_core=info".parse()?),
        )
        .init();

    let config = Arc::new(AppConfig::from_env()?);
    tracing::info!("Starting trailsync-api with config: {:?}", config);

    let db = match &config.database {
        DatabaseTarget::Local(path) => Database::open(path).await?,
        DatabaseTarget::Remote { url, auth_token } => {
            Database::open_remote(url.as_str(), auth_token.as_str()).await?
        }
    };
    let db = Arc::new(db);
    let reconciler = spawn_quota_reconciliation(Arc::clone(&db), config.reconcile_interval);

    let bind_addr = config.bind_addr.clone();
    let router = app_router(AppState::new(config, db));

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("trailsync-api listening on {}", bind_addr);
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    reconciler.abort();
    tracing::info!("trailsync-api stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::warn!(%error, "Could not listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
