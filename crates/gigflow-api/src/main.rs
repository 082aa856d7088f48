//! # gigflow-api — Binary Entry Point
//!
//! Loads configuration from the environment, connects the ledger
//! (PostgreSQL when `DATABASE_URL` is set, in-memory otherwise) and serves
//! the API.

use anyhow::Context;
use gigflow_api::config::{AppConfig, LogFormat};
use gigflow_api::AppState;
use gigflow_ledger::Ledger;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env().context("loading configuration")?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt().json().with_env_filter(filter).init(),
        LogFormat::Pretty => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
    tracing::debug!(?config, "configuration loaded");

    if config.auth_token.is_none() {
        tracing::warn!("AUTH_TOKEN not set, bearer secrets are not checked");
    }

    let ledger = Ledger::from_url(config.database_url.as_deref())
        .await
        .map_err(|e| {
            tracing::error!("ledger initialization failed: {e}");
            e
        })
        .context("connecting ledger")?;
    tracing::info!(backend = ledger.kind(), "ledger ready");

    let port = config.port;
    let app = gigflow_api::app(AppState::new(config, ledger));

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("gigflow API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    axum::serve(listener, app).await?;

    Ok(())
}
