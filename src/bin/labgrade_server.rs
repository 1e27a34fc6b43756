//! HTTP service binary for labgrader.

use anyhow::{Context, Result};
use labgrader::server::{router, AppState, ServerConfig};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = ServerConfig::from_env().context("Invalid server configuration")?;
    tracing::info!(
        port = config.port,
        mode_lock = config.mode_lock.as_str(),
        "starting labgrade-server"
    );
    if !labgrader::analyze::anthropic_key_present() {
        tracing::warn!("No API key configured - /api/analyze will return 500 until one is set");
    }

    let addr = config.bind_address();
    let app = router(AppState {
        config: Arc::new(config),
    });

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!("Server listening on http://{addr}");
    tracing::info!("Health check available at http://{addr}/health");

    axum::serve(listener, app).await?;
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "labgrader=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
