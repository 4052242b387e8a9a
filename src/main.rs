mod config;
mod error;
mod gemini;
mod generator;
mod models;
mod routes;
mod session;

use anyhow::Context;
use std::{net::SocketAddr, sync::Arc};
use tower_http::cors::{CorsLayer, Any};
use tracing_subscriber::{fmt, EnvFilter};

use crate::{
    config::Config,
    gemini::{GeminiClient, GenerativeBackend},
    generator::OfferGenerator,
    routes::{create_router, AppState},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("❌ Cannot start: {}", e);
            return Err(e.into());
        }
    };
    tracing::info!(
        "Using API key {} with text model {} and image model {} ({:?}, timeout {:?})",
        config.masked_key(), config.text_model, config.image_model, config.image_policy, config.call_timeout
    );

    let backend: Arc<dyn GenerativeBackend> = Arc::new(GeminiClient::new(&config)?);
    let state = AppState::new(OfferGenerator::new(backend, config.call_timeout, config.image_policy));

    let app = create_router()
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        )
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!(%addr, "Starting server");
    let listener = tokio::net::TcpListener::bind(addr).await.with_context(|| format!("binding {addr}"))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("Shutting down");
}
