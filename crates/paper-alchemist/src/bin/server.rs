//! paper-alchemist HTTP server
//!
//! Run with: cargo run -p paper-alchemist --bin paper-alchemist-server [config.toml]

use paper_alchemist::{config::AlchemistConfig, providers::OllamaClient, server::AlchemistServer};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "paper_alchemist=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = AlchemistConfig::load(config_path.as_deref())?;

    tracing::info!("Configuration loaded");
    tracing::info!("  - Database: {}", config.database_path().display());
    tracing::info!("  - Vision model: {}", config.vision.model);
    tracing::info!(
        "  - Embedding model: {} ({} dims)",
        config.embeddings.model,
        config.embeddings.dimensions
    );
    tracing::info!("  - Metadata model: {}", config.metadata.model);

    tracing::info!("Checking Ollama at {}...", config.ollama.base_url);
    let ollama = OllamaClient::new(&config.ollama)?;
    match ollama.health_check().await {
        Ok(true) => tracing::info!("Ollama is running"),
        _ => {
            tracing::warn!("Ollama not available at {}", config.ollama.base_url);
            tracing::warn!(
                "Start it with `ollama serve` and pull {}, {} and {}",
                config.vision.model,
                config.embeddings.model,
                config.metadata.model
            );
        }
    }

    let server = AlchemistServer::new(config)?;

    println!("\nServer starting...");
    println!("  API: http://{}", server.address());
    println!("  Health: http://{}/health", server.address());
    println!("  API Info: http://{}/api/info", server.address());
    println!("\nPress Ctrl+C to stop\n");

    server.start().await?;

    Ok(())
}
