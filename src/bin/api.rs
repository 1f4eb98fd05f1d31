use finsight_orchestrator::{agent::Orchestrator, api::start_server, config::AppConfig};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AppConfig::from_env()?;
    if config.generation.api_key.is_empty() {
        warn!("GEMINI_API_KEY not set; every generation call will fail and fall back");
    }

    info!("FinSight Orchestrator - API Server");
    info!(port = config.port, upstream = %config.upstream.base_url, "Configuration loaded");

    let orchestrator = Arc::new(Orchestrator::from_config(&config)?);

    info!("Starting API server...");
    start_server(orchestrator, config.port).await?;

    Ok(())
}
