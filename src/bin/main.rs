use finsight_orchestrator::{agent::Orchestrator, config::AppConfig, models::ChatRequest};
use tracing::info;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: orchestrator <user_id> <query...>";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut args = std::env::args().skip(1);
    let user_id = args.next().ok_or(USAGE)?;
    let query = args.collect::<Vec<_>>().join(" ");
    if query.trim().is_empty() {
        return Err(USAGE.into());
    }

    let config = AppConfig::from_env()?;
    let orchestrator = Orchestrator::from_config(&config)?;

    info!(user_id = %user_id, "Running one-shot query");
    let response = orchestrator.handle_query(ChatRequest { user_id, query }).await;

    println!("\n=== ANSWER ===\n{}", response.answer);
    println!("\n=== CONTEXT ===\n{}", serde_json::to_string_pretty(&response.context)?);

    Ok(())
}
