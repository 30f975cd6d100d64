use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crypto_prospect::api::{router, ApiState};
use crypto_prospect::config::Config;
use crypto_prospect::db::SqliteStore;
use crypto_prospect::drafting::DraftingClient;
use crypto_prospect::error::Result;
use crypto_prospect::fetcher::http_client;

#[tokio::main]
async fn main() {
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    // --- Database setup ---
    let store = SqliteStore::connect(cfg.require_database_url()?).await?;

    // --- Drafting (optional) ---
    let drafting = DraftingClient::from_config(&cfg, http_client()?);
    if drafting.is_none() {
        warn!("ANTHROPIC_API_KEY not set: /drafts/* will answer 503");
    }

    // --- HTTP API server ---
    let app = router(ApiState {
        store: Arc::new(store),
        drafting,
    });
    let bind_addr = format!("0.0.0.0:{}", cfg.api_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("HTTP API listening on {bind_addr}");

    axum::serve(listener, app).await?;

    Ok(())
}
