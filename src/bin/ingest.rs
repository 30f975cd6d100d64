//! Batch ingestion job. Meant for a scheduler (cron, CI); runs for minutes
//! because of the mandatory inter-page delays.

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crypto_prospect::config::Config;
use crypto_prospect::db::SqliteStore;
use crypto_prospect::error::Result;
use crypto_prospect::ingest::{run_ingestion_and_save, IngestOptions};

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
        error!("Ingestion failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    let store = SqliteStore::connect(cfg.require_database_url()?).await?;
    let options = IngestOptions {
        coingecko_max_pages: Some(cfg.coingecko_max_pages),
        max_github_requests: Some(cfg.max_github_requests),
    };
    let written = run_ingestion_and_save(&cfg, &store, &options).await?;
    info!(written, "Done. Wrote {written} prospects");
    Ok(())
}
