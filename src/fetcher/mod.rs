pub mod coingecko;
pub mod coinranking;
pub mod defillama;
pub mod github;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer};

use crate::config::{CoinSource, Config};
use crate::error::Result;
use crate::types::{MarketRecord, Source};

pub use coingecko::CoinGeckoClient;
pub use coinranking::CoinrankingClient;
pub use defillama::DefiLlamaClient;
pub use github::GithubClient;

/// Market data ordered by market cap, normalized to one shape regardless of provider.
#[async_trait]
pub trait MarketSource: Send + Sync {
    /// Label recorded in `RawProspect::sources` when a record from this source matches.
    fn source(&self) -> Source;

    /// Assets whose market-cap rank falls in `[rank_min, rank_max]`.
    async fn fetch_rank_range(&self, rank_min: u32, rank_max: u32) -> Result<Vec<MarketRecord>>;
}

/// Build the market source selected by configuration. Coinranking without a
/// key fails here, before any request is sent.
pub fn market_source_for(cfg: &Config, http: reqwest::Client) -> Result<Box<dyn MarketSource>> {
    match cfg.coin_source {
        CoinSource::CoinGecko => Ok(Box::new(CoinGeckoClient::from_config(cfg, http))),
        CoinSource::Coinranking => Ok(Box::new(CoinrankingClient::from_config(cfg, http)?)),
    }
}

/// Shared reqwest client for all providers. GitHub rejects requests without a User-Agent.
pub fn http_client() -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .user_agent(concat!("crypto-prospect/", env!("CARGO_PKG_VERSION")))
        .build()?;
    Ok(client)
}

/// Accepts numbers and numeric strings; anything else is treated as absent.
pub(crate) fn value_as_f64(v: &serde_json::Value) -> Option<f64> {
    v.as_f64()
        .or_else(|| v.as_str().and_then(|s| s.trim().parse().ok()))
        .filter(|x: &f64| x.is_finite())
}

pub(crate) fn lenient_f64<'de, D>(d: D) -> std::result::Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Option::<serde_json::Value>::deserialize(d)?;
    Ok(v.as_ref().and_then(value_as_f64))
}

pub(crate) async fn pause(d: Duration) {
    if !d.is_zero() {
        tokio::time::sleep(d).await;
    }
}

/// Trim an error body for logs and error messages.
pub(crate) fn summarize_body(raw: &str) -> String {
    const MAX_CHARS: usize = 500;
    let compact = raw.replace(['\n', '\r'], " ");
    if compact.chars().count() > MAX_CHARS {
        let cut: String = compact.chars().take(MAX_CHARS).collect();
        format!("{cut}…")
    } else {
        compact
    }
}
