//! Coinranking `/coins` client, offset-paginated. Requires an API key.
//! Numeric fields arrive as strings; drawdown and 7d change are derived here.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

use crate::config::{Config, Throttle, MARKET_PAGE_SIZE};
use crate::error::{AppError, Result};
use crate::fetcher::{lenient_f64, pause, summarize_body, MarketSource};
use crate::types::{MarketRecord, Source};

#[derive(Debug, Clone, Deserialize)]
pub struct CoinrankingCoin {
    pub uuid: String,
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "marketCap", deserialize_with = "lenient_f64")]
    pub market_cap: Option<f64>,
    #[serde(default, rename = "24hVolume", deserialize_with = "lenient_f64")]
    pub volume_24h: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub price: Option<f64>,
    /// Percentage change over `timePeriod` (requested as 7d).
    #[serde(default, deserialize_with = "lenient_f64")]
    pub change: Option<f64>,
    #[serde(default, rename = "allTimeHigh")]
    pub all_time_high: Option<AllTimeHigh>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AllTimeHigh {
    #[serde(default, deserialize_with = "lenient_f64")]
    pub price: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct CoinsEnvelope {
    status: String,
    #[serde(default)]
    data: Option<CoinsData>,
}

#[derive(Debug, Deserialize)]
struct CoinsData {
    coins: Vec<CoinrankingCoin>,
}

impl CoinrankingCoin {
    pub fn normalize(self) -> MarketRecord {
        let ath_price = self.all_time_high.as_ref().and_then(|a| a.price);
        MarketRecord {
            slug: self.symbol.to_lowercase(),
            id: self.uuid,
            name: self.name,
            mcap: self.market_cap.unwrap_or(0.0),
            volume: self.volume_24h.unwrap_or(0.0),
            ath_change_pct: ath_drawdown_pct(self.price, ath_price),
            price_change_7d: self.change,
        }
    }
}

/// `(price - ath) / ath * 100`, only when both are known and ath > 0.
pub fn ath_drawdown_pct(price: Option<f64>, ath_price: Option<f64>) -> Option<f64> {
    match (price, ath_price) {
        (Some(p), Some(ath)) if ath > 0.0 => Some((p - ath) / ath * 100.0),
        _ => None,
    }
}

#[derive(Debug, Clone)]
pub struct CoinrankingClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    throttle: Throttle,
}

impl CoinrankingClient {
    /// Fails fast when no key is configured.
    pub fn from_config(cfg: &Config, http: reqwest::Client) -> Result<Self> {
        let api_key = cfg.coinranking_api_key.clone().ok_or_else(|| {
            AppError::Config(
                "COINRANKING_API_KEY is required when using Coinranking as coin source.".to_string(),
            )
        })?;
        Ok(Self {
            http,
            base_url: cfg.coinranking_url.clone(),
            api_key,
            throttle: cfg.throttle,
        })
    }

    /// One page of coins ordered by market cap, `offset` 0 = rank 1.
    pub async fn fetch_coins_page(&self, offset: u32, limit: u32) -> Result<Vec<CoinrankingCoin>> {
        let url = format!("{}/coins", self.base_url);
        let resp = self
            .http
            .get(&url)
            .query(&[
                ("orderBy", "marketCap".to_string()),
                ("orderDirection", "desc".to_string()),
                ("limit", limit.to_string()),
                ("offset", offset.to_string()),
                ("timePeriod", "7d".to_string()),
            ])
            .header("x-access-token", &self.api_key)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AppError::Upstream {
                provider: "Coinranking coins",
                status: status.as_u16(),
                body: summarize_body(&body),
            });
        }

        let envelope: CoinsEnvelope = resp.json().await?;
        match envelope.data {
            Some(data) if envelope.status == "success" => Ok(data.coins),
            _ => Err(AppError::InvalidResponse(format!(
                "Coinranking returned status {:?} without coins",
                envelope.status
            ))),
        }
    }
}

#[async_trait]
impl MarketSource for CoinrankingClient {
    fn source(&self) -> Source {
        Source::Coinranking
    }

    async fn fetch_rank_range(&self, rank_min: u32, rank_max: u32) -> Result<Vec<MarketRecord>> {
        if rank_min == 0 || rank_max < rank_min {
            return Ok(Vec::new());
        }
        let limit = MARKET_PAGE_SIZE;
        let start_offset = rank_min - 1;
        let num_pages = (rank_max - rank_min + 1).div_ceil(limit);

        pause(self.throttle.coinranking_warmup).await;

        let mut all = Vec::new();
        'pages: for i in 0..num_pages {
            let offset = start_offset + i * limit;
            let coins = self.fetch_coins_page(offset, limit).await?;
            debug!(offset, coins = coins.len(), "Coinranking page fetched");
            if coins.is_empty() {
                break;
            }
            let full_page = coins.len() as u32 >= limit;

            for (j, coin) in coins.into_iter().enumerate() {
                let rank = offset + j as u32 + 1;
                if rank > rank_max {
                    break 'pages;
                }
                all.push(coin.normalize());
            }

            if !full_page {
                break;
            }
            pause(self.throttle.coinranking_page).await;
        }

        info!(
            coins = all.len(),
            "Coinranking: {} coins in rank {rank_min}-{rank_max}",
            all.len()
        );
        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::{http_client, stub};
    use axum::{
        extract::Query,
        http::{HeaderMap, StatusCode},
        response::IntoResponse,
        routing::get,
        Json, Router,
    };
    use serde_json::json;
    use std::collections::HashMap;

    fn client(base: &str) -> CoinrankingClient {
        let cfg = Config {
            coinranking_url: base.to_string(),
            coinranking_api_key: Some("test-key".to_string()),
            throttle: Throttle::none(),
            ..Config::default()
        };
        CoinrankingClient::from_config(&cfg, http_client().unwrap()).unwrap()
    }

    fn mid_cap_coin() -> serde_json::Value {
        json!({
            "uuid": "cr-uuid-1",
            "symbol": "MID",
            "name": "Mid Cap Coin",
            "marketCap": "100000000",
            "24hVolume": "5000000",
            "price": "1.5",
            "change": "-2.5",
            "allTimeHigh": {"price": "2.0", "timestamp": 1600000000}
        })
    }

    #[test]
    fn drawdown_requires_positive_ath() {
        assert_eq!(ath_drawdown_pct(Some(1.5), Some(2.0)), Some(-25.0));
        assert_eq!(ath_drawdown_pct(Some(1.5), Some(0.0)), None);
        assert_eq!(ath_drawdown_pct(None, Some(2.0)), None);
        assert_eq!(ath_drawdown_pct(Some(1.5), None), None);
    }

    #[test]
    fn missing_key_fails_fast() {
        let err = CoinrankingClient::from_config(&Config::default(), http_client().unwrap())
            .unwrap_err();
        assert!(err.to_string().contains("COINRANKING_API_KEY is required"));
    }

    #[tokio::test]
    async fn normalizes_string_fields_and_stops_on_short_page() {
        let router = Router::new().route(
            "/coins",
            get(|headers: HeaderMap, Query(q): Query<HashMap<String, String>>| async move {
                if headers.get("x-access-token").and_then(|v| v.to_str().ok()) != Some("test-key") {
                    return StatusCode::UNAUTHORIZED.into_response();
                }
                let coins = if q.get("offset").map(String::as_str) == Some("199") {
                    vec![mid_cap_coin()]
                } else {
                    vec![]
                };
                Json(json!({"status": "success", "data": {"coins": coins}})).into_response()
            }),
        );
        let base = stub::serve(router).await;
        let records = client(&base).fetch_rank_range(200, 2000).await.unwrap();
        assert_eq!(
            records,
            vec![MarketRecord {
                id: "cr-uuid-1".to_string(),
                name: "Mid Cap Coin".to_string(),
                slug: "mid".to_string(),
                mcap: 100_000_000.0,
                volume: 5_000_000.0,
                ath_change_pct: Some(-25.0),
                price_change_7d: Some(-2.5),
            }]
        );
    }

    #[tokio::test]
    async fn stops_at_rank_ceiling() {
        let router = Router::new().route(
            "/coins",
            get(|Query(q): Query<HashMap<String, String>>| async move {
                let offset: u32 = q.get("offset").and_then(|o| o.parse().ok()).unwrap_or(0);
                let coins: Vec<_> = (0..100)
                    .map(|j| {
                        json!({
                            "uuid": format!("c{}", offset + j + 1),
                            "symbol": "X",
                            "name": "X",
                            "price": "1"
                        })
                    })
                    .collect();
                Json(json!({"status": "success", "data": {"coins": coins}}))
            }),
        );
        let base = stub::serve(router).await;
        let records = client(&base).fetch_rank_range(200, 350).await.unwrap();
        assert_eq!(records.len(), 151);
        assert_eq!(records.first().unwrap().id, "c200");
        assert_eq!(records.last().unwrap().id, "c350");
        assert!(records.iter().all(|r| r.ath_change_pct.is_none()));
    }

    #[tokio::test]
    async fn rejects_non_success_envelope() {
        let router = Router::new().route(
            "/coins",
            get(|| async { Json(json!({"status": "fail", "message": "nope"})) }),
        );
        let base = stub::serve(router).await;
        let err = client(&base).fetch_coins_page(0, 100).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidResponse(_)));
    }
}
