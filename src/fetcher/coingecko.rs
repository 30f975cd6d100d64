//! CoinGecko `/coins/markets` client, rank-paginated (100 per page, market cap desc).
//!
//! Rate-limit compliance is explicit at each call site:
//! - 2s warm-up before the first page, then 1.2s between pages with a key or 2.5s without.
//! - HTTP 429: wait for `Retry-After` (60s fallback) and retry once. A second 429 fails.
//! - HTTP 400 with error code 10010/10011 (key tier does not match the base URL):
//!   retry once against the other base URL, only when a key is configured.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::{
    Config, Throttle, COINGECKO_TIER_MISMATCH_CODES, DEFAULT_RETRY_AFTER_SECS, MARKET_PAGE_SIZE,
};
use crate::error::{AppError, Result};
use crate::fetcher::{lenient_f64, pause, summarize_body, MarketSource};
use crate::types::{MarketRecord, Source};

const PROVIDER: &str = "CoinGecko markets";

#[derive(Debug, Clone, Deserialize)]
pub struct CoinGeckoMarketItem {
    pub id: String,
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub market_cap: Option<f64>,
    #[serde(default)]
    pub market_cap_rank: Option<u32>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub total_volume: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub ath_change_percentage: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub price_change_percentage_7d_in_currency: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub price_change_percentage_24h: Option<f64>,
}

impl CoinGeckoMarketItem {
    pub fn normalize(self) -> MarketRecord {
        MarketRecord {
            slug: self.symbol.to_lowercase(),
            id: self.id,
            name: self.name,
            mcap: self.market_cap.unwrap_or(0.0),
            volume: self.total_volume.unwrap_or(0.0),
            ath_change_pct: self.ath_change_percentage,
            price_change_7d: self
                .price_change_percentage_7d_in_currency
                .or(self.price_change_percentage_24h),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CoinGeckoClient {
    http: reqwest::Client,
    free_url: String,
    pro_url: String,
    api_key: Option<String>,
    pro: bool,
    max_pages: u32,
    throttle: Throttle,
}

impl CoinGeckoClient {
    pub fn from_config(cfg: &Config, http: reqwest::Client) -> Self {
        Self {
            http,
            free_url: cfg.coingecko_free_url.clone(),
            pro_url: cfg.coingecko_pro_url.clone(),
            api_key: cfg.coingecko_api_key.clone(),
            pro: cfg.coingecko_pro,
            max_pages: cfg.coingecko_max_pages,
            throttle: cfg.throttle,
        }
    }

    /// Pro base only when explicitly requested; demo keys must use the free base.
    fn base_url(&self) -> &str {
        if self.pro {
            &self.pro_url
        } else {
            &self.free_url
        }
    }

    fn alternate_base(&self, base: &str) -> &str {
        if base == self.pro_url {
            &self.free_url
        } else {
            &self.pro_url
        }
    }

    async fn get_page(&self, base: &str, page: u32) -> Result<reqwest::Response> {
        let url = format!(
            "{base}/coins/markets?vs_currency=usd&order=market_cap_desc&per_page={MARKET_PAGE_SIZE}&page={page}"
        );
        let mut req = self.http.get(&url);
        if let Some(key) = &self.api_key {
            let header = if base == self.pro_url {
                "x-cg-pro-api-key"
            } else {
                "x-cg-demo-api-key"
            };
            req = req.header(header, key);
        }
        Ok(req.send().await?)
    }

    /// One page of 100 coins. Page N covers ranks (N-1)*100+1 ..= N*100.
    pub async fn fetch_markets_page(&self, page: u32) -> Result<Vec<CoinGeckoMarketItem>> {
        let base = self.base_url();
        let mut resp = self.get_page(base, page).await?;

        if resp.status() == StatusCode::TOO_MANY_REQUESTS {
            let wait_secs = retry_after_secs(resp.headers());
            warn!(page, wait_secs, "CoinGecko 429, waiting before single retry");
            tokio::time::sleep(Duration::from_secs(wait_secs)).await;
            resp = self.get_page(base, page).await?;
            if resp.status() == StatusCode::TOO_MANY_REQUESTS {
                return Err(AppError::RateLimited {
                    provider: PROVIDER,
                    retry_after_secs: wait_secs,
                });
            }
        }

        if resp.status() == StatusCode::BAD_REQUEST && self.api_key.is_some() {
            let body = resp.text().await.unwrap_or_default();
            match provider_error_code(&body) {
                Some(code) if COINGECKO_TIER_MISMATCH_CODES.contains(&code) => {
                    let alt = self.alternate_base(base);
                    warn!(
                        page,
                        code,
                        alt,
                        "CoinGecko key/base mismatch, retrying on alternate base"
                    );
                    resp = self.get_page(alt, page).await?;
                }
                _ => {
                    return Err(AppError::Upstream {
                        provider: PROVIDER,
                        status: 400,
                        body: summarize_body(&body),
                    });
                }
            }
        }

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AppError::Upstream {
                provider: PROVIDER,
                status: status.as_u16(),
                body: summarize_body(&body),
            });
        }

        Ok(resp.json().await?)
    }
}

#[async_trait]
impl MarketSource for CoinGeckoClient {
    fn source(&self) -> Source {
        Source::Coingecko
    }

    /// Pages only coarsely bound rank, so out-of-band items are dropped after fetch.
    async fn fetch_rank_range(&self, rank_min: u32, rank_max: u32) -> Result<Vec<MarketRecord>> {
        let Some((start_page, end_page)) = page_span(rank_min, rank_max, self.max_pages) else {
            return Ok(Vec::new());
        };
        let page_delay = if self.api_key.is_some() {
            self.throttle.coingecko_page_with_key
        } else {
            self.throttle.coingecko_page_without_key
        };

        pause(self.throttle.coingecko_warmup).await;

        let mut all = Vec::new();
        for page in start_page..=end_page {
            if page > start_page {
                pause(page_delay).await;
            }
            let items = self.fetch_markets_page(page).await?;
            debug!(page, items = items.len(), "CoinGecko page fetched");
            if items.is_empty() {
                break;
            }
            all.extend(
                items
                    .into_iter()
                    .filter(|c| {
                        let rank = c.market_cap_rank.unwrap_or(0);
                        rank >= rank_min && rank <= rank_max
                    })
                    .map(CoinGeckoMarketItem::normalize),
            );
        }

        info!(
            coins = all.len(),
            pages = end_page - start_page + 1,
            "CoinGecko: {} coins in rank {rank_min}-{rank_max}",
            all.len()
        );
        Ok(all)
    }
}

/// Inclusive page indices covering `[rank_min, rank_max]`, capped at `max_pages`.
pub fn page_span(rank_min: u32, rank_max: u32, max_pages: u32) -> Option<(u32, u32)> {
    if max_pages == 0 || rank_min == 0 || rank_max < rank_min {
        return None;
    }
    let start = (rank_min - 1) / MARKET_PAGE_SIZE + 1;
    let end = ((rank_max - 1) / MARKET_PAGE_SIZE + 1).min(start + max_pages - 1);
    Some((start, end))
}

/// Seconds from `Retry-After`; missing, unparseable or zero falls back to 60.
pub fn retry_after_secs(headers: &reqwest::header::HeaderMap) -> u64 {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .filter(|&s| s > 0)
        .unwrap_or(DEFAULT_RETRY_AFTER_SECS)
}

/// CoinGecko puts the code either at the top level or under `status`.
fn provider_error_code(body: &str) -> Option<i64> {
    let v: serde_json::Value = serde_json::from_str(body).ok()?;
    let code = v
        .get("error_code")
        .or_else(|| v.get("status").and_then(|s| s.get("error_code")))?;
    code.as_i64()
        .or_else(|| code.as_str().and_then(|s| s.trim().parse().ok()))
}
