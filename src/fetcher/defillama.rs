//! DeFiLlama client: the full protocol catalog in one call, filtered to the TVL band.
//! No auth and no documented rate limit, so no throttling or retry.

use serde::Deserialize;
use tracing::{debug, info};

use crate::config::{Config, TVL_MAX, TVL_MIN};
use crate::error::{AppError, Result};
use crate::fetcher::{lenient_f64, summarize_body};
use crate::types::ProtocolRecord;

#[derive(Debug, Deserialize)]
struct LlamaProtocol {
    #[serde(default)]
    id: Option<serde_json::Value>,
    name: String,
    #[serde(default)]
    slug: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    chains: Option<Vec<String>>,
    #[serde(default, deserialize_with = "lenient_f64")]
    tvl: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    change_7d: Option<f64>,
    #[serde(default)]
    gecko_id: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    twitter: Option<String>,
    #[serde(default)]
    github: Option<Vec<String>>,
}

#[derive(Debug, Clone)]
pub struct DefiLlamaClient {
    http: reqwest::Client,
    base_url: String,
}

impl DefiLlamaClient {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    pub fn from_config(cfg: &Config, http: reqwest::Client) -> Self {
        Self::new(http, cfg.defillama_url.clone())
    }

    /// `GET /protocols`, normalized and filtered. Any non-2xx is fatal.
    pub async fn fetch_protocols(&self) -> Result<Vec<ProtocolRecord>> {
        let url = format!("{}/protocols", self.base_url);
        let resp = self.http.get(&url).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AppError::Upstream {
                provider: "DeFiLlama protocols",
                status: status.as_u16(),
                body: summarize_body(&body),
            });
        }

        let items: Vec<serde_json::Value> = resp.json().await?;
        let total = items.len();
        let protocols = normalize_protocols(items);
        info!(
            total,
            eligible = protocols.len(),
            "DeFiLlama: {} of {total} protocols in TVL band ${:.0}M-${:.0}M",
            protocols.len(),
            TVL_MIN / 1e6,
            TVL_MAX / 1e6,
        );
        Ok(protocols)
    }
}

/// Keep protocols with TVL inside `[TVL_MIN, TVL_MAX]` and fill defaults.
pub fn normalize_protocols(items: Vec<serde_json::Value>) -> Vec<ProtocolRecord> {
    let mut out = Vec::new();
    for item in items {
        let p: LlamaProtocol = match serde_json::from_value(item) {
            Ok(p) => p,
            Err(e) => {
                debug!("DeFiLlama: skipping malformed protocol: {e}");
                continue;
            }
        };
        if let Some(record) = normalize_protocol(p) {
            out.push(record);
        }
    }
    out
}

fn normalize_protocol(p: LlamaProtocol) -> Option<ProtocolRecord> {
    let tvl = p.tvl.unwrap_or(0.0);
    if !(TVL_MIN..=TVL_MAX).contains(&tvl) {
        return None;
    }

    let slug = p
        .slug
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| slug_from_name(&p.name));
    let id = match p.id {
        Some(serde_json::Value::String(s)) => s,
        Some(v) if !v.is_null() => v.to_string(),
        _ => slug.clone(),
    };
    let gecko_id = p.gecko_id.filter(|g| !g.is_empty());

    Some(ProtocolRecord {
        id,
        category: p
            .category
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| "Uncategorized".to_string()),
        chains: p.chains.unwrap_or_default(),
        tvl,
        tvl_change_1m: p.change_7d,
        url_defillama: p
            .url
            .filter(|u| !u.is_empty())
            .map(|_| format!("https://defillama.com/protocol/{slug}")),
        url_coingecko: gecko_id
            .as_ref()
            .map(|g| format!("https://www.coingecko.com/en/coins/{g}")),
        url_twitter: p
            .twitter
            .filter(|t| !t.is_empty())
            .map(|t| format!("https://twitter.com/{t}")),
        url_discord: None,
        gecko_id,
        github: p.github.filter(|g| !g.is_empty()),
        name: p.name,
        slug,
    })
}

/// Lowercase, whitespace runs to single hyphens.
pub fn slug_from_name(name: &str) -> String {
    name.to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
}
