use std::time::Duration;

use crate::error::{AppError, Result};

pub const DEFILLAMA_API_URL: &str = "https://api.llama.fi";
pub const COINGECKO_FREE_API_URL: &str = "https://api.coingecko.com/api/v3";
pub const COINGECKO_PRO_API_URL: &str = "https://pro-api.coingecko.com/api/v3";
pub const COINRANKING_API_URL: &str = "https://api.coinranking.com/v2";
pub const GITHUB_API_URL: &str = "https://api.github.com";
pub const ANTHROPIC_API_URL: &str = "https://api.anthropic.com";

/// DeFiLlama TVL eligibility band in USD (both ends inclusive).
pub const TVL_MIN: f64 = 10_000_000.0;
pub const TVL_MAX: f64 = 100_000_000.0;

/// Market-cap rank interval targeted by both market-data sources.
pub const RANK_MIN: u32 = 200;
pub const RANK_MAX: u32 = 2000;

/// Items per page for both market-data sources.
pub const MARKET_PAGE_SIZE: u32 = 100;

/// Retry-After fallback when a 429 carries no usable header.
pub const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

/// CoinGecko error codes meaning "key tier does not match this base URL".
pub const COINGECKO_TIER_MISMATCH_CODES: &[i64] = &[10010, 10011];

/// Below this TVL a non-VC-backed prospect is capped at `TREASURY_GATE_CAP`.
pub const TREASURY_GATE_TVL: f64 = 5_000_000.0;
pub const TREASURY_GATE_CAP: f64 = 4.0;

pub const SCORE_MIN: f64 = 0.0;
pub const SCORE_MAX: f64 = 10.0;

/// A rise strictly greater than this since the previous run sets `score_jumped`.
pub const SCORE_JUMP_THRESHOLD: f64 = 2.0;

/// Share of prospects (by preliminary score) eligible for GitHub enrichment.
pub const GITHUB_TOP_PERCENT: f64 = 0.10;

/// Default per-run GitHub lookup budget.
pub const DEFAULT_MAX_GITHUB_REQUESTS: usize = 30;

/// Default CoinGecko page budget for the batch job.
pub const DEFAULT_COINGECKO_MAX_PAGES: u32 = 6;

/// Trailing window for GitHub commit counts.
pub const GITHUB_COMMIT_WINDOW_DAYS: i64 = 30;

pub const DRAFTING_MODEL: &str = "claude-sonnet-4-20250514";
pub const DRAFTING_MAX_TOKENS: u32 = 1024;

/// Which market-data source a run uses. Exactly one per run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CoinSource {
    #[default]
    CoinGecko,
    Coinranking,
}

impl CoinSource {
    /// Case-insensitive; anything other than `coinranking` selects CoinGecko.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(|s| s.trim().to_ascii_lowercase()) {
            Some(s) if s == "coinranking" => CoinSource::Coinranking,
            _ => CoinSource::CoinGecko,
        }
    }
}

impl std::fmt::Display for CoinSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CoinSource::CoinGecko => write!(f, "coingecko"),
            CoinSource::Coinranking => write!(f, "coinranking"),
        }
    }
}

/// Self-imposed request spacing for rate-limited providers. These are
/// compliance delays, not tuning knobs; only tests use anything but `default()`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Throttle {
    pub coingecko_warmup: Duration,
    pub coingecko_page_with_key: Duration,
    pub coingecko_page_without_key: Duration,
    pub coinranking_warmup: Duration,
    pub coinranking_page: Duration,
    pub github_request: Duration,
}

impl Default for Throttle {
    fn default() -> Self {
        Self {
            coingecko_warmup: Duration::from_millis(2000),
            coingecko_page_with_key: Duration::from_millis(1200),
            coingecko_page_without_key: Duration::from_millis(2500),
            coinranking_warmup: Duration::from_millis(500),
            coinranking_page: Duration::from_millis(800),
            github_request: Duration::from_millis(800),
        }
    }
}

impl Throttle {
    pub fn none() -> Self {
        Self {
            coingecko_warmup: Duration::ZERO,
            coingecko_page_with_key: Duration::ZERO,
            coingecko_page_without_key: Duration::ZERO,
            coinranking_warmup: Duration::ZERO,
            coinranking_page: Duration::ZERO,
            github_request: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    /// sqlx connection string (DATABASE_URL). Required by both binaries.
    pub database_url: Option<String>,
    pub api_port: u16,
    pub coin_source: CoinSource,
    pub coingecko_api_key: Option<String>,
    /// Use the pro base URL and pro key header (COINGECKO_PRO=1|true).
    pub coingecko_pro: bool,
    pub coinranking_api_key: Option<String>,
    pub github_token: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub defillama_url: String,
    pub coingecko_free_url: String,
    pub coingecko_pro_url: String,
    pub coinranking_url: String,
    pub github_url: String,
    pub anthropic_url: String,
    pub coingecko_max_pages: u32,
    pub max_github_requests: usize,
    pub throttle: Throttle,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            database_url: None,
            api_port: 3000,
            coin_source: CoinSource::default(),
            coingecko_api_key: None,
            coingecko_pro: false,
            coinranking_api_key: None,
            github_token: None,
            anthropic_api_key: None,
            defillama_url: DEFILLAMA_API_URL.to_string(),
            coingecko_free_url: COINGECKO_FREE_API_URL.to_string(),
            coingecko_pro_url: COINGECKO_PRO_API_URL.to_string(),
            coinranking_url: COINRANKING_API_URL.to_string(),
            github_url: GITHUB_API_URL.to_string(),
            anthropic_url: ANTHROPIC_API_URL.to_string(),
            coingecko_max_pages: DEFAULT_COINGECKO_MAX_PAGES,
            max_github_requests: DEFAULT_MAX_GITHUB_REQUESTS,
            throttle: Throttle::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            log_level: std::env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
            database_url: non_empty_var("DATABASE_URL"),
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse::<u16>()
                .map_err(|_| AppError::Config("API_PORT must be a valid port number".to_string()))?,
            coin_source: CoinSource::parse(std::env::var("COIN_SOURCE").ok().as_deref()),
            coingecko_api_key: non_empty_var("COINGECKO_API_KEY"),
            coingecko_pro: matches!(
                std::env::var("COINGECKO_PRO").ok().as_deref(),
                Some("1") | Some("true")
            ),
            coinranking_api_key: non_empty_var("COINRANKING_API_KEY"),
            github_token: non_empty_var("GITHUB_TOKEN"),
            anthropic_api_key: non_empty_var("ANTHROPIC_API_KEY"),
            defillama_url: url_var("DEFILLAMA_URL", defaults.defillama_url),
            coingecko_free_url: url_var("COINGECKO_FREE_URL", defaults.coingecko_free_url),
            coingecko_pro_url: url_var("COINGECKO_PRO_URL", defaults.coingecko_pro_url),
            coinranking_url: url_var("COINRANKING_URL", defaults.coinranking_url),
            github_url: url_var("GITHUB_URL", defaults.github_url),
            anthropic_url: url_var("ANTHROPIC_URL", defaults.anthropic_url),
            coingecko_max_pages: std::env::var("COINGECKO_MAX_PAGES")
                .ok()
                .and_then(|s| s.parse::<u32>().ok())
                .unwrap_or(defaults.coingecko_max_pages),
            max_github_requests: std::env::var("MAX_GITHUB_REQUESTS")
                .ok()
                .and_then(|s| s.parse::<usize>().ok())
                .unwrap_or(defaults.max_github_requests),
            throttle: Throttle::default(),
        })
    }

    /// Store URL or a configuration error naming the missing variable.
    pub fn require_database_url(&self) -> Result<&str> {
        self.database_url
            .as_deref()
            .ok_or_else(|| {
                AppError::Config("DATABASE_URL must be set (e.g. sqlite:prospects.db)".to_string())
            })
    }

    /// Fails before any network call when the selected coin source lacks its key.
    pub fn validate_coin_source(&self) -> Result<()> {
        if self.coin_source == CoinSource::Coinranking && self.coinranking_api_key.is_none() {
            return Err(AppError::Config(
                "COIN_SOURCE=coinranking requires COINRANKING_API_KEY to be set. Set the env var or use COIN_SOURCE=coingecko."
                    .to_string(),
            ));
        }
        Ok(())
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn url_var(key: &str, default: String) -> String {
    non_empty_var(key)
        .map(|s| s.trim_end_matches('/').to_string())
        .unwrap_or(default)
}
