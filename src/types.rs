use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Normalized source records
// ---------------------------------------------------------------------------

/// One DeFiLlama protocol inside the TVL eligibility band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolRecord {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub category: String,
    pub chains: Vec<String>,
    pub tvl: f64,
    /// Populated from the provider's 7-day change (30d proxy).
    pub tvl_change_1m: Option<f64>,
    /// CoinGecko coin id, when DeFiLlama knows it.
    pub gecko_id: Option<String>,
    pub github: Option<Vec<String>>,
    pub url_defillama: Option<String>,
    pub url_coingecko: Option<String>,
    pub url_twitter: Option<String>,
    pub url_discord: Option<String>,
}

/// One tradable asset from the market-data source. `id` is a CoinGecko coin id
/// or a Coinranking UUID depending on the source that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketRecord {
    pub id: String,
    pub name: String,
    /// Lowercased ticker symbol.
    pub slug: String,
    pub mcap: f64,
    pub volume: f64,
    pub ath_change_pct: Option<f64>,
    pub price_change_7d: Option<f64>,
}

/// GitHub activity for one repository. A missing snapshot (None) means the
/// lookup was skipped or failed; it is not the same as zero commits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepoActivity {
    pub last_commit_date: Option<String>,
    pub commit_count_30d: u32,
    pub contributor_count: u32,
    pub repo_url: Option<String>,
}

// ---------------------------------------------------------------------------
// Sources
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Defillama,
    Coingecko,
    Coinranking,
    Github,
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Source::Defillama => "defillama",
            Source::Coingecko => "coingecko",
            Source::Coinranking => "coinranking",
            Source::Github => "github",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Merge output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawProspect {
    /// `dl-<slug>`, stable across runs.
    pub id: String,
    pub name: String,
    pub slug: String,
    pub category: String,
    pub chains: Vec<String>,
    pub tvl: f64,
    pub tvl_change_1m: Option<f64>,
    pub mcap: Option<f64>,
    pub volume: Option<f64>,
    pub ath_change_pct: Option<f64>,
    pub price_change_7d: Option<f64>,
    pub github_activity: Option<RepoActivity>,
    /// Always starts with `Defillama`; no duplicates.
    pub sources: Vec<Source>,
    /// Only set when known from outside the pipeline.
    pub vc_backed: Option<bool>,
    pub url_defillama: Option<String>,
    pub url_coingecko: Option<String>,
    pub url_twitter: Option<String>,
    pub url_discord: Option<String>,
    /// First entry of DeFiLlama's `github` list; drives the second-pass lookup.
    pub github_slug: Option<String>,
}

impl RawProspect {
    pub fn add_source(&mut self, source: Source) {
        if !self.sources.contains(&source) {
            self.sources.push(source);
        }
    }
}

// ---------------------------------------------------------------------------
// Scoring
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignalKey {
    #[serde(rename = "Multi-chain")]
    MultiChain,
    #[serde(rename = "RWA")]
    Rwa,
    #[serde(rename = "TVL decline")]
    TvlDecline,
    #[serde(rename = "Volume/MCap")]
    VolumeMcap,
    #[serde(rename = "ATH drawdown")]
    AthDrawdown,
    #[serde(rename = "Lending/CDP")]
    LendingCdp,
    #[serde(rename = "DEX/AMM")]
    DexAmm,
    #[serde(rename = "7d price swing")]
    PriceSwing7d,
    #[serde(rename = "Dead Repo")]
    DeadRepo,
}

impl SignalKey {
    pub fn label(self) -> &'static str {
        match self {
            SignalKey::MultiChain => "Multi-chain",
            SignalKey::Rwa => "RWA",
            SignalKey::TvlDecline => "TVL decline",
            SignalKey::VolumeMcap => "Volume/MCap",
            SignalKey::AthDrawdown => "ATH drawdown",
            SignalKey::LendingCdp => "Lending/CDP",
            SignalKey::DexAmm => "DEX/AMM",
            SignalKey::PriceSwing7d => "7d price swing",
            SignalKey::DeadRepo => "Dead Repo",
        }
    }
}

impl std::fmt::Display for SignalKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PainSignal {
    pub key: SignalKey,
    pub points: f64,
    pub explanation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliverableRecommendation {
    pub deliverable_id: SignalKey,
    pub title: String,
    /// 1–10.
    pub relevance: u8,
    pub estimated_value_min: u32,
    pub estimated_value_max: u32,
    pub build_hours: u32,
}

// ---------------------------------------------------------------------------
// Persisted prospect
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prospect {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub category: String,
    pub chains: Vec<String>,
    pub tvl: f64,
    pub tvl_change_1m: Option<f64>,
    pub mcap: Option<f64>,
    pub volume: Option<f64>,
    pub volume_mcap_ratio: Option<f64>,
    pub ath_change_pct: Option<f64>,
    pub price_change_7d: Option<f64>,
    pub github_activity: Option<RepoActivity>,
    /// Gated score, 0–10 with one decimal.
    pub pain_score: f64,
    /// Score before the treasury gate.
    pub pain_score_raw: f64,
    /// Evaluation order, not sorted.
    pub pain_signals: Vec<PainSignal>,
    pub treasury_gated: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub score_jumped: bool,
    pub deliverable_recommendations: Vec<DeliverableRecommendation>,
    pub sources: Vec<Source>,
    pub last_updated: DateTime<Utc>,
    pub url_defillama: Option<String>,
    pub url_coingecko: Option<String>,
    pub url_twitter: Option<String>,
    pub url_discord: Option<String>,
}

// ---------------------------------------------------------------------------
// Outreach pipeline
// ---------------------------------------------------------------------------

/// Outreach stage, in pipeline order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PipelineStatus {
    #[default]
    Uncontacted,
    HookBuilding,
    HookSent,
    Replied,
    DemoBuilt,
    Converted,
}

impl PipelineStatus {
    pub const ALL: [PipelineStatus; 6] = [
        PipelineStatus::Uncontacted,
        PipelineStatus::HookBuilding,
        PipelineStatus::HookSent,
        PipelineStatus::Replied,
        PipelineStatus::DemoBuilt,
        PipelineStatus::Converted,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PipelineStatus::Uncontacted => "Uncontacted",
            PipelineStatus::HookBuilding => "HookBuilding",
            PipelineStatus::HookSent => "HookSent",
            PipelineStatus::Replied => "Replied",
            PipelineStatus::DemoBuilt => "DemoBuilt",
            PipelineStatus::Converted => "Converted",
        }
    }

    /// Exact-name lookup.
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|st| st.as_str() == s)
    }

    /// Unknown or missing values fall back to `Uncontacted`.
    pub fn parse_or_default(s: Option<&str>) -> Self {
        s.and_then(Self::parse).unwrap_or_default()
    }
}

impl std::fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineEntry {
    pub prospect_id: String,
    pub status: PipelineStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contacted_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub follow_up_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revenue: Option<f64>,
    pub updated_at: DateTime<Utc>,
}
