//! Row types for the `prospects` and `pipeline` tables. Nested values are
//! stored as JSON text and timestamps as RFC 3339 text.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::error::Result;
use crate::types::{PipelineEntry, PipelineStatus, Prospect};

#[derive(Debug, sqlx::FromRow)]
pub struct ProspectRow {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub category: String,
    pub chains: String,
    pub tvl: f64,
    pub tvl_change_1m: Option<f64>,
    pub mcap: Option<f64>,
    pub volume: Option<f64>,
    pub volume_mcap_ratio: Option<f64>,
    pub ath_change_pct: Option<f64>,
    pub price_change_7d: Option<f64>,
    pub github_activity: Option<String>,
    pub pain_score: f64,
    pub pain_score_raw: f64,
    pub pain_signals: String,
    pub treasury_gated: i64,
    pub score_jumped: Option<i64>,
    pub deliverable_recommendations: String,
    pub sources: String,
    pub last_updated: String,
    pub url_defillama: Option<String>,
    pub url_coingecko: Option<String>,
    pub url_twitter: Option<String>,
    pub url_discord: Option<String>,
}

#[derive(Debug, sqlx::FromRow)]
pub struct PipelineRow {
    pub prospect_id: String,
    pub status: String,
    pub contacted_at: Option<String>,
    pub notes: Option<String>,
    pub follow_up_at: Option<String>,
    pub estimated_value: Option<f64>,
    pub revenue: Option<f64>,
    pub updated_at: String,
}

pub(crate) fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)?.with_timezone(&Utc))
}

impl ProspectRow {
    pub fn from_prospect(p: &Prospect) -> Result<Self> {
        Ok(Self {
            id: p.id.clone(),
            name: p.name.clone(),
            slug: p.slug.clone(),
            category: p.category.clone(),
            chains: serde_json::to_string(&p.chains)?,
            tvl: p.tvl,
            tvl_change_1m: p.tvl_change_1m,
            mcap: p.mcap,
            volume: p.volume,
            volume_mcap_ratio: p.volume_mcap_ratio,
            ath_change_pct: p.ath_change_pct,
            price_change_7d: p.price_change_7d,
            github_activity: p
                .github_activity
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?,
            pain_score: p.pain_score,
            pain_score_raw: p.pain_score_raw,
            pain_signals: serde_json::to_string(&p.pain_signals)?,
            treasury_gated: i64::from(p.treasury_gated),
            score_jumped: p.score_jumped.then_some(1),
            deliverable_recommendations: serde_json::to_string(&p.deliverable_recommendations)?,
            sources: serde_json::to_string(&p.sources)?,
            last_updated: format_ts(&p.last_updated),
            url_defillama: p.url_defillama.clone(),
            url_coingecko: p.url_coingecko.clone(),
            url_twitter: p.url_twitter.clone(),
            url_discord: p.url_discord.clone(),
        })
    }

    pub fn into_prospect(self) -> Result<Prospect> {
        Ok(Prospect {
            chains: serde_json::from_str(&self.chains)?,
            github_activity: self
                .github_activity
                .as_deref()
                .map(serde_json::from_str)
                .transpose()?,
            pain_signals: serde_json::from_str(&self.pain_signals)?,
            treasury_gated: self.treasury_gated != 0,
            score_jumped: self.score_jumped.is_some_and(|v| v != 0),
            deliverable_recommendations: serde_json::from_str(&self.deliverable_recommendations)?,
            sources: serde_json::from_str(&self.sources)?,
            last_updated: parse_ts(&self.last_updated)?,
            id: self.id,
            name: self.name,
            slug: self.slug,
            category: self.category,
            tvl: self.tvl,
            tvl_change_1m: self.tvl_change_1m,
            mcap: self.mcap,
            volume: self.volume,
            volume_mcap_ratio: self.volume_mcap_ratio,
            ath_change_pct: self.ath_change_pct,
            price_change_7d: self.price_change_7d,
            pain_score: self.pain_score,
            pain_score_raw: self.pain_score_raw,
            url_defillama: self.url_defillama,
            url_coingecko: self.url_coingecko,
            url_twitter: self.url_twitter,
            url_discord: self.url_discord,
        })
    }
}

impl PipelineRow {
    pub fn from_entry(e: &PipelineEntry) -> Self {
        Self {
            prospect_id: e.prospect_id.clone(),
            status: e.status.as_str().to_string(),
            contacted_at: e.contacted_at.clone(),
            notes: e.notes.clone(),
            follow_up_at: e.follow_up_at.clone(),
            estimated_value: e.estimated_value,
            revenue: e.revenue,
            updated_at: format_ts(&e.updated_at),
        }
    }

    /// Unrecognized stored statuses read back as `Uncontacted`.
    pub fn into_entry(self) -> Result<PipelineEntry> {
        Ok(PipelineEntry {
            status: PipelineStatus::parse_or_default(Some(&self.status)),
            updated_at: parse_ts(&self.updated_at)?,
            prospect_id: self.prospect_id,
            contacted_at: self.contacted_at,
            notes: self.notes,
            follow_up_at: self.follow_up_at,
            estimated_value: self.estimated_value,
            revenue: self.revenue,
        })
    }
}
