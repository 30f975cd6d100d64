//! Reconcile DeFiLlama protocols with market data and, optionally, GitHub activity.
//!
//! DeFiLlama is authoritative for presence: one `RawProspect` per protocol,
//! market-only assets are never surfaced. A protocol with a `gecko_id` is matched
//! by exact market id; otherwise by a slug derived from its name.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::fetcher::github::{resolve_repo_url, GithubClient};
use crate::fetcher::pause;
use crate::types::{MarketRecord, ProtocolRecord, RawProspect, RepoActivity, Source};

/// Best-effort repository lookups. `None` is an expected outcome, not an error.
#[async_trait]
pub trait RepoActivitySource: Send + Sync {
    async fn activity_for_repo_url(&self, repo_url: &str) -> Option<RepoActivity>;
}

#[async_trait]
impl RepoActivitySource for GithubClient {
    async fn activity_for_repo_url(&self, repo_url: &str) -> Option<RepoActivity> {
        self.fetch_activity_for_repo_url(repo_url).await
    }
}

#[derive(Debug, Clone)]
pub struct MergeOptions {
    /// Look up GitHub during the merge itself (slow; the pipeline leaves this off).
    pub attach_github: bool,
    pub max_github_requests: usize,
    /// Label recorded when a market record matches.
    pub market_source: Source,
    /// Spacing between GitHub lookups.
    pub github_delay: Duration,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            attach_github: false,
            max_github_requests: 20,
            market_source: Source::Coingecko,
            github_delay: Duration::from_millis(800),
        }
    }
}

/// Lowercase, alphanumeric runs joined by single hyphens, no leading/trailing hyphen.
pub fn slugify(s: &str) -> String {
    s.to_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

/// Market records indexed by provider id and by slug. On id or slug
/// collisions the last record wins.
pub struct MarketIndex<'a> {
    by_id: HashMap<&'a str, &'a MarketRecord>,
    by_slug: HashMap<&'a str, &'a MarketRecord>,
}

impl<'a> MarketIndex<'a> {
    pub fn new(markets: &'a [MarketRecord]) -> Self {
        let mut by_id = HashMap::with_capacity(markets.len());
        let mut by_slug = HashMap::with_capacity(markets.len());
        for m in markets {
            by_id.insert(m.id.as_str(), m);
            by_slug.insert(m.slug.as_str(), m);
        }
        Self { by_id, by_slug }
    }

    pub fn lookup(&self, protocol: &ProtocolRecord) -> Option<&'a MarketRecord> {
        match protocol.gecko_id.as_deref() {
            Some(gecko_id) => self.by_id.get(gecko_id).copied(),
            None => self.by_slug.get(slugify(&protocol.name).as_str()).copied(),
        }
    }
}

/// Pure record linkage, no I/O.
pub fn merge_records(
    protocols: &[ProtocolRecord],
    markets: &[MarketRecord],
    market_source: Source,
) -> Vec<RawProspect> {
    let index = MarketIndex::new(markets);
    let mut matched = 0usize;

    let raw: Vec<RawProspect> = protocols
        .iter()
        .map(|p| {
            let market = index.lookup(p);
            let mut sources = vec![Source::Defillama];
            if market.is_some() {
                matched += 1;
                sources.push(market_source);
            }
            RawProspect {
                id: format!("dl-{}", p.slug),
                name: p.name.clone(),
                slug: p.slug.clone(),
                category: p.category.clone(),
                chains: p.chains.clone(),
                tvl: p.tvl,
                tvl_change_1m: p.tvl_change_1m,
                mcap: market.map(|m| m.mcap),
                volume: market.map(|m| m.volume),
                ath_change_pct: market.and_then(|m| m.ath_change_pct),
                price_change_7d: market.and_then(|m| m.price_change_7d),
                github_activity: None,
                sources,
                vc_backed: None,
                url_defillama: p.url_defillama.clone(),
                url_coingecko: p.url_coingecko.clone(),
                url_twitter: p.url_twitter.clone(),
                url_discord: p.url_discord.clone(),
                github_slug: p.github.as_ref().and_then(|g| g.first()).cloned(),
            }
        })
        .collect();

    info!(
        protocols = protocols.len(),
        markets = markets.len(),
        matched,
        "Merged {} protocols ({matched} with {market_source} data)",
        raw.len()
    );
    raw
}

/// Merge, then optionally attach GitHub activity for records with a repo
/// reference, up to `max_github_requests` lookups.
pub async fn merge(
    protocols: &[ProtocolRecord],
    markets: &[MarketRecord],
    options: &MergeOptions,
    github: &dyn RepoActivitySource,
) -> Vec<RawProspect> {
    let mut raw = merge_records(protocols, markets, options.market_source);
    if options.attach_github {
        let mut lookups = 0usize;
        for r in raw.iter_mut() {
            if lookups >= options.max_github_requests {
                break;
            }
            if attach_one(r, github).await {
                lookups += 1;
                pause(options.github_delay).await;
            }
        }
    }
    raw
}

/// Second-pass enrichment: fetch GitHub only for ids in `top_ids`, at most
/// `max_requests` lookups, mutating the records in place.
pub async fn attach_github_for_top_ids(
    records: &mut [RawProspect],
    top_ids: &HashSet<String>,
    max_requests: usize,
    github: &dyn RepoActivitySource,
    delay: Duration,
) -> usize {
    let mut lookups = 0usize;
    let mut attached = 0usize;
    for r in records.iter_mut() {
        if lookups >= max_requests {
            break;
        }
        if !top_ids.contains(&r.id) {
            continue;
        }
        if attach_one(r, github).await {
            lookups += 1;
            if r.github_activity.is_some() {
                attached += 1;
            }
            pause(delay).await;
        }
    }
    info!(
        selected = top_ids.len(),
        lookups, attached, "GitHub enrichment: {attached} of {lookups} lookups returned activity"
    );
    lookups
}

/// Returns true when a lookup was attempted (it counts against the budget even
/// if it came back empty).
async fn attach_one(r: &mut RawProspect, github: &dyn RepoActivitySource) -> bool {
    let Some(repo_url) = r.github_slug.as_deref().and_then(resolve_repo_url) else {
        return false;
    };
    match github.activity_for_repo_url(&repo_url).await {
        Some(activity) => {
            r.github_activity = Some(activity);
            r.add_source(Source::Github);
        }
        None => debug!(id = %r.id, repo_url, "no GitHub activity"),
    }
    true
}
