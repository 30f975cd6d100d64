//! Batch ingestion: fetch, merge, preliminary score, GitHub for the most
//! promising leads, final score, score-jump delta, persist.
//!
//! Not safe to run concurrently against the same store; one run at a time is
//! left to whatever schedules the batch job.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use tracing::info;

use crate::config::{Config, GITHUB_TOP_PERCENT, RANK_MAX, RANK_MIN, SCORE_JUMP_THRESHOLD};
use crate::db::ProspectStore;
use crate::error::Result;
use crate::fetcher::{http_client, market_source_for, DefiLlamaClient, GithubClient};
use crate::merge::{attach_github_for_top_ids, merge, MergeOptions, RepoActivitySource};
use crate::scorer::{
    apply_treasury_gate, compute_pain_signals, compute_raw_score, recommend_deliverables,
};
use crate::types::{Prospect, RawProspect};

/// Per-run overrides; `None` falls back to the configured value.
#[derive(Debug, Clone, Default)]
pub struct IngestOptions {
    /// CoinGecko page budget (ignored for Coinranking).
    pub coingecko_max_pages: Option<u32>,
    pub max_github_requests: Option<usize>,
}

/// Gated score used to rank leads before any GitHub data exists.
fn preliminary_score(r: &RawProspect) -> f64 {
    let raw_score = compute_raw_score(&compute_pain_signals(r));
    apply_treasury_gate(raw_score, r.tvl, r.vc_backed).score
}

/// Ids of the top `max(1, min(max_requests, ceil(n * 10%)))` records by
/// preliminary score. Ties keep merge order.
pub fn select_top_ids(records: &[RawProspect], max_requests: usize) -> HashSet<String> {
    if records.is_empty() {
        return HashSet::new();
    }
    let mut scored: Vec<(&str, f64)> = records
        .iter()
        .map(|r| (r.id.as_str(), preliminary_score(r)))
        .collect();
    scored.sort_by(|a, b| b.1.total_cmp(&a.1));

    let share = (records.len() as f64 * GITHUB_TOP_PERCENT).ceil() as usize;
    let top_count = share.min(max_requests).max(1);
    scored
        .into_iter()
        .take(top_count)
        .map(|(id, _)| id.to_string())
        .collect()
}

/// Final record for one merged prospect. `previous` is the last persisted
/// version with the same id, if any.
pub fn build_prospect(r: RawProspect, previous: Option<&Prospect>, now: DateTime<Utc>) -> Prospect {
    let signals = compute_pain_signals(&r);
    let raw_score = compute_raw_score(&signals);
    let gate = apply_treasury_gate(raw_score, r.tvl, r.vc_backed);
    let volume_mcap_ratio = match (r.volume, r.mcap) {
        (Some(volume), Some(mcap)) if mcap > 0.0 => Some(volume / mcap * 100.0),
        _ => None,
    };
    let score_jumped =
        previous.is_some_and(|prev| gate.score - prev.pain_score > SCORE_JUMP_THRESHOLD);

    Prospect {
        id: r.id,
        name: r.name,
        slug: r.slug,
        category: r.category,
        chains: r.chains,
        tvl: r.tvl,
        tvl_change_1m: r.tvl_change_1m,
        mcap: r.mcap,
        volume: r.volume,
        volume_mcap_ratio,
        ath_change_pct: r.ath_change_pct,
        price_change_7d: r.price_change_7d,
        github_activity: r.github_activity,
        pain_score: gate.score,
        pain_score_raw: raw_score,
        deliverable_recommendations: recommend_deliverables(&signals),
        pain_signals: signals,
        treasury_gated: gate.treasury_gated,
        score_jumped,
        sources: r.sources,
        last_updated: now,
        url_defillama: r.url_defillama,
        url_coingecko: r.url_coingecko,
        url_twitter: r.url_twitter,
        url_discord: r.url_discord,
    }
}

/// Run the full pipeline and return the new records without writing them.
pub async fn run_ingestion(
    cfg: &Config,
    store: &dyn ProspectStore,
    options: &IngestOptions,
) -> Result<Vec<Prospect>> {
    cfg.validate_coin_source()?;

    let mut cfg = cfg.clone();
    if let Some(pages) = options.coingecko_max_pages {
        cfg.coingecko_max_pages = pages;
    }
    let max_github_requests = options.max_github_requests.unwrap_or(cfg.max_github_requests);

    let http = http_client()?;
    let defillama = DefiLlamaClient::from_config(&cfg, http.clone());
    let market = market_source_for(&cfg, http.clone())?;
    let github = GithubClient::from_config(&cfg, http);

    info!(
        coin_source = %cfg.coin_source,
        max_github_requests, "Running ingestion (DeFiLlama + {}, top 10% GitHub)", cfg.coin_source
    );

    let (protocols, markets) = tokio::try_join!(
        defillama.fetch_protocols(),
        market.fetch_rank_range(RANK_MIN, RANK_MAX)
    )?;

    let merge_options = MergeOptions {
        attach_github: false,
        max_github_requests,
        market_source: market.source(),
        github_delay: cfg.throttle.github_request,
    };
    let github: &dyn RepoActivitySource = &github;
    let mut raw = merge(&protocols, &markets, &merge_options, github).await;

    let top_ids = select_top_ids(&raw, max_github_requests);
    attach_github_for_top_ids(
        &mut raw,
        &top_ids,
        max_github_requests,
        github,
        cfg.throttle.github_request,
    )
    .await;

    let previous: HashMap<String, Prospect> = store
        .read_all()
        .await?
        .into_iter()
        .map(|p| (p.id.clone(), p))
        .collect();
    let now = Utc::now();

    let prospects: Vec<Prospect> = raw
        .into_iter()
        .map(|r| {
            let prev = previous.get(&r.id);
            build_prospect(r, prev, now)
        })
        .collect();

    let jumped = prospects.iter().filter(|p| p.score_jumped).count();
    let gated = prospects.iter().filter(|p| p.treasury_gated).count();
    info!(
        prospects = prospects.len(),
        jumped, gated, "Scored {} prospects", prospects.len()
    );
    Ok(prospects)
}

/// Run the pipeline and persist in one batch. Returns the number written.
pub async fn run_ingestion_and_save(
    cfg: &Config,
    store: &dyn ProspectStore,
    options: &IngestOptions,
) -> Result<usize> {
    let prospects = run_ingestion(cfg, store, options).await?;
    store.upsert_all(&prospects).await?;
    Ok(prospects.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CoinSource, Throttle};
    use crate::db::store::tests::{memory_store, prospect};
    use crate::error::AppError;
    use crate::fetcher::stub;
    use crate::merge::tests::protocol;
    use crate::merge::merge_records;
    use crate::types::{SignalKey, Source};
    use axum::{
        extract::{Path, Query},
        http::StatusCode,
        response::IntoResponse,
        routing::get,
        Json, Router,
    };
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn raw_with(slug: &str, chains: usize, category: &str) -> RawProspect {
        let mut p = protocol(slug);
        p.chains = (0..chains).map(|i| format!("chain{i}")).collect();
        p.category = category.to_string();
        merge_records(&[p], &[], Source::Coingecko).remove(0)
    }

    #[test]
    fn top_ids_take_ten_percent_at_least_one() {
        // 25 records, one clear leader, two runners-up.
        let mut records: Vec<_> = (0..25).map(|i| raw_with(&format!("p{i}"), 1, "Yield")).collect();
        records[7] = raw_with("leader", 3, "RWA");
        records[3] = raw_with("second", 3, "Dexes");
        records[11] = raw_with("third", 3, "Lending");

        let top = select_top_ids(&records, 30);
        assert_eq!(top.len(), 3);
        assert!(top.contains("dl-leader"));
        assert!(top.contains("dl-second"));
        assert!(top.contains("dl-third"));

        let capped = select_top_ids(&records, 1);
        assert_eq!(capped, ["dl-leader".to_string()].into_iter().collect());

        assert_eq!(select_top_ids(&records[..2], 30).len(), 1);
        assert!(select_top_ids(&[], 30).is_empty());
    }

    #[test]
    fn build_prospect_derives_ratio_and_recommendations() {
        let mut r = raw_with("dex", 3, "Dexes");
        r.mcap = Some(10_000_000.0);
        r.volume = Some(2_000_000.0);
        let p = build_prospect(r, None, Utc::now());
        assert_eq!(p.volume_mcap_ratio, Some(20.0));
        assert_eq!(p.pain_score, 8.0);
        assert_eq!(p.pain_score_raw, 8.0);
        assert!(!p.treasury_gated);
        assert!(!p.score_jumped);
        let rec_ids: Vec<_> = p
            .deliverable_recommendations
            .iter()
            .map(|d| d.deliverable_id)
            .collect();
        assert_eq!(rec_ids, vec![SignalKey::MultiChain, SignalKey::DexAmm, SignalKey::VolumeMcap]);

        let mut no_mcap = raw_with("nomcap", 1, "Yield");
        no_mcap.volume = Some(1.0);
        assert_eq!(build_prospect(no_mcap, None, Utc::now()).volume_mcap_ratio, None);
    }

    #[test]
    fn score_jump_needs_strict_rise_over_two() {
        let r = raw_with("dex", 3, "Dexes"); // score 6
        let now = Utc::now();
        assert!(build_prospect(r.clone(), Some(&prospect("dl-dex", 3.5)), now).score_jumped);
        assert!(!build_prospect(r.clone(), Some(&prospect("dl-dex", 4.0)), now).score_jumped);
        assert!(!build_prospect(r.clone(), Some(&prospect("dl-dex", 9.0)), now).score_jumped);
        assert!(!build_prospect(r, None, now).score_jumped);
    }

    #[test]
    fn gated_prospect_keeps_raw_score() {
        let mut r = raw_with("tiny", 3, "RWA");
        r.tvl = 1_000_000.0;
        let p = build_prospect(r, None, Utc::now());
        assert_eq!(p.pain_score_raw, 9.0);
        assert_eq!(p.pain_score, 4.0);
        assert!(p.treasury_gated);
    }

    #[tokio::test]
    async fn coinranking_without_key_fails_before_network() {
        let store = memory_store().await;
        let cfg = Config {
            coin_source: CoinSource::Coinranking,
            defillama_url: "http://127.0.0.1:1".to_string(),
            ..Config::default()
        };
        let err = run_ingestion(&cfg, &store, &IngestOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
        assert!(err.to_string().contains("COINRANKING_API_KEY"));
    }

    /// One stub serving DeFiLlama, CoinGecko and GitHub paths.
    fn providers(github_calls: Arc<AtomicUsize>) -> Router {
        Router::new()
            .route(
                "/protocols",
                get(|| async {
                    Json(json!([
                        {"id": "1", "name": "Alpha Dex", "slug": "alpha", "category": "Dexes",
                         "chains": ["Ethereum", "Arbitrum", "Base"], "tvl": 40_000_000.0,
                         "gecko_id": "alpha-token", "github": ["alpha-org/alpha"]},
                        {"id": "2", "name": "Beta", "slug": "beta", "category": "Yield",
                         "chains": ["Ethereum"], "tvl": 15_000_000.0, "github": ["beta-org"]},
                        {"id": "3", "name": "Huge", "slug": "huge", "tvl": 9_000_000_000.0}
                    ]))
                }),
            )
            .route(
                "/coins/markets",
                get(|Query(q): Query<std::collections::HashMap<String, String>>| async move {
                    if q.get("page").map(String::as_str) != Some("2") {
                        return Json(json!([])).into_response();
                    }
                    Json(json!([
                        {"id": "alpha-token", "symbol": "alp", "name": "Alpha",
                         "market_cap": 10_000_000.0, "total_volume": 2_500_000.0,
                         "market_cap_rank": 250, "ath_change_percentage": -80.0,
                         "price_change_percentage_7d_in_currency": 3.0}
                    ]))
                    .into_response()
                }),
            )
            .route(
                "/repos/:owner/:repo/commits",
                get(move |Path((owner, _repo)): Path<(String, String)>| {
                    let calls = github_calls.clone();
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        if owner == "alpha-org" {
                            Json(json!([])).into_response()
                        } else {
                            StatusCode::NOT_FOUND.into_response()
                        }
                    }
                }),
            )
            .route(
                "/repos/:owner/:repo/contributors",
                get(|| async { Json(json!([])) }),
            )
    }

    fn stub_config(base: &str) -> Config {
        Config {
            defillama_url: base.to_string(),
            coingecko_free_url: base.to_string(),
            coingecko_pro_url: base.to_string(),
            github_url: base.to_string(),
            throttle: Throttle::none(),
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn full_run_scores_enriches_and_persists() {
        let github_calls = Arc::new(AtomicUsize::new(0));
        let base = stub::serve(providers(github_calls.clone())).await;
        let cfg = stub_config(&base);
        let store = memory_store().await;
        store.upsert_all(&[prospect("dl-alpha", 1.0)]).await.unwrap();

        let options = IngestOptions {
            coingecko_max_pages: Some(2),
            max_github_requests: Some(5),
        };
        let written = run_ingestion_and_save(&cfg, &store, &options).await.unwrap();
        assert_eq!(written, 2);

        // ceil(2 * 10%) = 1 lookup, spent on the highest preliminary score.
        assert_eq!(github_calls.load(Ordering::SeqCst), 1);

        let all = store.read_all().await.unwrap();
        assert_eq!(all.len(), 2);
        let alpha = store.get("dl-alpha").await.unwrap().unwrap();
        assert_eq!(
            alpha.sources,
            vec![Source::Defillama, Source::Coingecko, Source::Github]
        );
        assert_eq!(alpha.volume_mcap_ratio, Some(25.0));
        assert_eq!(alpha.github_activity.as_ref().unwrap().commit_count_30d, 0);
        let keys: Vec<_> = alpha.pain_signals.iter().map(|s| s.key).collect();
        assert_eq!(
            keys,
            vec![
                SignalKey::MultiChain,
                SignalKey::VolumeMcap,
                SignalKey::AthDrawdown,
                SignalKey::DexAmm,
                SignalKey::DeadRepo,
            ]
        );
        // 4 + 2 + 2 + 2 - 5
        assert_eq!(alpha.pain_score, 5.0);
        assert!(alpha.score_jumped);

        let beta = store.get("dl-beta").await.unwrap().unwrap();
        assert!(beta.github_activity.is_none());
        assert_eq!(beta.mcap, None);
        assert_eq!(beta.pain_score, 0.0);
        assert!(!beta.score_jumped);

        assert!(store.get("dl-huge").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn primary_source_failure_writes_nothing() {
        let router = Router::new().route(
            "/protocols",
            get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
        );
        let base = stub::serve(router).await;
        let store = memory_store().await;
        let err = run_ingestion_and_save(&stub_config(&base), &store, &IngestOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Upstream { status: 500, .. }));
        assert!(store.read_all().await.unwrap().is_empty());
    }
}
