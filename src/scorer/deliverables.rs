//! Maps positive pain signals to dashboard deliverables from a fixed catalog.

use std::collections::HashSet;

use crate::types::{DeliverableRecommendation, PainSignal, SignalKey};

struct CatalogEntry {
    title: &'static str,
    relevance: u8,
    value_min: u32,
    value_max: u32,
    hours: u32,
}

/// Catalog entry for a signal; penalty signals have none.
fn catalog(key: SignalKey) -> Option<CatalogEntry> {
    let entry = |title, relevance, value_min, value_max, hours| CatalogEntry {
        title,
        relevance,
        value_min,
        value_max,
        hours,
    };
    match key {
        SignalKey::MultiChain => Some(entry(
            "Cross-chain treasury reconciliation dashboard",
            9,
            3000,
            8000,
            8,
        )),
        SignalKey::Rwa => Some(entry(
            "RWA / off-chain asset reconciliation report",
            10,
            4000,
            10000,
            12,
        )),
        SignalKey::TvlDecline => Some(entry(
            "Burn rate & runway visibility dashboard",
            8,
            2500,
            6000,
            6,
        )),
        SignalKey::VolumeMcap => Some(entry(
            "Trading desk P&L and volume reporting",
            8,
            2000,
            5000,
            5,
        )),
        SignalKey::AthDrawdown => Some(entry("Treasury pressure & runway model", 7, 2000, 5000, 6)),
        SignalKey::LendingCdp => Some(entry(
            "Utilization & liquidation risk dashboard",
            9,
            3000,
            7000,
            8,
        )),
        SignalKey::DexAmm => Some(entry("Fee revenue vs IL P&L dashboard", 9, 2500, 6000, 7)),
        SignalKey::PriceSwing7d => Some(entry(
            "Investor comms one-pager template",
            5,
            1500,
            3500,
            3,
        )),
        SignalKey::DeadRepo => None,
    }
}

/// One recommendation per positive signal key, sorted by relevance then by
/// upper value bound, both descending.
pub fn recommend_deliverables(signals: &[PainSignal]) -> Vec<DeliverableRecommendation> {
    let mut seen = HashSet::new();
    let mut list: Vec<DeliverableRecommendation> = signals
        .iter()
        .filter(|s| s.points > 0.0)
        .filter(|s| seen.insert(s.key))
        .filter_map(|s| {
            catalog(s.key).map(|c| DeliverableRecommendation {
                deliverable_id: s.key,
                title: c.title.to_string(),
                relevance: c.relevance,
                estimated_value_min: c.value_min,
                estimated_value_max: c.value_max,
                build_hours: c.hours,
            })
        })
        .collect();

    list.sort_by(|a, b| {
        b.relevance
            .cmp(&a.relevance)
            .then(b.estimated_value_max.cmp(&a.estimated_value_max))
    });
    list
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sig(key: SignalKey, points: f64) -> PainSignal {
        PainSignal {
            key,
            points,
            explanation: String::new(),
        }
    }

    #[test]
    fn sorts_by_relevance_then_value() {
        let recs = recommend_deliverables(&[
            sig(SignalKey::PriceSwing7d, 1.0),
            sig(SignalKey::DexAmm, 2.0),
            sig(SignalKey::MultiChain, 4.0),
            sig(SignalKey::Rwa, 5.0),
            sig(SignalKey::LendingCdp, 2.0),
        ]);
        let ids: Vec<_> = recs.iter().map(|r| r.deliverable_id).collect();
        assert_eq!(
            ids,
            vec![
                SignalKey::Rwa,
                SignalKey::MultiChain,
                SignalKey::LendingCdp,
                SignalKey::DexAmm,
                SignalKey::PriceSwing7d,
            ]
        );
        assert_eq!(recs[0].title, "RWA / off-chain asset reconciliation report");
        assert_eq!(recs[0].estimated_value_max, 10000);
        assert_eq!(recs[0].build_hours, 12);
    }

    #[test]
    fn skips_non_positive_and_duplicate_signals() {
        let recs = recommend_deliverables(&[
            sig(SignalKey::DeadRepo, -5.0),
            sig(SignalKey::TvlDecline, 3.0),
            sig(SignalKey::TvlDecline, 3.0),
            sig(SignalKey::AthDrawdown, 0.0),
        ]);
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].deliverable_id, SignalKey::TvlDecline);
        assert!(recommend_deliverables(&[]).is_empty());
    }

    #[test]
    fn every_positive_signal_has_a_catalog_entry() {
        let positive = [
            SignalKey::MultiChain,
            SignalKey::Rwa,
            SignalKey::TvlDecline,
            SignalKey::VolumeMcap,
            SignalKey::AthDrawdown,
            SignalKey::LendingCdp,
            SignalKey::DexAmm,
            SignalKey::PriceSwing7d,
        ];
        for key in positive {
            let c = catalog(key).unwrap();
            assert!((1..=10).contains(&c.relevance));
            assert!(c.value_min <= c.value_max);
        }
        assert!(catalog(SignalKey::DeadRepo).is_none());
    }
}
