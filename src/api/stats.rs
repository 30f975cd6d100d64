//! Aggregates behind `GET /stats/summary`: prospect mix and outreach funnel.

use std::collections::HashMap;

use serde::Serialize;

use crate::types::{PipelineEntry, PipelineStatus, Prospect};

const TOP_CATEGORIES: usize = 12;

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CategoryCount {
    pub category: String,
    pub count: usize,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScoreBin {
    pub label: &'static str,
    pub count: usize,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Funnel {
    /// Reached at least `HookSent`.
    pub contacted: usize,
    /// Reached at least `Replied`.
    pub responded: usize,
    pub converted: usize,
    /// Estimated value of open deals (`HookBuilding` through `DemoBuilt`).
    pub pipeline_value: f64,
    pub total_revenue: f64,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SummaryResponse {
    pub total_prospects: usize,
    pub treasury_gated: usize,
    pub score_jumped: usize,
    pub by_category: Vec<CategoryCount>,
    pub score_distribution: Vec<ScoreBin>,
    pub funnel: Funnel,
}

/// Half-open bins so one-decimal scores always land somewhere.
fn score_bins(prospects: &[Prospect]) -> Vec<ScoreBin> {
    let bins: [(&'static str, f64, f64); 4] = [
        ("0-2", 0.0, 3.0),
        ("3-4", 3.0, 5.0),
        ("5-6", 5.0, 7.0),
        ("7+", 7.0, f64::INFINITY),
    ];
    bins.into_iter()
        .map(|(label, lo, hi)| ScoreBin {
            label,
            count: prospects
                .iter()
                .filter(|p| p.pain_score >= lo && p.pain_score < hi)
                .count(),
        })
        .collect()
}

fn by_category(prospects: &[Prospect]) -> Vec<CategoryCount> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for p in prospects {
        let c = if p.category.is_empty() { "Uncategorized" } else { p.category.as_str() };
        *counts.entry(c).or_default() += 1;
    }
    let mut list: Vec<CategoryCount> = counts
        .into_iter()
        .map(|(category, count)| CategoryCount {
            category: category.to_string(),
            count,
        })
        .collect();
    list.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.category.cmp(&b.category)));
    list.truncate(TOP_CATEGORIES);
    list
}

fn funnel(pipeline: &[PipelineEntry]) -> Funnel {
    let open = PipelineStatus::HookBuilding..=PipelineStatus::DemoBuilt;
    Funnel {
        contacted: pipeline.iter().filter(|e| e.status >= PipelineStatus::HookSent).count(),
        responded: pipeline.iter().filter(|e| e.status >= PipelineStatus::Replied).count(),
        converted: pipeline.iter().filter(|e| e.status == PipelineStatus::Converted).count(),
        pipeline_value: pipeline
            .iter()
            .filter(|e| open.contains(&e.status))
            .filter_map(|e| e.estimated_value)
            .sum(),
        total_revenue: pipeline
            .iter()
            .filter(|e| e.status == PipelineStatus::Converted)
            .filter_map(|e| e.revenue)
            .sum(),
    }
}

pub fn summarize(prospects: &[Prospect], pipeline: &[PipelineEntry]) -> SummaryResponse {
    SummaryResponse {
        total_prospects: prospects.len(),
        treasury_gated: prospects.iter().filter(|p| p.treasury_gated).count(),
        score_jumped: prospects.iter().filter(|p| p.score_jumped).count(),
        by_category: by_category(prospects),
        score_distribution: score_bins(prospects),
        funnel: funnel(pipeline),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::store::tests::prospect;
    use chrono::Utc;

    fn entry(status: PipelineStatus, value: Option<f64>, revenue: Option<f64>) -> PipelineEntry {
        PipelineEntry {
            prospect_id: format!("dl-{status}"),
            status,
            contacted_at: None,
            notes: None,
            follow_up_at: None,
            estimated_value: value,
            revenue,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn bins_cover_fractional_scores() {
        let ps: Vec<_> = [0.0, 2.9, 3.0, 4.5, 6.9, 7.0, 10.0]
            .iter()
            .enumerate()
            .map(|(i, s)| prospect(&format!("dl-{i}"), *s))
            .collect();
        let counts: Vec<_> = score_bins(&ps).into_iter().map(|b| b.count).collect();
        assert_eq!(counts, vec![2, 2, 1, 2]);
    }

    #[test]
    fn funnel_counts_by_stage() {
        let pipeline = vec![
            entry(PipelineStatus::Uncontacted, Some(100.0), None),
            entry(PipelineStatus::HookBuilding, Some(1000.0), None),
            entry(PipelineStatus::HookSent, Some(2000.0), None),
            entry(PipelineStatus::Replied, None, None),
            entry(PipelineStatus::Converted, Some(9000.0), Some(4500.0)),
        ];
        assert_eq!(
            funnel(&pipeline),
            Funnel {
                contacted: 3,
                responded: 2,
                converted: 1,
                pipeline_value: 3000.0,
                total_revenue: 4500.0,
            }
        );
    }

    #[test]
    fn categories_sorted_by_count() {
        let mut a = prospect("dl-a", 1.0);
        a.category = "Lending".to_string();
        let mut b = prospect("dl-b", 1.0);
        b.category = String::new();
        let c = prospect("dl-c", 1.0);
        let d = prospect("dl-d", 1.0);
        let cats = by_category(&[a, b, c, d]);
        assert_eq!(
            cats[0],
            CategoryCount {
                category: "Dexes".to_string(),
                count: 2,
            }
        );
        assert_eq!(cats[1].category, "Lending");
        assert_eq!(cats[2].category, "Uncategorized");
    }
}
