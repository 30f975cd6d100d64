//! Pain-signal rubric, composite score, and treasury gate. All pure.

use crate::config::{SCORE_MAX, SCORE_MIN, TREASURY_GATE_CAP, TREASURY_GATE_TVL};
use crate::types::{PainSignal, RawProspect, SignalKey};

fn signal(key: SignalKey, points: f64, explanation: String) -> PainSignal {
    PainSignal {
        key,
        points,
        explanation,
    }
}

/// `(volume / mcap) * 100`, zero when mcap is unknown or not positive.
pub fn volume_mcap_pct(volume: Option<f64>, mcap: Option<f64>) -> f64 {
    let mcap = mcap.unwrap_or(0.0);
    if mcap > 0.0 {
        volume.unwrap_or(0.0) / mcap * 100.0
    } else {
        0.0
    }
}

/// Every rule is evaluated independently; output keeps rubric order.
/// Missing numeric inputs count as zero, so they never fire a threshold rule.
pub fn compute_pain_signals(r: &RawProspect) -> Vec<PainSignal> {
    let mut out = Vec::new();

    let chain_count = r.chains.len();
    if chain_count >= 3 {
        out.push(signal(
            SignalKey::MultiChain,
            4.0,
            format!(
                "Deployed on {chain_count} chains: treasury reconciliation across chains is a common pain point."
            ),
        ));
    }

    let category = r.category.to_lowercase();
    if category.contains("rwa") || category.contains("real world") {
        out.push(signal(
            SignalKey::Rwa,
            5.0,
            "RWA category: off-chain/on-chain asset reconciliation and reporting gaps.".to_string(),
        ));
    }

    let tvl_change = r.tvl_change_1m.unwrap_or(0.0);
    if tvl_change <= -20.0 {
        out.push(signal(
            SignalKey::TvlDecline,
            3.0,
            format!(
                "TVL down {:.0}% (30d proxy): burn rate visibility and investor reporting pressure.",
                (-tvl_change).round()
            ),
        ));
    }

    let ratio = volume_mcap_pct(r.volume, r.mcap);
    if ratio >= 15.0 {
        out.push(signal(
            SignalKey::VolumeMcap,
            2.0,
            format!("Volume/MCap {ratio:.1}%: active trading desk needs reporting."),
        ));
    }

    let ath = r.ath_change_pct.unwrap_or(0.0);
    if ath <= -70.0 {
        out.push(signal(
            SignalKey::AthDrawdown,
            2.0,
            format!(
                "ATH drawdown {:.0}%: treasury pressure and runway modeling.",
                (-ath).round()
            ),
        ));
    }

    if category.contains("lending") || category.contains("cdp") {
        out.push(signal(
            SignalKey::LendingCdp,
            2.0,
            "Lending/CDP category: utilization rate and liquidation risk reporting gaps.".to_string(),
        ));
    }

    if category.contains("dex") || category.contains("amm") {
        out.push(signal(
            SignalKey::DexAmm,
            2.0,
            "DEX/AMM category: fee revenue vs IL P&L often missing.".to_string(),
        ));
    }

    let price_7d = r.price_change_7d.unwrap_or(0.0);
    if price_7d.abs() >= 25.0 {
        let sign = if price_7d >= 0.0 { "+" } else { "" };
        out.push(signal(
            SignalKey::PriceSwing7d,
            1.0,
            format!("7-day price swing {sign}{price_7d:.1}%: investor comms burden."),
        ));
    }

    // Absent snapshot is "unknown", not "dead".
    if r
        .github_activity
        .as_ref()
        .is_some_and(|a| a.commit_count_30d == 0)
    {
        out.push(signal(
            SignalKey::DeadRepo,
            -5.0,
            "No commits in last 30 days: abandoned project, flight risk.".to_string(),
        ));
    }

    out
}

/// Sum of points, rounded to one decimal, clamped to `[0, 10]`.
pub fn compute_raw_score(signals: &[PainSignal]) -> f64 {
    let sum: f64 = signals.iter().map(|s| s.points).sum();
    ((sum * 10.0).round() / 10.0).clamp(SCORE_MIN, SCORE_MAX)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GateResult {
    pub score: f64,
    pub treasury_gated: bool,
}

/// Caps low-TVL, non-VC-backed prospects. Never raises a score. The flag is set
/// whenever the gate applies, even if the cap was not binding.
pub fn apply_treasury_gate(raw_score: f64, tvl: f64, vc_backed: Option<bool>) -> GateResult {
    if vc_backed == Some(true) {
        return GateResult {
            score: raw_score,
            treasury_gated: false,
        };
    }
    if tvl < TREASURY_GATE_TVL {
        return GateResult {
            score: raw_score.min(TREASURY_GATE_CAP),
            treasury_gated: true,
        };
    }
    GateResult {
        score: raw_score,
        treasury_gated: false,
    }
}
