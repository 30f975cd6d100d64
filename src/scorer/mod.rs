pub mod deliverables;
pub mod pain;

pub use deliverables::recommend_deliverables;
pub use pain::{apply_treasury_gate, compute_pain_signals, compute_raw_score, GateResult};
