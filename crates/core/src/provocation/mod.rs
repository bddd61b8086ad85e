pub mod ledger;
pub mod scoring;

pub use ledger::{ProvocationLedger, ScoredProvocation};
pub use scoring::{Thresholds, apply_decay, classify, meets_threshold, score_message};
