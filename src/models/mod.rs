//! Data models for clauseguard.

mod clause;
mod run;

pub use clause::{
    is_blank, AggregateResult, Bucket, ClauseKey, FinalReport, PartialResult, Quadrant,
    QuadrantReport, Report, RiskTier, LOW_TOXICITY_MAX, MEDIUM_TOXICITY_MAX,
};
pub use run::{Run, RunStatus};
