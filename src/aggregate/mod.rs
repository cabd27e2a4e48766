//! Result aggregation for a single analysis run.
//!
//! Every chunk of a contract yields a [`PartialResult`] from the categorizer.
//! The [`Aggregator`] folds those into one [`AggregateResult`] and, once all
//! chunks are accounted for, projects it into a [`FinalReport`].

mod finalize;
mod merge;
mod parse;
mod version;

use thiserror::Error;

use crate::classify::Classification;
use crate::models::{AggregateResult, ClauseKey, FinalReport, PartialResult, QuadrantReport};

pub use finalize::{finalize, finalize_quadrants};
pub use merge::{merge_partial, MergeReport, UnknownKeyPolicy};
pub use parse::{parse_model_output, ParseError};
pub use version::{next_version, parse_version, resolve_latest_version, slot_name};

/// Lifecycle of an aggregator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Idle,
    Collecting,
    Finalized,
}

impl RunPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Collecting => "collecting",
            Self::Finalized => "finalized",
        }
    }
}

/// Errors from driving an [`Aggregator`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AggregateError {
    #[error("Aggregator is {0}, expected collecting")]
    NotCollecting(&'static str),

    #[error("Aggregator already finalized")]
    AlreadyFinalized,

    #[error("No chunks processed ({failed} failed)")]
    NoChunksProcessed { failed: usize },
}

/// Single-writer accumulator for one run.
#[derive(Debug)]
pub struct Aggregator {
    phase: RunPhase,
    policy: UnknownKeyPolicy,
    aggregate: AggregateResult,
    merged: MergeReport,
    succeeded: usize,
    failed: usize,
}

impl Aggregator {
    pub fn new(policy: UnknownKeyPolicy) -> Self {
        Self {
            phase: RunPhase::Idle,
            policy,
            aggregate: AggregateResult::new(),
            merged: MergeReport::default(),
            succeeded: 0,
            failed: 0,
        }
    }

    /// Start collecting, seeding the aggregate with every known key.
    pub fn begin<'a, I>(&mut self, keys: I) -> Result<(), AggregateError>
    where
        I: IntoIterator<Item = &'a ClauseKey>,
    {
        match self.phase {
            RunPhase::Idle => {}
            RunPhase::Collecting => return Err(AggregateError::NotCollecting("collecting")),
            RunPhase::Finalized => return Err(AggregateError::AlreadyFinalized),
        }
        self.aggregate = AggregateResult::seeded(keys.into_iter().map(|k| k.as_str()));
        self.phase = RunPhase::Collecting;
        Ok(())
    }

    fn ensure_collecting(&self) -> Result<(), AggregateError> {
        match self.phase {
            RunPhase::Collecting => Ok(()),
            RunPhase::Finalized => Err(AggregateError::AlreadyFinalized),
            RunPhase::Idle => Err(AggregateError::NotCollecting(RunPhase::Idle.as_str())),
        }
    }

    /// Merge the partial result of a chunk that was categorized successfully.
    pub fn record_success(
        &mut self,
        chunk: usize,
        partial: &PartialResult,
    ) -> Result<MergeReport, AggregateError> {
        self.ensure_collecting()?;
        let report = merge_partial(&mut self.aggregate, partial, self.policy);
        tracing::debug!(
            "Chunk {}: {} added, {} duplicate, {} blank, {} rejected",
            chunk,
            report.added,
            report.duplicates,
            report.blank,
            report.rejected
        );
        self.succeeded += 1;
        self.merged.absorb(report.clone());
        Ok(report)
    }

    /// Note a chunk that produced nothing usable.
    pub fn record_failure(&mut self, chunk: usize, reason: &str) -> Result<(), AggregateError> {
        self.ensure_collecting()?;
        tracing::warn!("Chunk {} contributed nothing: {}", chunk, reason);
        self.failed += 1;
        Ok(())
    }

    /// Close the run and build its report.
    pub fn finalize(&mut self, classification: &Classification) -> Result<FinalReport, AggregateError> {
        self.ensure_collecting()?;
        if self.succeeded == 0 {
            return Err(AggregateError::NoChunksProcessed {
                failed: self.failed,
            });
        }
        self.phase = RunPhase::Finalized;
        tracing::info!(
            "Finalized aggregate: {} extracts from {} chunks ({} failed)",
            self.aggregate.total_extracts(),
            self.succeeded,
            self.failed
        );
        Ok(finalize(&self.aggregate, classification))
    }

    /// Quadrant view of a finalized aggregate.
    pub fn quadrant_report(&self, classification: &Classification) -> Option<QuadrantReport> {
        (self.phase == RunPhase::Finalized && classification.has_quadrants())
            .then(|| finalize_quadrants(&self.aggregate, classification))
    }

    pub fn aggregate(&self) -> &AggregateResult {
        &self.aggregate
    }

    pub fn into_aggregate(self) -> AggregateResult {
        self.aggregate
    }

    /// Running tally of every merge so far.
    pub fn merged(&self) -> &MergeReport {
        &self.merged
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    pub fn succeeded(&self) -> usize {
        self.succeeded
    }

    pub fn failed(&self) -> usize {
        self.failed
    }
}
