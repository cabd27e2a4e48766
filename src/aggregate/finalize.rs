//! Projection of an aggregate into bucketed reports.

use std::collections::HashSet;

use crate::classify::Classification;
use crate::models::{AggregateResult, Bucket, FinalReport, QuadrantReport, Report};

/// Project the aggregate into buckets.
///
/// Buckets are filled in the classification's key order; aggregate keys with
/// no bucket are dropped with a warning.
fn project<B, F>(aggregate: &AggregateResult, classification: &Classification, bucket_of: F) -> Report<B>
where
    B: Bucket,
    F: Fn(&str) -> Option<B>,
{
    let mut report = Report::empty();
    let mut seen: HashSet<&str> = HashSet::new();

    for key in classification.keys() {
        seen.insert(key.as_str());
        let extracts = aggregate.extracts(key);
        if extracts.is_empty() {
            continue;
        }
        match bucket_of(key) {
            Some(bucket) => report.extend(bucket, extracts.iter().cloned()),
            None => tracing::warn!(
                "Clause key '{}' has no bucket; dropping {} extracts",
                key,
                extracts.len()
            ),
        }
    }

    for (key, extracts) in aggregate.iter() {
        if !seen.contains(key.as_str()) && !extracts.is_empty() {
            tracing::warn!(
                "Clause key '{}' is not classified; dropping {} extracts",
                key,
                extracts.len()
            );
        }
    }

    report
}

/// Build the risk-tier report for a finished aggregate.
pub fn finalize(aggregate: &AggregateResult, classification: &Classification) -> FinalReport {
    project(aggregate, classification, |key| classification.tier_of(key))
}

/// Build the cost/protection quadrant report for a finished aggregate.
pub fn finalize_quadrants(
    aggregate: &AggregateResult,
    classification: &Classification,
) -> QuadrantReport {
    project(aggregate, classification, |key| classification.quadrant_of(key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Quadrant, RiskTier};

    fn aggregate(entries: &[(&str, &[&str])]) -> AggregateResult {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.iter().map(|s| s.to_string()).collect()))
            .collect()
    }

    #[test]
    fn test_finalize_groups_by_tier_in_key_order() {
        let classification = Classification::from_tiers([
            ("liability", RiskTier::Medium),
            ("termination", RiskTier::High),
            ("indemnity", RiskTier::High),
        ]);
        let agg = aggregate(&[
            ("indemnity", &["clause D"]),
            ("liability", &["clause C"]),
            ("termination", &["clause A", "clause B"]),
        ]);

        let report = finalize(&agg, &classification);
        assert_eq!(report.bucket(RiskTier::High), ["clause A", "clause B", "clause D"]);
        assert_eq!(report.bucket(RiskTier::Medium), ["clause C"]);
        assert!(report.bucket(RiskTier::Low).is_empty());
    }

    #[test]
    fn test_finalize_drops_unclassified_keys() {
        let classification = Classification::from_buckets(
            vec!["termination".into(), "untiered".into()],
            vec!["termination".into()],
            vec![],
            vec![],
        );
        let agg = aggregate(&[
            ("termination", &["clause A"]),
            ("untiered", &["clause U"]),
            ("admitted", &["clause X"]),
        ]);

        let report = finalize(&agg, &classification);
        assert_eq!(report.total(), 1);
        assert_eq!(report.bucket(RiskTier::High), ["clause A"]);
    }

    #[test]
    fn test_buckets_disjoint_and_cover_tiered_extracts() {
        let classification = Classification::from_tiers([
            ("a", RiskTier::High),
            ("b", RiskTier::Medium),
            ("c", RiskTier::Low),
        ]);
        let agg = aggregate(&[("a", &["1", "2"]), ("b", &["3"]), ("c", &["4", "5"])]);
        let report = finalize(&agg, &classification);

        let mut all: Vec<&String> = report.iter().flat_map(|(_, v)| v.iter()).collect();
        all.sort();
        assert_eq!(all, vec!["1", "2", "3", "4", "5"]);
    }

    #[test]
    fn test_finalize_quadrants() {
        let classification = Classification::from_tiers([("a", RiskTier::High), ("b", RiskTier::Low)])
            .with_quadrant("a", Quadrant::HighCostLowProtection);
        let agg = aggregate(&[("a", &["clause A"]), ("b", &["clause B"])]);

        let report = finalize_quadrants(&agg, &classification);
        assert_eq!(report.bucket(Quadrant::HighCostLowProtection), ["clause A"]);
        assert_eq!(report.total(), 1);
    }
}
