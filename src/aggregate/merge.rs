//! Merging partial categorizations into the run aggregate.

use serde::{Deserialize, Serialize};

use crate::models::{is_blank, AggregateResult, ClauseKey, PartialResult};

/// What to do with a clause key the aggregate was not seeded with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnknownKeyPolicy {
    /// Drop the key and its extracts.
    #[default]
    Strict,
    /// Admit the key as a new aggregate entry.
    Lenient,
}

impl UnknownKeyPolicy {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "strict" => Some(Self::Strict),
            "lenient" => Some(Self::Lenient),
            _ => None,
        }
    }
}

/// Tally of one merge.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MergeReport {
    /// Extracts appended to the aggregate.
    pub added: usize,
    /// Extracts already present under the same key.
    pub duplicates: usize,
    /// Empty or whitespace-only extracts skipped.
    pub blank: usize,
    /// Extracts dropped with an unknown key.
    pub rejected: usize,
    /// Keys not present in the aggregate when the merge started.
    pub unknown_keys: Vec<ClauseKey>,
}

impl MergeReport {
    /// Fold another tally into this one.
    pub fn absorb(&mut self, other: MergeReport) {
        self.added += other.added;
        self.duplicates += other.duplicates;
        self.blank += other.blank;
        self.rejected += other.rejected;
        for key in other.unknown_keys {
            if !self.unknown_keys.contains(&key) {
                self.unknown_keys.push(key);
            }
        }
    }
}

/// Spelling an admitted unknown key is stored under.
///
/// Independent of which variant a model emits first, so lenient merges
/// produce the same keys in any order.
pub fn canonical_key(key: &str) -> ClauseKey {
    key.trim().to_lowercase()
}

/// Find the aggregate key a partial key refers to.
///
/// Exact match first, then a trimmed case-insensitive match so that
/// "Termination " from a model still lands on "termination".
fn resolve_key(aggregate: &AggregateResult, key: &str) -> Option<ClauseKey> {
    if aggregate.contains_key(key) {
        return Some(key.to_string());
    }
    let wanted = canonical_key(key);
    aggregate
        .keys()
        .find(|k| canonical_key(k) == wanted)
        .cloned()
}

/// Merge one chunk's partial result into the aggregate.
///
/// Blank extracts are skipped, extracts are trimmed and deduplicated by exact
/// match within their key, so re-applying the same partial changes nothing.
pub fn merge_partial(
    aggregate: &mut AggregateResult,
    partial: &PartialResult,
    policy: UnknownKeyPolicy,
) -> MergeReport {
    let mut report = MergeReport::default();

    for (raw_key, extracts) in partial {
        let key = match resolve_key(aggregate, raw_key) {
            Some(key) => key,
            None => {
                let key = canonical_key(raw_key);
                if !report.unknown_keys.contains(&key) {
                    report.unknown_keys.push(key.clone());
                }
                match policy {
                    UnknownKeyPolicy::Strict => {
                        let dropped = extracts.iter().filter(|e| !is_blank(e)).count();
                        report.rejected += dropped;
                        tracing::warn!(
                            "Dropping unknown clause key '{}' ({} extracts)",
                            key,
                            dropped
                        );
                        continue;
                    }
                    UnknownKeyPolicy::Lenient => {
                        tracing::warn!("Admitting unknown clause key '{}'", key);
                        key
                    }
                }
            }
        };

        let list = aggregate.entry_mut(&key);
        for extract in extracts {
            if is_blank(extract) {
                report.blank += 1;
                continue;
            }
            let extract = extract.trim();
            if list.iter().any(|existing| existing == extract) {
                report.duplicates += 1;
            } else {
                list.push(extract.to_string());
                report.added += 1;
            }
        }
    }

    report
}
