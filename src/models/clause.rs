//! Clause categorization models: keys, risk buckets, aggregates and reports.

use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;

use serde::de::{Deserializer, MapAccess, Visitor};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};

/// Label for one contract-clause topic (e.g. "termination without cause").
pub type ClauseKey = String;

/// One chunk's categorization: clause key to extracted sentences.
pub type PartialResult = BTreeMap<ClauseKey, Vec<String>>;

/// Upper bound (inclusive) of the low toxicity band.
pub const LOW_TOXICITY_MAX: f64 = 25.0;
/// Upper bound (inclusive) of the medium toxicity band.
pub const MEDIUM_TOXICITY_MAX: f64 = 75.0;
/// Cost/protection scores at or above this count as "high".
pub const QUADRANT_HIGH_SCORE: f64 = 5.0;

/// Returns true when an extract carries no content.
pub fn is_blank(extract: &str) -> bool {
    extract.trim().is_empty()
}

/// A report bucket that clause keys are projected into.
pub trait Bucket: Copy + Ord + fmt::Debug + Send + Sync + 'static {
    /// Every bucket, in display order.
    const ALL: &'static [Self];

    /// Serialized name.
    fn as_str(&self) -> &'static str;

    /// Human-readable heading.
    fn title(&self) -> &'static str;

    /// Short guidance shown under the heading.
    fn description(&self) -> &'static str;

    fn from_str(s: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|b| b.as_str().eq_ignore_ascii_case(s.trim()))
    }
}

/// Risk tier a clause key belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskTier {
    High,
    Medium,
    Low,
}

impl RiskTier {
    /// Tier for a computed toxicity (financial impact times probability).
    pub fn from_toxicity(toxicity: f64) -> Self {
        if toxicity <= LOW_TOXICITY_MAX {
            Self::Low
        } else if toxicity <= MEDIUM_TOXICITY_MAX {
            Self::Medium
        } else {
            Self::High
        }
    }
}

impl Bucket for RiskTier {
    const ALL: &'static [Self] = &[Self::High, Self::Medium, Self::Low];

    fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }

    fn title(&self) -> &'static str {
        match self {
            Self::High => "High Risk",
            Self::Medium => "Moderate Risk",
            Self::Low => "Low Risk",
        }
    }

    fn description(&self) -> &'static str {
        match self {
            Self::High => {
                "These clauses pose a high risk or significant disadvantage. \
                 Careful consideration and potential negotiation are strongly recommended."
            }
            Self::Medium => {
                "These clauses carry a moderate level of risk or complexity. \
                 Evaluate carefully to determine if they align with your needs."
            }
            Self::Low => {
                "These clauses are generally favorable and pose low risk. \
                 They offer good protection with minimal downsides."
            }
        }
    }
}

impl fmt::Display for RiskTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cost/protection quadrant a clause key belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Quadrant {
    HighCostLowProtection,
    HighCostHighProtection,
    LowCostLowProtection,
    LowCostHighProtection,
}

impl Quadrant {
    pub fn from_scores(cost: f64, protection: f64) -> Self {
        match (cost >= QUADRANT_HIGH_SCORE, protection >= QUADRANT_HIGH_SCORE) {
            (true, false) => Self::HighCostLowProtection,
            (true, true) => Self::HighCostHighProtection,
            (false, false) => Self::LowCostLowProtection,
            (false, true) => Self::LowCostHighProtection,
        }
    }
}

impl Bucket for Quadrant {
    const ALL: &'static [Self] = &[
        Self::HighCostLowProtection,
        Self::HighCostHighProtection,
        Self::LowCostLowProtection,
        Self::LowCostHighProtection,
    ];

    fn as_str(&self) -> &'static str {
        match self {
            Self::HighCostLowProtection => "high_cost_low_protection",
            Self::HighCostHighProtection => "high_cost_high_protection",
            Self::LowCostLowProtection => "low_cost_low_protection",
            Self::LowCostHighProtection => "low_cost_high_protection",
        }
    }

    fn title(&self) -> &'static str {
        match self {
            Self::HighCostLowProtection => "High Cost, Low Protection",
            Self::HighCostHighProtection => "High Cost, High Protection",
            Self::LowCostLowProtection => "Low Cost, Low Protection",
            Self::LowCostHighProtection => "Low Cost, High Protection",
        }
    }

    fn description(&self) -> &'static str {
        match self {
            Self::HighCostLowProtection => "Expensive obligations with little in return.",
            Self::HighCostHighProtection => "Expensive obligations that buy real protection.",
            Self::LowCostLowProtection => "Cheap to accept, but offer little protection.",
            Self::LowCostHighProtection => "Favorable terms: cheap and protective.",
        }
    }
}

/// Run-wide union of all partial results.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AggregateResult {
    entries: BTreeMap<ClauseKey, Vec<String>>,
}

impl AggregateResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Aggregate with every known key mapped to an empty list.
    pub fn seeded<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<ClauseKey>,
    {
        Self {
            entries: keys.into_iter().map(|k| (k.into(), Vec::new())).collect(),
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn extracts(&self, key: &str) -> &[String] {
        self.entries.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn keys(&self) -> impl Iterator<Item = &ClauseKey> {
        self.entries.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ClauseKey, &Vec<String>)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total number of extracts across all keys.
    pub fn total_extracts(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    /// Mutable list for a key, creating it when absent.
    pub(crate) fn entry_mut(&mut self, key: &str) -> &mut Vec<String> {
        self.entries.entry(key.to_string()).or_default()
    }

    /// Copy with blank extracts removed.
    pub fn without_blank(&self) -> Self {
        Self {
            entries: self
                .entries
                .iter()
                .map(|(k, v)| (k.clone(), v.iter().filter(|e| !is_blank(e)).cloned().collect()))
                .collect(),
        }
    }
}

impl FromIterator<(ClauseKey, Vec<String>)> for AggregateResult {
    fn from_iter<T: IntoIterator<Item = (ClauseKey, Vec<String>)>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// Extracts grouped by bucket. Every bucket is always present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report<B: Bucket> {
    buckets: BTreeMap<B, Vec<String>>,
}

/// Report grouped by risk tier.
pub type FinalReport = Report<RiskTier>;

/// Report grouped by cost/protection quadrant.
pub type QuadrantReport = Report<Quadrant>;

impl<B: Bucket> Default for Report<B> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<B: Bucket> Report<B> {
    pub fn empty() -> Self {
        Self {
            buckets: B::ALL.iter().map(|b| (*b, Vec::new())).collect(),
        }
    }

    pub fn bucket(&self, bucket: B) -> &[String] {
        self.buckets.get(&bucket).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn extend<I>(&mut self, bucket: B, extracts: I)
    where
        I: IntoIterator<Item = String>,
    {
        self.buckets.entry(bucket).or_default().extend(extracts);
    }

    /// Append every bucket of `other` onto this report.
    pub fn append(&mut self, other: &Self) {
        for (bucket, extracts) in &other.buckets {
            self.extend(*bucket, extracts.iter().cloned());
        }
    }

    pub fn total(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (B, &[String])> {
        B::ALL.iter().map(move |b| (*b, self.bucket(*b)))
    }

    /// Copy with blank extracts removed.
    pub fn without_blank(&self) -> Self {
        Self {
            buckets: self
                .buckets
                .iter()
                .map(|(b, v)| (*b, v.iter().filter(|e| !is_blank(e)).cloned().collect()))
                .collect(),
        }
    }

    /// Render as a Markdown document.
    pub fn to_markdown(&self, title: &str) -> String {
        let mut out = format!("# {}\n", title);
        for (bucket, extracts) in self.iter() {
            out.push_str(&format!("\n## {}\n\n_{}_\n\n", bucket.title(), bucket.description()));
            if extracts.is_empty() {
                out.push_str("No clauses found.\n");
            }
            for extract in extracts {
                out.push_str(&format!("- {}\n", extract.replace('\n', " ")));
            }
        }
        out
    }
}

impl<B: Bucket> Serialize for Report<B> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(B::ALL.len()))?;
        for (bucket, extracts) in self.iter() {
            map.serialize_entry(bucket.as_str(), extracts)?;
        }
        map.end()
    }
}

impl<'de, B: Bucket> Deserialize<'de> for Report<B> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ReportVisitor<B>(PhantomData<B>);

        impl<'de, B: Bucket> Visitor<'de> for ReportVisitor<B> {
            type Value = Report<B>;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of bucket names to lists of strings")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut report = Report::empty();
                while let Some(name) = access.next_key::<String>()? {
                    let extracts: Option<Vec<String>> = access.next_value()?;
                    match B::from_str(&name) {
                        Some(bucket) => report.extend(bucket, extracts.unwrap_or_default()),
                        None => tracing::debug!("Ignoring unknown report bucket: {}", name),
                    }
                }
                Ok(report)
            }
        }

        deserializer.deserialize_map(ReportVisitor(PhantomData))
    }
}
