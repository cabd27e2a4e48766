//! Clause key classification into risk tiers.
//!
//! A [`Classification`] is decided once per run: it enumerates every known
//! clause key and assigns each one a [`RiskTier`] (and, when cost/protection
//! scores exist, a [`Quadrant`]). It can come from a local weights table or
//! from a remote toxicity service.

mod remote;
mod weights;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ClassifierConfig;
use crate::models::{Bucket, ClauseKey, Quadrant, RiskTier};

pub use remote::RemoteClassifier;
pub use weights::{LocalWeights, WeightRow, WeightsFile};

/// Errors that can occur while building a classification.
#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unsupported weights format: {0}")]
    UnsupportedFormat(String),

    #[error("Failed to parse weights: {0}")]
    Parse(String),

    #[error("Classifier request failed: {0}")]
    Http(String),

    #[error("Classifier returned an error: {0}")]
    Remote(String),

    #[error("Classification contains no clause keys")]
    Empty,
}

/// Known clause keys and their buckets.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Classification {
    keys: Vec<ClauseKey>,
    tiers: HashMap<ClauseKey, RiskTier>,
    quadrants: HashMap<ClauseKey, Quadrant>,
}

impl Classification {
    /// Build from an explicit (key, tier) list. Later duplicates are ignored.
    pub fn from_tiers<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, RiskTier)>,
        S: Into<ClauseKey>,
    {
        let mut classification = Self::default();
        for (key, tier) in entries {
            let key = key.into();
            if classification.tiers.contains_key(&key) {
                continue;
            }
            classification.keys.push(key.clone());
            classification.tiers.insert(key, tier);
        }
        classification
    }

    /// Build from weight rows: toxicity = financial impact x probability.
    pub fn from_weights(rows: &[WeightRow]) -> Self {
        let mut classification = Self::default();
        for row in rows {
            let key = row.term.trim().to_string();
            if key.is_empty() || classification.tiers.contains_key(&key) {
                continue;
            }
            let tier = RiskTier::from_toxicity(row.toxicity());
            if let (Some(cost), Some(protection)) = (row.cost, row.protection) {
                classification
                    .quadrants
                    .insert(key.clone(), Quadrant::from_scores(cost, protection));
            }
            classification.keys.push(key.clone());
            classification.tiers.insert(key, tier);
        }
        classification
    }

    /// Build from pre-partitioned lists.
    ///
    /// Keys listed in `all` but in no bucket stay untiered; bucketed keys
    /// missing from `all` are appended to the key list.
    pub fn from_buckets(
        all: Vec<ClauseKey>,
        high: Vec<ClauseKey>,
        medium: Vec<ClauseKey>,
        low: Vec<ClauseKey>,
    ) -> Self {
        let mut classification = Self::default();
        for key in all {
            let key = key.trim().to_string();
            if !key.is_empty() && !classification.keys.contains(&key) {
                classification.keys.push(key);
            }
        }
        for (tier, keys) in [
            (RiskTier::High, high),
            (RiskTier::Medium, medium),
            (RiskTier::Low, low),
        ] {
            for key in keys {
                let key = key.trim().to_string();
                if key.is_empty() || classification.tiers.contains_key(&key) {
                    continue;
                }
                if !classification.keys.contains(&key) {
                    classification.keys.push(key.clone());
                }
                classification.tiers.insert(key, tier);
            }
        }
        classification
    }

    /// Attach a quadrant to a key.
    pub fn with_quadrant(mut self, key: &str, quadrant: Quadrant) -> Self {
        self.quadrants.insert(key.to_string(), quadrant);
        self
    }

    /// Every known key, in enumeration order.
    pub fn keys(&self) -> &[ClauseKey] {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.iter().any(|k| k == key)
    }

    pub fn tier_of(&self, key: &str) -> Option<RiskTier> {
        self.tiers.get(key).copied()
    }

    pub fn quadrant_of(&self, key: &str) -> Option<Quadrant> {
        self.quadrants.get(key).copied()
    }

    pub fn has_quadrants(&self) -> bool {
        !self.quadrants.is_empty()
    }

    /// Keys assigned to a tier, in enumeration order.
    pub fn keys_in(&self, tier: RiskTier) -> Vec<&ClauseKey> {
        self.keys
            .iter()
            .filter(|k| self.tier_of(k) == Some(tier))
            .collect()
    }

    pub fn to_summary(&self) -> ClassificationSummary {
        let names = |tier: RiskTier| -> Vec<ClauseKey> {
            self.keys_in(tier).into_iter().cloned().collect()
        };
        let mut quadrants: BTreeMap<String, Vec<ClauseKey>> = BTreeMap::new();
        for key in &self.keys {
            if let Some(q) = self.quadrant_of(key) {
                quadrants.entry(q.as_str().to_string()).or_default().push(key.clone());
            }
        }
        ClassificationSummary {
            all_items: self.keys.clone(),
            high_toxicity_items: names(RiskTier::High),
            medium_toxicity_items: names(RiskTier::Medium),
            low_toxicity_items: names(RiskTier::Low),
            quadrants,
        }
    }
}

/// Wire form of a classification.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassificationSummary {
    pub all_items: Vec<ClauseKey>,
    #[serde(default, alias = "high")]
    pub high_toxicity_items: Vec<ClauseKey>,
    #[serde(default, alias = "medium")]
    pub medium_toxicity_items: Vec<ClauseKey>,
    #[serde(default, alias = "low")]
    pub low_toxicity_items: Vec<ClauseKey>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub quadrants: BTreeMap<String, Vec<ClauseKey>>,
}

impl From<ClassificationSummary> for Classification {
    fn from(summary: ClassificationSummary) -> Self {
        let mut classification = Classification::from_buckets(
            summary.all_items,
            summary.high_toxicity_items,
            summary.medium_toxicity_items,
            summary.low_toxicity_items,
        );
        for (name, keys) in summary.quadrants {
            if let Some(q) = Quadrant::from_str(&name) {
                for key in keys {
                    classification.quadrants.insert(key, q);
                }
            }
        }
        classification
    }
}

/// Something that can produce the run's classification.
#[async_trait]
pub trait ClassificationSource: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    async fn load(&self) -> Result<Classification, ClassifyError>;
}

#[async_trait]
impl ClassificationSource for Classification {
    fn name(&self) -> &str {
        "static"
    }

    async fn load(&self) -> Result<Classification, ClassifyError> {
        if self.is_empty() {
            return Err(ClassifyError::Empty);
        }
        Ok(self.clone())
    }
}

/// Pick the classification source configured for this installation.
///
/// A remote endpoint wins over a weights file when both are set.
pub fn source_from_config(
    config: &ClassifierConfig,
    data_dir: &std::path::Path,
) -> Arc<dyn ClassificationSource> {
    if let Some(endpoint) = config.endpoint.as_deref().filter(|e| !e.is_empty()) {
        return Arc::new(RemoteClassifier::new(endpoint, config.api_key.clone()));
    }
    let path = config
        .weights_path
        .clone()
        .unwrap_or_else(|| data_dir.join(weights::DEFAULT_WEIGHTS_FILENAME));
    Arc::new(LocalWeights::new(path))
}
