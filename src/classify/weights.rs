//! Local weights table: per-term financial impact and probability.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{Classification, ClassificationSource, ClassifyError};

/// Default weights filename looked up in the data directory.
pub const DEFAULT_WEIGHTS_FILENAME: &str = "weights.toml";

/// One row of the weights table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightRow {
    /// Contractual term; becomes the clause key.
    #[serde(alias = "Contractual Terms")]
    pub term: String,
    #[serde(alias = "Financial Impact")]
    pub financial_impact: f64,
    #[serde(alias = "Probability of happening")]
    pub probability: f64,
    /// Optional cost score (0-10) for the quadrant view.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
    /// Optional protection score (0-10) for the quadrant view.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protection: Option<f64>,
}

impl WeightRow {
    pub fn toxicity(&self) -> f64 {
        self.financial_impact * self.probability
    }
}

/// Weights file contents.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WeightsFile {
    #[serde(default)]
    pub terms: Vec<WeightRow>,
}

/// JSON weights may be a bare array of rows.
#[derive(Deserialize)]
#[serde(untagged)]
enum JsonWeights {
    Table(WeightsFile),
    Rows(Vec<WeightRow>),
}

impl WeightsFile {
    /// Parse weights text, choosing the format from the file extension.
    pub fn parse(contents: &str, ext: &str) -> Result<Self, ClassifyError> {
        match ext {
            "toml" => toml::from_str(contents).map_err(|e| ClassifyError::Parse(e.to_string())),
            "yaml" | "yml" => {
                serde_yaml::from_str(contents).map_err(|e| ClassifyError::Parse(e.to_string()))
            }
            "json" => match serde_json::from_str::<JsonWeights>(contents) {
                Ok(JsonWeights::Table(file)) => Ok(file),
                Ok(JsonWeights::Rows(terms)) => Ok(Self { terms }),
                Err(e) => Err(ClassifyError::Parse(e.to_string())),
            },
            other => Err(ClassifyError::UnsupportedFormat(other.to_string())),
        }
    }

    pub async fn load(path: &Path) -> Result<Self, ClassifyError> {
        let contents = tokio::fs::read_to_string(path).await?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("toml")
            .to_lowercase();
        Self::parse(&contents, &ext)
    }
}

/// Classification built from a weights file on disk.
pub struct LocalWeights {
    path: PathBuf,
}

impl LocalWeights {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ClassificationSource for LocalWeights {
    fn name(&self) -> &str {
        "weights"
    }

    async fn load(&self) -> Result<Classification, ClassifyError> {
        let file = WeightsFile::load(&self.path).await?;
        let classification = Classification::from_weights(&file.terms);
        if classification.is_empty() {
            return Err(ClassifyError::Empty);
        }
        tracing::debug!(
            "Loaded {} clause keys from {}",
            classification.len(),
            self.path.display()
        );
        Ok(classification)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RiskTier;

    #[test]
    fn test_parse_toml() {
        let file = WeightsFile::parse(
            r#"
            [[terms]]
            term = "termination without cause"
            financial_impact = 9
            probability = 9

            [[terms]]
            term = "governing law"
            financial_impact = 2
            probability = 3
            cost = 1
            protection = 7
            "#,
            "toml",
        )
        .unwrap();

        assert_eq!(file.terms.len(), 2);
        assert_eq!(file.terms[1].protection, Some(7.0));
    }

    #[test]
    fn test_parse_json_rows_with_spreadsheet_headers() {
        let file = WeightsFile::parse(
            r#"[{"Contractual Terms": "liability cap", "Financial Impact": 6, "Probability of happening": 8}]"#,
            "json",
        )
        .unwrap();
        assert_eq!(file.terms[0].term, "liability cap");
        assert_eq!(file.terms[0].toxicity(), 48.0);
    }

    #[test]
    fn test_unsupported_extension() {
        assert!(matches!(
            WeightsFile::parse("", "xlsx"),
            Err(ClassifyError::UnsupportedFormat(_))
        ));
    }

    #[tokio::test]
    async fn test_local_weights_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weights.yaml");
        std::fs::write(
            &path,
            "terms:\n  - term: auto renewal\n    financial_impact: 5\n    probability: 6\n",
        )
        .unwrap();

        let classification = LocalWeights::new(path).load().await.unwrap();
        assert_eq!(classification.tier_of("auto renewal"), Some(RiskTier::Medium));
    }

    #[tokio::test]
    async fn test_local_weights_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let source = LocalWeights::new(dir.path().join("missing.toml"));
        assert!(matches!(source.load().await, Err(ClassifyError::Io(_))));
    }
}
