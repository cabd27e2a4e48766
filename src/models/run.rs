//! Analysis run records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a recorded run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Collecting,
    Finalized,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Collecting => "collecting",
            Self::Finalized => "finalized",
            Self::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "collecting" => Some(Self::Collecting),
            "finalized" => Some(Self::Finalized),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// One analysis run over one uploaded contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub id: String,
    pub status: RunStatus,
    /// File the chunks were extracted from.
    pub source_file: String,
    /// Result slot version, set once finalized.
    pub version: Option<u64>,
    pub chunk_count: usize,
    pub chunks_succeeded: usize,
    pub chunks_failed: usize,
    /// Directory holding the stored artifacts.
    pub artifact_dir: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Run {
    pub fn new(source_file: String, chunk_count: usize) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            status: RunStatus::Collecting,
            source_file,
            version: None,
            chunk_count,
            chunks_succeeded: 0,
            chunks_failed: 0,
            artifact_dir: None,
            error: None,
            created_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.status != RunStatus::Collecting
    }
}
