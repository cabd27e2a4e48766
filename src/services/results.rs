//! Reading and writing stored reports.

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::config::Settings;
use crate::models::{AggregateResult, FinalReport, Run};
use crate::repository::{RepositoryError, RunRepository};
use crate::storage::{ResultStore, StoreError, StoredResult};

#[derive(Debug, Error)]
pub enum ResultsError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error("Item {index} is not a report: {message}")]
    InvalidItem { index: usize, message: String },

    #[error("No report data supplied")]
    EmptyData,
}

/// A stored report and the run that produced it, if known.
#[derive(Debug, Clone, Serialize)]
pub struct VersionedReport {
    pub version: u64,
    pub report: FinalReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run: Option<Run>,
}

/// Read side of the result store, joined with the run ledger.
#[derive(Debug, Clone)]
pub struct ResultsService {
    store: ResultStore,
    runs: RunRepository,
}

impl ResultsService {
    pub fn new(settings: &Settings) -> Result<Self, ResultsError> {
        Ok(Self {
            store: ResultStore::new(settings.results_dir()),
            runs: RunRepository::new(&settings.database_path())?,
        })
    }

    pub fn from_parts(store: ResultStore, runs: RunRepository) -> Self {
        Self { store, runs }
    }

    pub fn store(&self) -> &ResultStore {
        &self.store
    }

    /// Highest version known to either the ledger or the slot directory.
    ///
    /// Slots written through [`Self::write_merged`] have no run, so the
    /// directory scan can be ahead of the ledger.
    pub fn latest_version(&self) -> Result<u64, ResultsError> {
        let ledger = self.runs.latest_finalized()?.and_then(|run| run.version);
        let scanned = self.store.latest_version()?;
        ledger.max(scanned).ok_or_else(|| {
            StoreError::ArtifactNotFound(format!(
                "no result slots in {}",
                self.store.root().display()
            ))
            .into()
        })
    }

    /// Run that wrote `version`, if the ledger has one.
    fn run_for(&self, version: u64) -> Result<Option<Run>, ResultsError> {
        Ok(self.runs.by_version(version)?)
    }

    pub fn report(&self, version: u64) -> Result<VersionedReport, ResultsError> {
        let report = self.store.read_report(version)?;
        Ok(VersionedReport {
            version,
            report,
            run: self.run_for(version)?,
        })
    }

    pub fn latest_report(&self) -> Result<VersionedReport, ResultsError> {
        self.report(self.latest_version()?)
    }

    pub fn latest_aggregate(&self) -> Result<(u64, AggregateResult), ResultsError> {
        let version = self.latest_version()?;
        Ok((version, self.store.read_aggregate(version)?))
    }

    /// Merge report fragments into one report and store it in a fresh slot.
    ///
    /// Each item is either a report object or a string holding one. Tiers are
    /// concatenated in item order; blank extracts are dropped.
    pub fn write_merged(&self, items: &[Value]) -> Result<(StoredResult, FinalReport), ResultsError> {
        let report = merge_report_items(items)?;
        let stored = self.store.write_report(&report)?;
        Ok((stored, report))
    }
}

/// Combine report fragments, in order.
pub fn merge_report_items(items: &[Value]) -> Result<FinalReport, ResultsError> {
    if items.is_empty() {
        return Err(ResultsError::EmptyData);
    }

    let mut merged = FinalReport::empty();
    for (index, item) in items.iter().enumerate() {
        let parsed: Result<FinalReport, serde_json::Error> = match item {
            Value::String(raw) => serde_json::from_str(raw),
            other => serde_json::from_value(other.clone()),
        };
        let report = parsed.map_err(|e| ResultsError::InvalidItem {
            index,
            message: e.to_string(),
        })?;
        merged.append(&report);
    }
    Ok(merged.without_blank())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RiskTier;
    use serde_json::json;
    use tempfile::TempDir;

    fn service(dir: &TempDir) -> ResultsService {
        ResultsService::new(&Settings::with_data_dir(dir.path().to_path_buf())).unwrap()
    }

    #[test]
    fn test_merge_items_strings_and_objects() {
        let items = vec![
            json!(r#"{"high": ["a"], "medium": [], "low": ["", "b"]}"#),
            json!({"high": ["c"], "medium": ["d"], "low": null}),
        ];
        let report = merge_report_items(&items).unwrap();
        assert_eq!(report.bucket(RiskTier::High), ["a", "c"]);
        assert_eq!(report.bucket(RiskTier::Medium), ["d"]);
        assert_eq!(report.bucket(RiskTier::Low), ["b"]);
    }

    #[test]
    fn test_merge_items_rejects_garbage() {
        let err = merge_report_items(&[json!({"high": ["a"]}), json!("not json")]).unwrap_err();
        assert!(matches!(err, ResultsError::InvalidItem { index: 1, .. }));
        assert!(matches!(
            merge_report_items(&[]),
            Err(ResultsError::EmptyData)
        ));
    }

    #[test]
    fn test_latest_without_results() {
        let dir = TempDir::new().unwrap();
        let err = service(&dir).latest_report().unwrap_err();
        assert!(matches!(
            err,
            ResultsError::Store(StoreError::ArtifactNotFound(_))
        ));
    }

    #[test]
    fn test_written_slots_become_latest() {
        let dir = TempDir::new().unwrap();
        let svc = service(&dir);

        let (first, _) = svc.write_merged(&[json!({"high": ["a"]})]).unwrap();
        let (second, _) = svc.write_merged(&[json!({"low": ["z"]})]).unwrap();
        assert_eq!(first.version, 1);
        assert_eq!(second.version, 2);

        let latest = svc.latest_report().unwrap();
        assert_eq!(latest.version, 2);
        assert_eq!(latest.report.bucket(RiskTier::Low), ["z"]);
        assert!(latest.run.is_none());

        let older = svc.report(1).unwrap();
        assert_eq!(older.report.bucket(RiskTier::High), ["a"]);
    }

    #[test]
    fn test_unfinished_slot_keeps_finalized_report_latest() {
        let dir = TempDir::new().unwrap();
        let svc = service(&dir);
        svc.write_merged(&[json!({"high": ["finalized"]})]).unwrap();

        let claimed = svc.store().allocate_slot().unwrap();
        assert_eq!(claimed.version, 2);

        let latest = svc.latest_report().unwrap();
        assert_eq!(latest.version, 1);
        assert_eq!(latest.report.bucket(RiskTier::High), ["finalized"]);
    }

    #[test]
    fn test_latest_joins_ledger_run() {
        let dir = TempDir::new().unwrap();
        let svc = service(&dir);

        let report = {
            let mut r = FinalReport::empty();
            r.extend(RiskTier::Medium, ["m".to_string()]);
            r
        };
        let stored = svc
            .store()
            .write_run(&AggregateResult::new(), &report, None)
            .unwrap();
        let run = svc.runs.create("lease.pdf").unwrap();
        svc.runs
            .mark_finalized(&run.id, stored.version, &stored.dir, 1, 0)
            .unwrap();

        let latest = svc.latest_report().unwrap();
        assert_eq!(latest.version, stored.version);
        assert_eq!(latest.run.map(|r| r.id), Some(run.id));

        let (version, aggregate) = svc.latest_aggregate().unwrap();
        assert_eq!(version, stored.version);
        assert!(aggregate.is_empty());
    }
}
