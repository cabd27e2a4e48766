//! On-disk storage for uploads and versioned result slots.
//!
//! Results live under `{results_dir}/result{N}/`, one directory per run,
//! holding `all_results.json` (the aggregate) and `final_results.json` (the
//! risk-tier report). Uploads are stored by content hash.

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use thiserror::Error;

use crate::aggregate::{next_version, parse_version, resolve_latest_version, slot_name};
use crate::models::{AggregateResult, FinalReport, QuadrantReport};

/// Slot directory prefix.
pub const SLOT_PREFIX: &str = "result";
/// Aggregate artifact filename.
pub const AGGREGATE_FILE: &str = "all_results.json";
/// Final report artifact filename.
pub const REPORT_FILE: &str = "final_results.json";
/// Quadrant report artifact filename (only written when quadrants exist).
pub const QUADRANT_FILE: &str = "quadrant_results.json";

/// Attempts at claiming a slot before giving up.
const MAX_SLOT_ATTEMPTS: usize = 64;

/// Errors from the result store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Artifact not found: {0}")]
    ArtifactNotFound(String),

    #[error("Could not allocate a result slot: {0}")]
    SlotExhausted(String),
}

/// Where a run's artifacts were written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredResult {
    pub version: u64,
    pub dir: PathBuf,
}

/// Versioned result slots under one directory.
#[derive(Debug, Clone)]
pub struct ResultStore {
    root: PathBuf,
}

impl ResultStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn slot_dir(&self, version: u64) -> PathBuf {
        self.root.join(slot_name(SLOT_PREFIX, version))
    }

    /// Names of every slot directory currently present.
    fn slot_names(&self) -> Result<Vec<String>, StoreError> {
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        Ok(entries
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .filter_map(|e| e.file_name().into_string().ok())
            .filter(|name| parse_version(name, SLOT_PREFIX).is_some())
            .collect())
    }

    /// Claim a fresh slot directory.
    ///
    /// `create_dir` fails if the directory exists, so two writers can never
    /// claim the same slot; the loser retries with the next version.
    pub fn allocate_slot(&self) -> Result<StoredResult, StoreError> {
        std::fs::create_dir_all(&self.root)?;

        for _ in 0..MAX_SLOT_ATTEMPTS {
            let names = self.slot_names()?;
            let version = next_version(names.iter().map(String::as_str), SLOT_PREFIX)
                .ok_or_else(|| {
                    StoreError::SlotExhausted(format!(
                        "highest version in {} is already {}",
                        self.root.display(),
                        u64::MAX
                    ))
                })?;
            let dir = self.slot_dir(version);
            match std::fs::create_dir(&dir) {
                Ok(()) => {
                    tracing::debug!("Allocated result slot {}", dir.display());
                    return Ok(StoredResult { version, dir });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    tracing::debug!("Slot {} taken, retrying", dir.display());
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(StoreError::SlotExhausted(format!(
            "gave up after {} attempts",
            MAX_SLOT_ATTEMPTS
        )))
    }

    /// Persist a finished run into a fresh slot.
    ///
    /// The report is written last; its presence marks the slot complete.
    pub fn write_run(
        &self,
        aggregate: &AggregateResult,
        report: &FinalReport,
        quadrants: Option<&QuadrantReport>,
    ) -> Result<StoredResult, StoreError> {
        let slot = self.allocate_slot()?;
        let written = write_json(&slot.dir.join(AGGREGATE_FILE), aggregate)
            .and_then(|()| match quadrants {
                Some(quadrants) => write_json(&slot.dir.join(QUADRANT_FILE), quadrants),
                None => Ok(()),
            })
            .and_then(|()| write_json(&slot.dir.join(REPORT_FILE), report));
        let slot = settle_slot(slot, written)?;
        tracing::info!("Stored results in {}", slot.dir.display());
        Ok(slot)
    }

    /// Persist a report on its own into a fresh slot.
    pub fn write_report(&self, report: &FinalReport) -> Result<StoredResult, StoreError> {
        let slot = self.allocate_slot()?;
        let written = write_json(&slot.dir.join(REPORT_FILE), report);
        let slot = settle_slot(slot, written)?;
        tracing::info!("Stored report in {}", slot.dir.display());
        Ok(slot)
    }

    /// Highest version among complete slots.
    ///
    /// Slots still being written, or left behind without a report, are
    /// skipped so they never hide earlier results.
    pub fn latest_version(&self) -> Result<Option<u64>, StoreError> {
        let names: Vec<String> = self
            .slot_names()?
            .into_iter()
            .filter(|name| self.root.join(name).join(REPORT_FILE).is_file())
            .collect();
        Ok(resolve_latest_version(names.iter().map(String::as_str), SLOT_PREFIX)
            .and_then(|name| parse_version(name, SLOT_PREFIX)))
    }

    fn latest_slot(&self) -> Result<u64, StoreError> {
        self.latest_version()?.ok_or_else(|| {
            StoreError::ArtifactNotFound(format!("no result slots in {}", self.root.display()))
        })
    }

    pub fn read_report(&self, version: u64) -> Result<FinalReport, StoreError> {
        let report: FinalReport = read_json(&self.slot_dir(version).join(REPORT_FILE))?;
        Ok(report.without_blank())
    }

    pub fn read_aggregate(&self, version: u64) -> Result<AggregateResult, StoreError> {
        let aggregate: AggregateResult = read_json(&self.slot_dir(version).join(AGGREGATE_FILE))?;
        Ok(aggregate.without_blank())
    }

    pub fn read_quadrants(&self, version: u64) -> Result<QuadrantReport, StoreError> {
        let report: QuadrantReport = read_json(&self.slot_dir(version).join(QUADRANT_FILE))?;
        Ok(report.without_blank())
    }

    /// Report from the highest slot, with its version.
    pub fn latest_report(&self) -> Result<(u64, FinalReport), StoreError> {
        let version = self.latest_slot()?;
        Ok((version, self.read_report(version)?))
    }

    /// Aggregate from the highest slot, with its version.
    pub fn latest_aggregate(&self) -> Result<(u64, AggregateResult), StoreError> {
        let version = self.latest_slot()?;
        Ok((version, self.read_aggregate(version)?))
    }
}

/// Keep a slot whose artifacts were written, remove it otherwise.
fn settle_slot(
    slot: StoredResult,
    written: Result<(), StoreError>,
) -> Result<StoredResult, StoreError> {
    if let Err(e) = written {
        if let Err(cleanup) = std::fs::remove_dir_all(&slot.dir) {
            tracing::warn!(
                "Could not remove incomplete slot {}: {}",
                slot.dir.display(),
                cleanup
            );
        }
        return Err(e);
    }
    Ok(slot)
}

/// Write pretty JSON via a temp file in the same directory.
fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)?;
    serde_json::to_writer_pretty(&mut tmp, value)?;
    tmp.write_all(b"\n")?;
    tmp.persist(path).map_err(|e| StoreError::Io(e.error))?;
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, StoreError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(StoreError::ArtifactNotFound(path.display().to_string()))
        }
        Err(e) => return Err(e.into()),
    };
    Ok(serde_json::from_str(&contents)?)
}

/// Hex SHA-256 of uploaded content; doubles as the upload id.
pub fn compute_hash(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    hex::encode(hasher.finalize())
}

/// Storage path for an upload.
///
/// Uses a two-level directory structure based on hash prefix:
/// `{uploads_dir}/{hash[0..2]}/{hash}.pdf`
pub fn upload_path(uploads_dir: &Path, content_hash: &str) -> PathBuf {
    let prefix = content_hash.get(..2).unwrap_or(content_hash);
    uploads_dir
        .join(prefix)
        .join(format!("{}.pdf", content_hash))
}

/// Returns true when `id` looks like an upload id.
pub fn is_upload_id(id: &str) -> bool {
    id.len() == 64 && id.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Save uploaded content, returning its id and path.
///
/// Identical content maps to the same file, so re-uploads are free.
pub fn save_upload(uploads_dir: &Path, content: &[u8]) -> Result<(String, PathBuf), StoreError> {
    let hash = compute_hash(content);
    let path = upload_path(uploads_dir, &hash);
    if !path.exists() {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut tmp = NamedTempFile::new_in(path.parent().unwrap_or(uploads_dir))?;
        tmp.write_all(content)?;
        tmp.persist(&path).map_err(|e| StoreError::Io(e.error))?;
    }
    Ok((hash, path))
}

/// Locate a previous upload by id.
pub fn find_upload(uploads_dir: &Path, id: &str) -> Result<PathBuf, StoreError> {
    if !is_upload_id(id) {
        return Err(StoreError::ArtifactNotFound(format!("upload {}", id)));
    }
    let path = upload_path(uploads_dir, &id.to_lowercase());
    if path.is_file() {
        Ok(path)
    } else {
        Err(StoreError::ArtifactNotFound(format!("upload {}", id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RiskTier;
    use tempfile::tempdir;

    fn report(high: &[&str]) -> FinalReport {
        let mut r = FinalReport::empty();
        r.extend(RiskTier::High, high.iter().map(|s| s.to_string()));
        r
    }

    #[test]
    fn test_allocate_starts_at_one_and_increments() {
        let dir = tempdir().unwrap();
        let store = ResultStore::new(dir.path().join("results"));

        assert_eq!(store.allocate_slot().unwrap().version, 1);
        assert_eq!(store.allocate_slot().unwrap().version, 2);
        assert!(store.slot_dir(2).is_dir());
    }

    #[test]
    fn test_allocate_never_reuses_existing_slot() {
        let dir = tempdir().unwrap();
        let store = ResultStore::new(dir.path());
        std::fs::create_dir(dir.path().join("result")).unwrap();
        std::fs::create_dir(dir.path().join("result7")).unwrap();
        std::fs::create_dir(dir.path().join("result_backup")).unwrap();

        let slot = store.allocate_slot().unwrap();
        assert_eq!(slot.version, 8);
        assert_eq!(slot.dir, dir.path().join("result8"));
    }

    #[test]
    fn test_allocate_refuses_past_max_version() {
        let dir = tempdir().unwrap();
        let store = ResultStore::new(dir.path());
        std::fs::create_dir(dir.path().join(format!("result{}", u64::MAX))).unwrap();

        assert!(matches!(store.allocate_slot(), Err(StoreError::SlotExhausted(_))));
        assert!(!dir.path().join("result").exists());
    }

    #[test]
    fn test_concurrent_allocation_is_unique() {
        let dir = tempdir().unwrap();
        let root = dir.path().to_path_buf();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = ResultStore::new(root.clone());
                std::thread::spawn(move || store.allocate_slot().unwrap().version)
            })
            .collect();

        let mut versions: Vec<u64> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        versions.sort();
        versions.dedup();
        assert_eq!(versions.len(), 8);
    }

    #[test]
    fn test_write_and_read_latest() {
        let dir = tempdir().unwrap();
        let store = ResultStore::new(dir.path());
        let aggregate = AggregateResult::seeded(["termination"]);

        store.write_run(&aggregate, &report(&["old"]), None).unwrap();
        let stored = store.write_run(&aggregate, &report(&["new", "  "]), None).unwrap();

        let (version, latest) = store.latest_report().unwrap();
        assert_eq!(version, stored.version);
        assert_eq!(latest.bucket(RiskTier::High), ["new"]);
        assert!(stored.dir.join(AGGREGATE_FILE).is_file());

        let (_, agg) = store.latest_aggregate().unwrap();
        assert!(agg.contains_key("termination"));
    }

    #[test]
    fn test_latest_prefers_highest_version() {
        let dir = tempdir().unwrap();
        let store = ResultStore::new(dir.path());
        for (name, extract) in [("result", "v0"), ("result2", "v2"), ("result10", "v10")] {
            let slot = dir.path().join(name);
            std::fs::create_dir(&slot).unwrap();
            write_json(&slot.join(REPORT_FILE), &report(&[extract])).unwrap();
        }

        let (version, latest) = store.latest_report().unwrap();
        assert_eq!(version, 10);
        assert_eq!(latest.bucket(RiskTier::High), ["v10"]);
    }

    #[test]
    fn test_incomplete_slot_does_not_become_latest() {
        let dir = tempdir().unwrap();
        let store = ResultStore::new(dir.path());
        let aggregate = AggregateResult::seeded(["termination"]);
        store.write_run(&aggregate, &report(&["kept"]), None).unwrap();

        let pending = store.allocate_slot().unwrap();
        assert_eq!(pending.version, 2);

        assert_eq!(store.latest_version().unwrap(), Some(1));
        let (version, latest) = store.latest_report().unwrap();
        assert_eq!(version, 1);
        assert_eq!(latest.bucket(RiskTier::High), ["kept"]);

        // The claimed slot is still skipped by the next writer.
        let next = store.write_run(&aggregate, &report(&["next"]), None).unwrap();
        assert_eq!(next.version, 3);
        assert_eq!(store.latest_version().unwrap(), Some(3));
    }

    #[test]
    fn test_failed_write_removes_slot() {
        let dir = tempdir().unwrap();
        let store = ResultStore::new(dir.path());
        let slot = store.allocate_slot().unwrap();
        let failed = std::io::Error::other("disk full");

        let err = settle_slot(slot.clone(), Err(failed.into())).unwrap_err();
        assert!(matches!(err, StoreError::Io(_)));
        assert!(!slot.dir.exists());
        assert_eq!(store.latest_version().unwrap(), None);
    }

    #[test]
    fn test_artifact_not_found() {
        let dir = tempdir().unwrap();
        let store = ResultStore::new(dir.path().join("missing"));
        assert!(matches!(store.latest_report(), Err(StoreError::ArtifactNotFound(_))));

        let store = ResultStore::new(dir.path());
        store.write_report(&report(&["a"])).unwrap();
        assert!(matches!(store.latest_aggregate(), Err(StoreError::ArtifactNotFound(_))));
        assert!(matches!(store.read_report(42), Err(StoreError::ArtifactNotFound(_))));
    }

    #[test]
    fn test_upload_roundtrip() {
        let dir = tempdir().unwrap();
        let (id, path) = save_upload(dir.path(), b"%PDF-1.4 test").unwrap();
        assert!(is_upload_id(&id));
        assert_eq!(path, upload_path(dir.path(), &id));
        assert_eq!(find_upload(dir.path(), &id).unwrap(), path);

        let (again, _) = save_upload(dir.path(), b"%PDF-1.4 test").unwrap();
        assert_eq!(id, again);

        assert!(find_upload(dir.path(), "../etc/passwd").is_err());
        assert!(find_upload(dir.path(), &"0".repeat(64)).is_err());
    }

    #[test]
    fn test_upload_path() {
        let path = upload_path(Path::new("/uploads"), "abcdef");
        assert_eq!(path, PathBuf::from("/uploads/ab/abcdef.pdf"));
    }
}
