//! Run ledger: one row per analysis run.

use std::path::{Path, PathBuf};

use chrono::Utc;
use rusqlite::{params, Connection, Row};

use super::{parse_datetime, parse_datetime_opt, RepositoryError, Result};
use crate::models::{Run, RunStatus};

/// SQLite-backed run repository.
#[derive(Debug, Clone)]
pub struct RunRepository {
    db_path: PathBuf,
}

impl RunRepository {
    /// Open the repository, creating the schema if needed.
    pub fn new(db_path: &Path) -> Result<Self> {
        let repo = Self {
            db_path: db_path.to_path_buf(),
        };
        repo.init_schema()?;
        Ok(repo)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn connect(&self) -> Result<Connection> {
        super::connect(&self.db_path)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.connect()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS runs (
                id TEXT PRIMARY KEY,
                status TEXT NOT NULL,
                source_file TEXT NOT NULL,
                version INTEGER,
                chunk_count INTEGER NOT NULL DEFAULT 0,
                chunks_succeeded INTEGER NOT NULL DEFAULT 0,
                chunks_failed INTEGER NOT NULL DEFAULT 0,
                artifact_dir TEXT,
                error TEXT,
                created_at TEXT NOT NULL,
                finished_at TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_runs_created_at ON runs(created_at);
            CREATE INDEX IF NOT EXISTS idx_runs_status ON runs(status);
        "#,
        )?;
        Ok(())
    }

    fn row_to_run(row: &Row<'_>) -> rusqlite::Result<Run> {
        Ok(Run {
            id: row.get("id")?,
            status: RunStatus::from_str(&row.get::<_, String>("status")?)
                .unwrap_or(RunStatus::Failed),
            source_file: row.get("source_file")?,
            version: row.get::<_, Option<i64>>("version")?.map(|v| v as u64),
            chunk_count: row.get::<_, i64>("chunk_count")? as usize,
            chunks_succeeded: row.get::<_, i64>("chunks_succeeded")? as usize,
            chunks_failed: row.get::<_, i64>("chunks_failed")? as usize,
            artifact_dir: row.get("artifact_dir")?,
            error: row.get("error")?,
            created_at: parse_datetime(&row.get::<_, String>("created_at")?),
            finished_at: parse_datetime_opt(row.get("finished_at")?),
        })
    }

    /// Record a new run in the collecting state.
    pub fn create(&self, source_file: &str) -> Result<Run> {
        let run = Run::new(source_file.to_string(), 0);
        let conn = self.connect()?;
        conn.execute(
            r#"
            INSERT INTO runs (id, status, source_file, chunk_count, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                run.id,
                run.status.as_str(),
                run.source_file,
                run.chunk_count as i64,
                run.created_at.to_rfc3339(),
            ],
        )?;
        Ok(run)
    }

    /// Set the number of chunks a run will process.
    pub fn set_chunk_count(&self, id: &str, chunk_count: usize) -> Result<()> {
        let conn = self.connect()?;
        let rows = conn.execute(
            "UPDATE runs SET chunk_count = ? WHERE id = ?",
            params![chunk_count as i64, id],
        )?;
        if rows == 0 {
            return Err(RepositoryError::NotFound(id.to_string()));
        }
        Ok(())
    }

    pub fn mark_finalized(
        &self,
        id: &str,
        version: u64,
        artifact_dir: &Path,
        succeeded: usize,
        failed: usize,
    ) -> Result<()> {
        let conn = self.connect()?;
        let rows = conn.execute(
            r#"
            UPDATE runs SET
                status = ?1,
                version = ?2,
                artifact_dir = ?3,
                chunks_succeeded = ?4,
                chunks_failed = ?5,
                finished_at = ?6
            WHERE id = ?7
            "#,
            params![
                RunStatus::Finalized.as_str(),
                version as i64,
                artifact_dir.to_string_lossy(),
                succeeded as i64,
                failed as i64,
                Utc::now().to_rfc3339(),
                id,
            ],
        )?;
        if rows == 0 {
            return Err(RepositoryError::NotFound(id.to_string()));
        }
        Ok(())
    }

    pub fn mark_failed(&self, id: &str, error: &str, succeeded: usize, failed: usize) -> Result<()> {
        let conn = self.connect()?;
        let rows = conn.execute(
            r#"
            UPDATE runs SET
                status = ?1,
                error = ?2,
                chunks_succeeded = ?3,
                chunks_failed = ?4,
                finished_at = ?5
            WHERE id = ?6
            "#,
            params![
                RunStatus::Failed.as_str(),
                error,
                succeeded as i64,
                failed as i64,
                Utc::now().to_rfc3339(),
                id,
            ],
        )?;
        if rows == 0 {
            return Err(RepositoryError::NotFound(id.to_string()));
        }
        Ok(())
    }

    /// Get a run by ID.
    pub fn get(&self, id: &str) -> Result<Option<Run>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare("SELECT * FROM runs WHERE id = ?")?;
        super::to_option(stmt.query_row(params![id], Self::row_to_run))
    }

    /// Most recent runs first.
    pub fn recent(&self, limit: usize) -> Result<Vec<Run>> {
        let conn = self.connect()?;
        let mut stmt =
            conn.prepare("SELECT * FROM runs ORDER BY created_at DESC, rowid DESC LIMIT ?")?;
        let runs = stmt
            .query_map(params![limit as i64], Self::row_to_run)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(runs)
    }

    /// The finalized run that wrote slot `version`.
    pub fn by_version(&self, version: u64) -> Result<Option<Run>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT * FROM runs WHERE status = ? AND version = ? ORDER BY finished_at DESC LIMIT 1",
        )?;
        super::to_option(stmt.query_row(
            params![RunStatus::Finalized.as_str(), version as i64],
            Self::row_to_run,
        ))
    }

    /// The finalized run with the highest slot version.
    pub fn latest_finalized(&self) -> Result<Option<Run>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT * FROM runs
            WHERE status = ? AND version IS NOT NULL
            ORDER BY version DESC, finished_at DESC
            LIMIT 1
            "#,
        )?;
        super::to_option(stmt.query_row(params![RunStatus::Finalized.as_str()], Self::row_to_run))
    }
}
