//! Contract analysis pipeline.
//!
//! extract -> classify -> categorize chunks concurrently -> aggregate ->
//! finalize -> store. Categorizer calls run concurrently; their completions
//! are consumed in chunk order by this task, which is the aggregator's only
//! writer.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::aggregate::{parse_model_output, AggregateError, Aggregator, MergeReport};
use crate::classify::{source_from_config, ClassificationSource, ClassifyError};
use crate::config::{AnalysisConfig, Config, Settings};
use crate::extract::{write_chunks, Chunk, ExtractionError, TextExtractor};
use crate::llm::{Categorizer, LlmClient, LlmError};
use crate::models::{AggregateResult, ClauseKey, FinalReport, QuadrantReport, Run};
use crate::repository::{RepositoryError, RunRepository};
use crate::storage::{ResultStore, StoreError};

/// Events emitted during analysis.
#[derive(Debug, Clone)]
pub enum AnalysisEvent {
    /// Chunks extracted and classification loaded
    Started {
        run_id: String,
        total_chunks: usize,
        clause_keys: usize,
    },
    /// Chunk categorized and merged
    ChunkCompleted {
        index: usize,
        added: usize,
        unknown_keys: Vec<ClauseKey>,
    },
    /// Chunk contributed nothing
    ChunkFailed { index: usize, error: String },
    /// Report stored
    Finalized {
        run_id: String,
        version: u64,
        total_extracts: usize,
    },
}

/// Errors that end a run.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Classification(#[from] ClassifyError),

    #[error(transparent)]
    Aggregate(#[from] AggregateError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    /// The run finished but its artifacts could not be written. The
    /// in-memory results are kept so the caller can retry the write.
    #[error("Failed to store results: {source}")]
    StorageWrite {
        source: StoreError,
        aggregate: Box<AggregateResult>,
        report: Box<FinalReport>,
    },

    #[error("Background task failed: {0}")]
    Task(String),
}

/// Result of a finished run.
#[derive(Debug, Clone)]
pub struct AnalysisOutcome {
    pub run: Run,
    pub version: u64,
    pub artifact_dir: PathBuf,
    pub report: FinalReport,
    pub quadrants: Option<QuadrantReport>,
    pub aggregate: AggregateResult,
    pub merged: MergeReport,
    pub succeeded: usize,
    pub failed: usize,
}

/// Run a blocking closure on the blocking pool.
async fn blocking<T, F>(f: F) -> Result<T, AnalysisError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, AnalysisError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AnalysisError::Task(e.to_string()))?
}

/// Service for analyzing contracts.
pub struct AnalysisService {
    settings: Settings,
    analysis: AnalysisConfig,
    extractor: TextExtractor,
    categorizer: Arc<dyn Categorizer>,
    classifier: Arc<dyn ClassificationSource>,
    store: ResultStore,
    runs: RunRepository,
}

impl AnalysisService {
    /// Build the service from loaded configuration.
    pub fn from_config(settings: &Settings, config: &Config) -> Result<Self, AnalysisError> {
        let categorizer: Arc<dyn Categorizer> = Arc::new(LlmClient::new(config.llm.clone()));
        let classifier = source_from_config(&config.classifier, &settings.data_dir);
        Self::from_parts(settings, config.analysis.clone(), categorizer, classifier)
    }

    pub fn from_parts(
        settings: &Settings,
        analysis: AnalysisConfig,
        categorizer: Arc<dyn Categorizer>,
        classifier: Arc<dyn ClassificationSource>,
    ) -> Result<Self, AnalysisError> {
        let runs = RunRepository::new(&settings.database_path())?;
        Ok(Self {
            settings: settings.clone(),
            extractor: TextExtractor::new().with_max_chunk_chars(analysis.max_chunk_chars),
            analysis,
            categorizer,
            classifier,
            store: ResultStore::new(settings.results_dir()),
            runs,
        })
    }

    /// Override the concurrency limit.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.analysis.concurrency = concurrency;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn classifier(&self) -> &Arc<dyn ClassificationSource> {
        &self.classifier
    }

    pub fn store(&self) -> &ResultStore {
        &self.store
    }

    pub fn runs(&self) -> &RunRepository {
        &self.runs
    }

    /// Extract a document into chunk files under `out_dir`.
    pub async fn split(&self, path: &Path, out_dir: &Path) -> Result<Vec<Chunk>, AnalysisError> {
        let extractor = self.extractor.clone();
        let path = path.to_path_buf();
        let out_dir = out_dir.to_path_buf();
        blocking(move || {
            let chunks = extractor.extract(&path)?;
            write_chunks(&out_dir, &chunks)?;
            Ok(chunks)
        })
        .await
    }

    /// Record a failure on the run, logging if the ledger itself fails.
    async fn fail_run(&self, run_id: &str, error: &str, succeeded: usize, failed: usize) {
        let runs = self.runs.clone();
        let (run_id, error) = (run_id.to_string(), error.to_string());
        let result = blocking(move || {
            runs.mark_failed(&run_id, &error, succeeded, failed)
                .map_err(AnalysisError::from)
        })
        .await;
        if let Err(e) = result {
            tracing::warn!("Failed to record run failure: {}", e);
        }
    }

    /// Pass `result` through, marking the run failed when it is an error.
    async fn or_fail<T>(
        &self,
        run_id: &str,
        result: Result<T, AnalysisError>,
        succeeded: usize,
        failed: usize,
    ) -> Result<T, AnalysisError> {
        let error = result.as_ref().err().map(ToString::to_string);
        if let Some(error) = error {
            self.fail_run(run_id, &error, succeeded, failed).await;
        }
        result
    }

    /// Analyze one contract end to end.
    pub async fn analyze(
        &self,
        pdf_path: &Path,
        event_tx: mpsc::Sender<AnalysisEvent>,
    ) -> Result<AnalysisOutcome, AnalysisError> {
        let source_file = pdf_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| pdf_path.display().to_string());

        let runs = self.runs.clone();
        let run = blocking(move || runs.create(&source_file).map_err(AnalysisError::from)).await?;
        tracing::info!("Run {} started for {}", run.id, pdf_path.display());

        let split = self.split(pdf_path, &self.settings.run_dir(&run.id)).await;
        let chunks = self.or_fail(&run.id, split, 0, 0).await?;

        let runs = self.runs.clone();
        let (run_id, chunk_count) = (run.id.clone(), chunks.len());
        let counted = blocking(move || {
            runs.set_chunk_count(&run_id, chunk_count)
                .map_err(AnalysisError::from)
        })
        .await;
        self.or_fail(&run.id, counted, 0, 0).await?;

        let classification = match self.classifier.load().await {
            Ok(c) => c,
            Err(e) => {
                tracing::error!("Classification from {} failed: {}", self.classifier.name(), e);
                self.fail_run(&run.id, &e.to_string(), 0, 0).await;
                return Err(e.into());
            }
        };

        let mut aggregator = Aggregator::new(self.analysis.unknown_keys);
        let begun = aggregator.begin(classification.keys()).map_err(AnalysisError::from);
        self.or_fail(&run.id, begun, 0, 0).await?;

        let _ = event_tx
            .send(AnalysisEvent::Started {
                run_id: run.id.clone(),
                total_chunks: chunks.len(),
                clause_keys: classification.len(),
            })
            .await;

        let keys = classification.keys();
        let categorizer = &self.categorizer;
        let timeout_secs = self.analysis.request_timeout_secs;
        let deadline = Duration::from_secs(timeout_secs);

        let mut completions = stream::iter(chunks)
            .map(|chunk| async move {
                let result =
                    match tokio::time::timeout(deadline, categorizer.categorize(&chunk.text, keys))
                        .await
                    {
                        Ok(result) => result,
                        Err(_) => Err(LlmError::Timeout(timeout_secs)),
                    };
                (chunk.index, result)
            })
            .buffered(self.analysis.concurrency.max(1));

        while let Some((index, result)) = completions.next().await {
            let partial = result
                .map_err(|e| e.to_string())
                .and_then(|raw| parse_model_output(&raw).map_err(|e| e.to_string()));

            match partial {
                Ok(partial) => {
                    let recorded = aggregator
                        .record_success(index, &partial)
                        .map_err(AnalysisError::from);
                    let (ok, bad) = (aggregator.succeeded(), aggregator.failed());
                    let merged = self.or_fail(&run.id, recorded, ok, bad).await?;
                    let _ = event_tx
                        .send(AnalysisEvent::ChunkCompleted {
                            index,
                            added: merged.added,
                            unknown_keys: merged.unknown_keys,
                        })
                        .await;
                }
                Err(error) => {
                    let recorded = aggregator
                        .record_failure(index, &error)
                        .map_err(AnalysisError::from);
                    let (ok, bad) = (aggregator.succeeded(), aggregator.failed());
                    self.or_fail(&run.id, recorded, ok, bad).await?;
                    let _ = event_tx
                        .send(AnalysisEvent::ChunkFailed { index, error })
                        .await;
                }
            }
        }
        drop(completions);

        let (succeeded, failed) = (aggregator.succeeded(), aggregator.failed());
        let report = match aggregator.finalize(&classification) {
            Ok(report) => report,
            Err(e) => {
                self.fail_run(&run.id, &e.to_string(), succeeded, failed).await;
                return Err(e.into());
            }
        };
        let quadrants = aggregator.quadrant_report(&classification);
        let merged = aggregator.merged().clone();
        let aggregate = aggregator.into_aggregate();

        let store = self.store.clone();
        let (agg, rep, quad) = (aggregate.clone(), report.clone(), quadrants.clone());
        let stored = tokio::task::spawn_blocking(move || store.write_run(&agg, &rep, quad.as_ref()))
            .await
            .map_err(|e| AnalysisError::Task(e.to_string()))?;

        let stored = match stored {
            Ok(stored) => stored,
            Err(source) => {
                self.fail_run(&run.id, &source.to_string(), succeeded, failed).await;
                return Err(AnalysisError::StorageWrite {
                    source,
                    aggregate: Box::new(aggregate),
                    report: Box::new(report),
                });
            }
        };

        let runs = self.runs.clone();
        let (run_id, version, dir) = (run.id.clone(), stored.version, stored.dir.clone());
        let finalized = blocking(move || {
            runs.mark_finalized(&run_id, version, &dir, succeeded, failed)?;
            runs.get(&run_id)?
                .ok_or_else(|| AnalysisError::Repository(RepositoryError::NotFound(run_id)))
        })
        .await;
        let run = self.or_fail(&run.id, finalized, succeeded, failed).await?;

        let _ = event_tx
            .send(AnalysisEvent::Finalized {
                run_id: run.id.clone(),
                version: stored.version,
                total_extracts: report.total(),
            })
            .await;

        tracing::info!(
            "Run {} finalized as version {} ({} extracts, {} chunks failed)",
            run.id,
            stored.version,
            report.total(),
            failed
        );

        Ok(AnalysisOutcome {
            run,
            version: stored.version,
            artifact_dir: stored.dir,
            report,
            quadrants,
            aggregate,
            merged,
            succeeded,
            failed,
        })
    }
}
