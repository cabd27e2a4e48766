//! Run the analysis pipeline on an upload.

use axum::{extract::State, response::IntoResponse, Json};
use tokio::sync::mpsc;

use super::super::AppState;
use super::upload::UploadRef;
use super::{blocking, ApiError};
use crate::services::AnalysisEvent;
use crate::storage::find_upload;

pub async fn analyze(
    State(state): State<AppState>,
    Json(body): Json<UploadRef>,
) -> Result<impl IntoResponse, ApiError> {
    let uploads_dir = state.settings.uploads_dir();
    let id = body.upload_id.clone();
    let path = blocking(move || find_upload(&uploads_dir, &id)).await?;

    // Nobody watches progress over HTTP; keep the channel drained for the logs.
    let (event_tx, mut event_rx) = mpsc::channel::<AnalysisEvent>(64);
    let upload_id = body.upload_id.clone();
    tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            match event {
                AnalysisEvent::ChunkFailed { index, error } => {
                    tracing::debug!("{}: chunk {} failed: {}", upload_id, index, error)
                }
                other => tracing::debug!("{}: {:?}", upload_id, other),
            }
        }
    });

    let outcome = state.analysis.analyze(&path, event_tx).await?;

    Ok(Json(serde_json::json!({
        "run": outcome.run,
        "version": outcome.version,
        "report": outcome.report,
        "quadrants": outcome.quadrants,
        "chunks_succeeded": outcome.succeeded,
        "chunks_failed": outcome.failed,
        "merge": outcome.merged,
    })))
}
