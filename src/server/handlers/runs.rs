//! Run ledger endpoints.

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;

use super::super::AppState;
use super::{blocking, ApiError};
use crate::repository::RepositoryError;

#[derive(Debug, Deserialize)]
pub struct RunsParams {
    pub limit: Option<usize>,
}

/// Most recent runs first.
pub async fn list_runs(
    State(state): State<AppState>,
    Query(params): Query<RunsParams>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = params.limit.unwrap_or(20).min(100);
    let runs = state.analysis.runs().clone();
    let list = blocking(move || runs.recent(limit)).await?;
    Ok(Json(list))
}

pub async fn get_run(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let runs = state.analysis.runs().clone();
    let run = blocking(move || {
        runs.get(&run_id)?
            .ok_or(RepositoryError::NotFound(run_id))
    })
    .await?;
    Ok(Json(run))
}
