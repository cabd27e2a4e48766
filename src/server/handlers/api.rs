//! Service-level endpoints.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};

use super::super::AppState;
use super::ApiError;

/// Health check endpoint for container orchestration.
pub async fn health() -> impl IntoResponse {
    StatusCode::OK
}

/// Known clause keys partitioned into risk tiers.
pub async fn classification(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let classification = state.classifier.load().await?;
    Ok(Json(classification.to_summary()))
}
