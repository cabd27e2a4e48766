//! Stored report endpoints.

use axum::{
    extract::{Path, State},
    http::header,
    response::IntoResponse,
    Json,
};
use serde_json::Value;

use super::super::AppState;
use super::{blocking, ApiError};

/// Latest final report, blank extracts removed.
pub async fn latest_report(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let results = state.results.clone();
    let latest = blocking(move || results.latest_report()).await?;
    Ok(Json(latest))
}

pub async fn latest_aggregate(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let results = state.results.clone();
    let (version, aggregate) = blocking(move || results.latest_aggregate()).await?;
    Ok(Json(serde_json::json!({
        "version": version,
        "aggregate": aggregate,
    })))
}

pub async fn report_by_version(
    State(state): State<AppState>,
    Path(version): Path<u64>,
) -> Result<impl IntoResponse, ApiError> {
    let results = state.results.clone();
    let report = blocking(move || results.report(version)).await?;
    Ok(Json(report))
}

/// Latest report as a Markdown download.
pub async fn export_latest(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let results = state.results.clone();
    let latest = blocking(move || results.latest_report()).await?;

    let title = match &latest.run {
        Some(run) => format!("Contract Risk Report: {}", run.source_file),
        None => format!("Contract Risk Report (version {})", latest.version),
    };
    let disposition = format!(
        "attachment; filename=\"clauseguard-report-v{}.md\"",
        latest.version
    );

    Ok((
        [
            (header::CONTENT_TYPE, "text/markdown; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        latest.report.to_markdown(&title),
    ))
}

/// Store report fragments as a new version.
///
/// Body: `{"data": [report | "<report json>", ...]}`.
pub async fn write_results(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<impl IntoResponse, ApiError> {
    let items = match body.get("data") {
        Some(Value::Array(items)) => items.clone(),
        _ => {
            return Err(ApiError::bad_request(
                "InvalidData",
                "Expected {\"data\": [...]}",
            ))
        }
    };

    let results = state.results.clone();
    let (stored, report) = blocking(move || results.write_merged(&items)).await?;
    tracing::info!("Stored merged report as version {}", stored.version);

    Ok(Json(serde_json::json!({
        "version": stored.version,
        "path": stored.dir.display().to_string(),
        "report": report,
    })))
}
