//! Router configuration for the web server.

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;

use super::handlers;
use super::AppState;

/// Multipart framing on top of the file itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Create the main router with all routes.
pub fn create_router(state: AppState) -> Router {
    let upload_limit = state.max_upload_bytes.saturating_add(MULTIPART_OVERHEAD);

    Router::new()
        .route("/api/health", get(handlers::health))
        .route("/api/classification", get(handlers::classification))
        // Documents
        .route(
            "/api/upload",
            post(handlers::upload).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/api/split", post(handlers::split))
        .route("/api/analyze", post(handlers::analyze))
        // Stored results
        .route("/api/results", post(handlers::write_results))
        .route("/api/results/latest", get(handlers::latest_report))
        .route(
            "/api/results/latest/aggregate",
            get(handlers::latest_aggregate),
        )
        .route("/api/results/latest/export", get(handlers::export_latest))
        .route("/api/results/:version", get(handlers::report_by_version))
        // Run ledger
        .route("/api/runs", get(handlers::list_runs))
        .route("/api/runs/:run_id", get(handlers::get_run))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
