//! HTTP request handlers for the web server.

mod analyze;
mod api;
mod error;
mod results;
mod runs;
mod upload;

pub use analyze::analyze;
pub use api::{classification, health};
pub use error::ApiError;
pub use results::{
    export_latest, latest_aggregate, latest_report, report_by_version, write_results,
};
pub use runs::{get_run, list_runs};
pub use upload::{split, upload};

/// Run synchronous storage or ledger work off the async runtime.
async fn blocking<T, E, F>(f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    E: Into<ApiError> + Send + 'static,
    F: FnOnce() -> Result<T, E> + Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(result) => result.map_err(Into::into),
        Err(e) => Err(ApiError::internal(e.to_string())),
    }
}
