//! JSON error responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::aggregate::AggregateError;
use crate::classify::ClassifyError;
use crate::extract::ExtractionError;
use crate::repository::RepositoryError;
use crate::services::{AnalysisError, ResultsError};
use crate::storage::StoreError;

/// Error body: `{"error": <kind>, "details": <message>}`.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub kind: &'static str,
    pub details: String,
}

impl ApiError {
    pub fn new(status: StatusCode, kind: &'static str, details: impl Into<String>) -> Self {
        Self {
            status,
            kind,
            details: details.into(),
        }
    }

    pub fn bad_request(kind: &'static str, details: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, kind, details)
    }

    pub fn internal(details: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "InternalError", details)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!("{}: {}", self.kind, self.details);
        } else {
            tracing::debug!("{}: {}", self.kind, self.details);
        }
        (
            self.status,
            Json(serde_json::json!({
                "error": self.kind,
                "details": self.details,
            })),
        )
            .into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::ArtifactNotFound(_) => {
                Self::new(StatusCode::NOT_FOUND, "ArtifactNotFound", e.to_string())
            }
            _ => Self::new(StatusCode::INTERNAL_SERVER_ERROR, "StorageError", e.to_string()),
        }
    }
}

impl From<RepositoryError> for ApiError {
    fn from(e: RepositoryError) -> Self {
        match e {
            RepositoryError::NotFound(_) => {
                Self::new(StatusCode::NOT_FOUND, "RunNotFound", e.to_string())
            }
            _ => Self::new(StatusCode::INTERNAL_SERVER_ERROR, "DatabaseError", e.to_string()),
        }
    }
}

impl From<ClassifyError> for ApiError {
    fn from(e: ClassifyError) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, "ClassifierError", e.to_string())
    }
}

impl From<ExtractionError> for ApiError {
    fn from(e: ExtractionError) -> Self {
        match e {
            ExtractionError::UnsupportedFileType(_) => {
                Self::bad_request("UnsupportedFileType", e.to_string())
            }
            ExtractionError::ExtractionFailed(_) => Self::new(
                StatusCode::UNPROCESSABLE_ENTITY,
                "ExtractionFailed",
                e.to_string(),
            ),
            _ => Self::new(StatusCode::INTERNAL_SERVER_ERROR, "ExtractionError", e.to_string()),
        }
    }
}

impl From<AggregateError> for ApiError {
    fn from(e: AggregateError) -> Self {
        match e {
            AggregateError::NoChunksProcessed { .. } => Self::new(
                StatusCode::UNPROCESSABLE_ENTITY,
                "NoChunksProcessed",
                e.to_string(),
            ),
            _ => Self::internal(e.to_string()),
        }
    }
}

impl From<ResultsError> for ApiError {
    fn from(e: ResultsError) -> Self {
        match e {
            ResultsError::Store(e) => e.into(),
            ResultsError::Repository(e) => e.into(),
            ResultsError::InvalidItem { .. } | ResultsError::EmptyData => {
                Self::bad_request("InvalidData", e.to_string())
            }
        }
    }
}

impl From<AnalysisError> for ApiError {
    fn from(e: AnalysisError) -> Self {
        match e {
            AnalysisError::Extraction(e) => e.into(),
            AnalysisError::Classification(e) => e.into(),
            AnalysisError::Aggregate(e) => e.into(),
            AnalysisError::Repository(e) => e.into(),
            AnalysisError::StorageWrite { .. } => Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "StorageWriteFailure",
                e.to_string(),
            ),
            AnalysisError::Task(details) => Self::internal(details),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let not_found: ApiError = StoreError::ArtifactNotFound("x".into()).into();
        assert_eq!(not_found.status, StatusCode::NOT_FOUND);

        let no_chunks: ApiError =
            AnalysisError::Aggregate(AggregateError::NoChunksProcessed { failed: 2 }).into();
        assert_eq!(no_chunks.status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(no_chunks.kind, "NoChunksProcessed");

        let upstream: ApiError = ClassifyError::Empty.into();
        assert_eq!(upstream.status, StatusCode::BAD_GATEWAY);

        let bad: ApiError = ResultsError::EmptyData.into();
        assert_eq!(bad.status, StatusCode::BAD_REQUEST);
    }
}
