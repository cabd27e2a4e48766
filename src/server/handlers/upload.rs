//! Contract upload and splitting.

use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};

use super::super::AppState;
use super::{blocking, ApiError};
use crate::storage::{find_upload, save_upload};

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub id: String,
    pub file_name: String,
    pub path: String,
    pub size: usize,
}

/// Body for endpoints that act on an earlier upload.
#[derive(Debug, Deserialize)]
pub struct UploadRef {
    pub upload_id: String,
}

fn has_pdf_extension(file_name: &str) -> bool {
    std::path::Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"))
}

fn is_pdf_content(bytes: &[u8]) -> bool {
    infer::get(bytes).is_some_and(|kind| kind.mime_type() == "application/pdf")
}

/// Accept a multipart `file` field holding a PDF.
pub async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => return Err(ApiError::new(e.status(), "InvalidUpload", e.body_text())),
        };
        if field.name() != Some("file") {
            continue;
        }

        let file_name = field.file_name().unwrap_or("upload.pdf").to_string();
        if !has_pdf_extension(&file_name) {
            return Err(ApiError::bad_request(
                "InvalidFile",
                format!("{} is not a PDF", file_name),
            ));
        }

        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::new(e.status(), "InvalidUpload", e.body_text()))?;

        if bytes.len() > state.max_upload_bytes {
            return Err(ApiError::new(
                StatusCode::PAYLOAD_TOO_LARGE,
                "FileTooLarge",
                format!(
                    "{} is {} bytes, limit is {}",
                    file_name,
                    bytes.len(),
                    state.max_upload_bytes
                ),
            ));
        }
        if !is_pdf_content(&bytes) {
            return Err(ApiError::bad_request(
                "InvalidFile",
                format!("{} does not contain PDF data", file_name),
            ));
        }

        let uploads_dir = state.settings.uploads_dir();
        let size = bytes.len();
        let (id, path) = blocking(move || save_upload(&uploads_dir, &bytes)).await?;
        tracing::info!("Stored upload {} as {}", file_name, id);

        return Ok(Json(UploadResponse {
            id,
            file_name,
            path: path.display().to_string(),
            size,
        }));
    }

    Err(ApiError::bad_request("InvalidUpload", "Missing file field"))
}

/// Split an uploaded contract into chunk files.
pub async fn split(
    State(state): State<AppState>,
    Json(body): Json<UploadRef>,
) -> Result<impl IntoResponse, ApiError> {
    let uploads_dir = state.settings.uploads_dir();
    let id = body.upload_id.clone();
    let path = blocking(move || find_upload(&uploads_dir, &id)).await?;

    let out_dir = state.settings.uploads_dir().join("pages").join(&body.upload_id);
    let chunks = state.analysis.split(&path, &out_dir).await?;

    let listing: Vec<_> = chunks
        .iter()
        .map(|c| {
            serde_json::json!({
                "index": c.index,
                "page": c.page,
                "part": c.part,
                "file_name": c.file_name(),
                "chars": c.text.chars().count(),
            })
        })
        .collect();

    Ok(Json(serde_json::json!({
        "upload_id": body.upload_id,
        "dir": out_dir.display().to_string(),
        "chunks": listing,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pdf_checks() {
        assert!(has_pdf_extension("Lease.PDF"));
        assert!(!has_pdf_extension("lease.pdf.exe"));
        assert!(!has_pdf_extension("lease"));

        assert!(is_pdf_content(b"%PDF-1.7\n..."));
        assert!(!is_pdf_content(b"PK\x03\x04 zip"));
        assert!(!is_pdf_content(b""));
    }
}
